//! 文件名快照与按祖先顺序加锁
//!
//! 查找父目录之前先把文件名复制出来并释放记录映射（先快照，再行动），
//! 任何时候都不会在持有记录映射的同时解析另一个 inode。

use super::find_listed_records;
use crate::consts::*;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{HeldLock, InodeGuard, InodeKind, NtfsInode};
use crate::record::{corrupt, AttrSearch, FileNameAttr, MftRecordHeader};
use crate::types::{FileNameNamespace, LockMode};
use crate::volume::NtfsVolume;
use alloc::sync::Arc;
use alloc::vec::Vec;

fn collect_file_names(buf: &[u8], hdr: &MftRecordHeader, out: &mut Vec<FileNameAttr>) -> Result<()> {
    let mut search = AttrSearch::new(buf, hdr);
    while let Some((_, attr)) = search.next_attr()? {
        if attr.ty() != AT_FILE_NAME {
            continue;
        }
        if attr.is_non_resident() {
            return Err(corrupt("$FILE_NAME attribute is not resident"));
        }
        let name = FileNameAttr::parse(attr.value()?)?;
        out.try_reserve(1)?;
        out.push(name);
    }
    Ok(())
}

impl<D: NtfsDevice> NtfsVolume<D> {
    /// 读取基本 inode 的文件名（快照）
    ///
    /// 有多个文件名时优先取 Win32/POSIX 名称，只有 DOS 短名时取短名。
    ///
    /// # 错误
    ///
    /// - `ErrorKind::Corrupted` - 没有 $FILE_NAME 属性
    pub fn file_name(&self, inode: &NtfsInode) -> Result<FileNameAttr> {
        if inode.kind() != InodeKind::Base {
            return Err(Error::new(ErrorKind::InvalidInput, "Only base inodes have file names"));
        }

        let mut names = Vec::new();
        let list = inode.info().attr_list.clone();
        match list {
            None => {
                let m = self.dev.map(inode.mrec_lock(), inode.mft_no())?;
                let hdr = m.header()?;
                collect_file_names(m.data(), &hdr, &mut names)?;
                m.unmap()?;
            }
            Some(list) => {
                for rec in find_listed_records(&list, AT_FILE_NAME, &[], &self.collation)? {
                    self.with_listed_record(inode, rec.mref, |buf, hdr| collect_file_names(buf, hdr, &mut names))?;
                }
            }
        }

        let pos = names
            .iter()
            .position(|n| n.namespace != FileNameNamespace::Dos)
            .or_else(|| (!names.is_empty()).then_some(0));
        match pos {
            Some(pos) => Ok(names.swap_remove(pos)),
            None => {
                let err = corrupt("$FILE_NAME attribute is missing");
                self.note_error(inode.mft_no(), &err);
                Err(err)
            }
        }
    }

    /// `ancestor` 是否为 `inode` 的祖先目录
    ///
    /// 沿父目录链向上走到根目录。父目录以不加锁的方式解析。
    pub fn is_ancestor(&self, ancestor: &NtfsInode, inode: &NtfsInode) -> Result<bool> {
        let target = ancestor.mft_no();
        let mut cur = inode.mft_no();
        let mut parent = self.file_name(inode)?.parent.mft_no();
        for _ in 0..NTFS_MAX_PATH_DEPTH {
            if parent == target {
                return Ok(true);
            }
            if cur == FILE_ROOT || parent == cur {
                return Ok(false);
            }
            cur = parent;
            let dir = self.resolve_base(cur, LockMode::Unlocked)?;
            parent = self.file_name(&dir)?.parent.mft_no();
        }
        log::error!("[RESOLVE] Inode {:#x}: parent chain does not reach the root", inode.mft_no());
        Err(corrupt("Directory hierarchy is too deep"))
    }

    /// 给两个基本 inode 加锁，避免锁顺序反转
    ///
    /// 持有卷的重命名锁期间确定祖先关系：祖先先加锁，无关的两个 inode
    /// 按记录号升序加锁。返回的守卫与参数顺序一致。
    ///
    /// # 错误
    ///
    /// - `ErrorKind::InvalidInput` - 两个参数是同一个 inode，或模式不是独占/共享
    /// - `ErrorKind::NotFound` - 加锁后发现 inode 已被删除
    pub fn lock_pair(
        &self,
        a: &Arc<NtfsInode>,
        b: &Arc<NtfsInode>,
        mode: LockMode,
    ) -> Result<(InodeGuard, InodeGuard)> {
        if a.mft_no() == b.mft_no() {
            return Err(Error::new(ErrorKind::InvalidInput, "Cannot lock an inode against itself"));
        }
        let held = match mode {
            LockMode::Exclusive => HeldLock::Exclusive,
            LockMode::Shared => HeldLock::Shared,
            _ => return Err(Error::new(ErrorKind::InvalidInput, "Pair locking needs an exclusive or shared mode")),
        };

        let _rename = self.rename_lock.lock();
        let a_first = if self.is_ancestor(a, b)? {
            true
        } else if self.is_ancestor(b, a)? {
            false
        } else {
            a.mft_no() < b.mft_no()
        };
        let (first, second) = if a_first { (a, b) } else { (b, a) };
        log::trace!("[RESOLVE] Locking {:#x} before {:#x}", first.mft_no(), second.mft_no());
        let g1 = self.lock_inode(first.clone(), held)?;
        let g2 = self.lock_inode(second.clone(), held)?;
        Ok(if a_first { (g1, g2) } else { (g2, g1) })
    }
}
