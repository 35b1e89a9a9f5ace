//! 解析状态机
//!
//! 身份键 → 哈希表查找 → 加锁 → （新对象）映射 MFT 记录 → 查找属性 →
//! 填写字段 → 挂接到基本 inode → 发布。
//!
//! 新对象在插入哈希表之前就由创建者独占加锁并处于 `Resolving` 状态，
//! 其他线程找到它时只会等待状态变化，不会读取半成品。构造失败时对象被移出
//! 哈希表并释放，等待者随后重新查找。
//!
//! - resolve/mod.rs 获取/发布/回退与基本 inode 解析
//! - resolve/attr.rs 属性 inode、raw inode、索引 inode
//! - resolve/fields.rs 属性记录到 inode 字段的校验与转换
//! - resolve/lookup.rs 跨记录属性查找、属性列表解析、扩展 inode
//! - resolve/names.rs 文件名快照与按祖先顺序加锁

mod attr;
mod fields;
mod lookup;
mod names;

pub use lookup::{find_listed_records, ListedRecord};

use crate::consts::*;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{AttrKey, HeldLock, InodeFlags, InodeGuard, InodeHandle, InodeKind, InodeState, NtfsInode, SizeTriple};
use crate::name::I30;
use crate::record::{corrupt, AttrRecordBuf, AttrSearch, MftRecordHeader, StandardInformation};
use crate::runlist::{read_via_runlist, Runlist};
use crate::types::{AttrFlags, FileAttributeFlags, LockMode, MftRecordFlags};
use crate::volume::NtfsVolume;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// `acquire` 的结果
pub(crate) enum Acquired {
    /// 已发布的对象，已按要求加锁
    Found(InodeGuard),
    /// 新分配的对象，创建者持有独占锁，状态为 `Resolving`
    Created(Arc<NtfsInode>),
}

/// 基本记录中解析出的内容（记录映射释放前的快照）
struct BaseRecord {
    hdr: MftRecordHeader,
    std_info: StandardInformation,
    attr_list: Option<AttrRecordBuf>,
    index_root: Option<AttrRecordBuf>,
    data: Option<AttrRecordBuf>,
}

impl<D: NtfsDevice> NtfsVolume<D> {
    fn alloc_inode(&self, key: &AttrKey, kind: InodeKind, base: Option<InodeHandle>) -> Result<Arc<NtfsInode>> {
        let ino = self
            .arena
            .lock()
            .insert_with(|handle| NtfsInode::new(handle, key.clone(), kind, base))?;
        // 发布前加锁，只有创建者持有
        ino.lock().lock_exclusive();
        Ok(ino)
    }

    /// 查找或创建对象
    ///
    /// 找到的对象在 `Resolving` 期间不可见：等待直到它被发布、被删除或构造失败。
    pub(crate) fn acquire(
        &self,
        key: &AttrKey,
        kind: InodeKind,
        base: Option<InodeHandle>,
        mode: LockMode,
    ) -> Result<Acquired> {
        if mode == LockMode::AlreadyLocked {
            return self.already_locked(key).map(Acquired::Found);
        }

        let mut round = 0u64;
        loop {
            let (ino, created) = self
                .hash
                .get_or_create(key, || self.alloc_inode(key, kind, base))?;
            if created {
                log::debug!("[RESOLVE] New inode {:#x} type {:#x}", key.mft_no, key.ty);
                return Ok(Acquired::Created(ino));
            }
            match ino.state() {
                InodeState::Ready => {
                    if let Some(guard) = self.lock_published(ino, mode)? {
                        return Ok(Acquired::Found(guard));
                    }
                }
                InodeState::Deleted => {
                    return Err(Error::new(ErrorKind::NotFound, "Inode has been deleted"));
                }
                // 正在构造，或构造失败正在移出哈希表
                _ => {}
            }
            round += 1;
            self.host.relax(round);
        }
    }

    /// 给已发布的对象加锁，加锁后重新检查状态
    ///
    /// 返回 None 表示对象在等待锁期间被回收，需要重新查找。
    fn lock_published(&self, ino: Arc<NtfsInode>, mode: LockMode) -> Result<Option<InodeGuard>> {
        let held = match mode {
            LockMode::Exclusive => {
                ino.lock().lock_exclusive();
                HeldLock::Exclusive
            }
            LockMode::Shared => {
                ino.lock().lock_shared();
                HeldLock::Shared
            }
            LockMode::Unlocked | LockMode::AlreadyLocked => HeldLock::None,
        };
        let guard = InodeGuard::new(ino, held);
        match guard.state() {
            InodeState::Ready => Ok(Some(guard)),
            InodeState::Deleted => Err(Error::new(ErrorKind::NotFound, "Inode has been deleted")),
            _ => Ok(None),
        }
    }

    /// 调用者声明已独占持有对象；对象已不在哈希表中或尚未发布时返回 `NotFound`
    fn already_locked(&self, key: &AttrKey) -> Result<InodeGuard> {
        let ino = match self.hash.lookup_only(key) {
            Some(ino) => ino,
            None => return Err(Error::new(ErrorKind::NotFound, "Inode has been deleted")),
        };
        if !ino.lock().is_locked_exclusive() {
            panic!(
                "LockMode::AlreadyLocked used for inode {:#x} type {:#x} which is not held exclusively",
                key.mft_no, key.ty
            );
        }
        match ino.state() {
            InodeState::Ready => Ok(InodeGuard::new(ino, HeldLock::None)),
            _ => Err(Error::new(ErrorKind::NotFound, "Inode is not resolved or has been deleted")),
        }
    }

    /// 给一个已取得引用的对象加锁（不经过哈希表）
    pub(crate) fn lock_inode(&self, ino: Arc<NtfsInode>, held: HeldLock) -> Result<InodeGuard> {
        match held {
            HeldLock::Exclusive => ino.lock().lock_exclusive(),
            HeldLock::Shared => ino.lock().lock_shared(),
            HeldLock::None => {}
        }
        let guard = InodeGuard::new(ino, held);
        if guard.is_deleted() {
            return Err(Error::new(ErrorKind::NotFound, "Inode has been deleted"));
        }
        Ok(guard)
    }

    /// 发布新对象，并把创建者的独占锁转换为调用者要求的锁
    fn publish(&self, ino: Arc<NtfsInode>, mode: LockMode) -> Result<InodeGuard> {
        ino.set_state(InodeState::Ready);
        log::trace!("[RESOLVE] Published inode {:#x} type {:#x}", ino.mft_no(), ino.key().ty);
        let held = match mode {
            LockMode::Exclusive | LockMode::AlreadyLocked => HeldLock::Exclusive,
            LockMode::Shared => {
                // SAFETY: 创建者在 alloc_inode 中取得了独占锁
                unsafe { ino.lock().unlock_exclusive() };
                ino.lock().lock_shared();
                HeldLock::Shared
            }
            LockMode::Unlocked => {
                // SAFETY: 同上
                unsafe { ino.lock().unlock_exclusive() };
                HeldLock::None
            }
        };
        let guard = InodeGuard::new(ino, held);
        if guard.is_deleted() {
            return Err(Error::new(ErrorKind::NotFound, "Inode has been deleted"));
        }
        Ok(guard)
    }

    /// 构造失败：移出哈希表、释放对象、解锁，然后返回原错误
    fn abort(&self, ino: Arc<NtfsInode>, err: Error) -> Error {
        self.note_error(ino.mft_no(), &err);
        self.free_inode(&ino);
        // SAFETY: 创建者在 alloc_inode 中取得了独占锁
        unsafe { ino.lock().unlock_exclusive() };
        err
    }

    /// 运行构造过程，成功则发布，失败则回退
    pub(crate) fn finish_created<F>(&self, ino: Arc<NtfsInode>, mode: LockMode, read: F) -> Result<InodeGuard>
    where
        F: FnOnce(&NtfsInode) -> Result<()>,
    {
        match read(&ino) {
            Ok(()) => self.publish(ino, mode),
            Err(e) => Err(self.abort(ino, e)),
        }
    }

    /// 解析基本 inode
    ///
    /// # 参数
    ///
    /// * `mft_no` - MFT 记录号
    /// * `mode` - 返回时持有的锁
    ///
    /// # 错误
    ///
    /// - `ErrorKind::NotFound` - 记录未使用或已被删除（链接数为 0）
    /// - `ErrorKind::Corrupted` - 记录结构损坏（卷被标记为有错误）
    /// - `ErrorKind::Unsupported` - 不支持的压缩单元、索引块大小等
    /// - `ErrorKind::OutOfMemory` - 分配失败
    pub fn resolve_base(&self, mft_no: u64, mode: LockMode) -> Result<InodeGuard> {
        let key = AttrKey::base(mft_no);
        match self.acquire(&key, InodeKind::Base, None, mode)? {
            Acquired::Found(guard) if guard.kind() != InodeKind::Base => {
                let err = corrupt("MFT record is an extent record");
                self.note_error(mft_no, &err);
                Err(err)
            }
            Acquired::Found(guard) => Ok(guard),
            Acquired::Created(ino) => self.finish_created(ino, mode, |ino| self.read_base(ino)),
        }
    }

    fn parse_base_record(&self, buf: &[u8]) -> Result<BaseRecord> {
        let hdr = MftRecordHeader::parse(buf)?;
        if !hdr.is_in_use() {
            return Err(Error::new(ErrorKind::NotFound, "MFT record is not in use"));
        }
        if hdr.is_extent() {
            return Err(corrupt("MFT record is an extent record"));
        }
        if hdr.link_count == 0 {
            return Err(Error::new(ErrorKind::NotFound, "Inode has been deleted"));
        }

        let (_, si) = AttrSearch::new(buf, &hdr)
            .find_type(AT_STANDARD_INFORMATION)?
            .ok_or_else(|| corrupt("$STANDARD_INFORMATION attribute is missing"))?;
        let std_info = StandardInformation::parse(si.value()?)?;

        let attr_list = AttrSearch::new(buf, &hdr)
            .find_type(AT_ATTRIBUTE_LIST)?
            .map(|(_, a)| a.to_owned_record())
            .transpose()?;

        let (index_root, data) = if hdr.is_directory() {
            let root = AttrSearch::new(buf, &hdr).find(AT_INDEX_ROOT, &I30, &self.collation)?;
            (root.map(|(_, a)| a.to_owned_record()).transpose()?, None)
        } else {
            let data = AttrSearch::new(buf, &hdr).find(AT_DATA, &[], &self.collation)?;
            (None, data.map(|(_, a)| a.to_owned_record()).transpose()?)
        };

        Ok(BaseRecord { hdr, std_info, attr_list, index_root, data })
    }

    fn read_base(&self, ino: &NtfsInode) -> Result<()> {
        let mft_no = ino.mft_no();
        let rec = {
            let m = self.dev.map(ino.mrec_lock(), mft_no)?;
            self.parse_base_record(m.data())?
        };
        let is_dir = rec.hdr.is_directory();

        {
            let si = &rec.std_info;
            let mut info = ino.info_mut();
            info.seq_no = rec.hdr.sequence_number;
            info.link_count = rec.hdr.link_count;
            info.mode = self.posix_mode(is_dir, si.file_attributes);
            info.uid = self.config.uid;
            info.gid = self.config.gid;
            info.file_attributes = si.file_attributes;
            info.creation_time = si.creation_time;
            info.last_data_change_time = si.last_data_change_time;
            info.last_mft_change_time = si.last_mft_change_time;
            info.last_access_time = si.last_access_time;
            if is_dir {
                info.flags |= InodeFlags::DIRECTORY;
            }
        }

        if let Some(list) = &rec.attr_list {
            self.load_attr_list(ino, list)?;
        }

        if is_dir {
            let root = match rec.attr_list {
                Some(_) => self.lookup_attr(ino, AT_INDEX_ROOT, &I30)?.map(|mut v| v.swap_remove(0)),
                None => rec.index_root,
            };
            let root = root.ok_or_else(|| corrupt("$INDEX_ROOT attribute is missing"))?;
            let index = self.index_info(&root.view())?;
            let mut info = ino.info_mut();
            info.index = Some(index);
            info.flags |= InodeFlags::INDEX;
            drop(info);
            ino.set_sizes(SizeTriple::default());
        } else {
            let data = match rec.attr_list {
                Some(_) => self.lookup_attr(ino, AT_DATA, &[])?,
                None => rec.data.map(|d| vec![d]),
            };
            match data {
                Some(extents) => self.apply_attr_fields(ino, AT_DATA, &extents)?,
                None if mft_no == FILE_SECURE || rec.hdr.flags.contains(MftRecordFlags::IS_VIEW_INDEX) => {
                    ino.set_sizes(SizeTriple::default());
                }
                None => return Err(corrupt("Unnamed $DATA attribute is missing")),
            }
        }

        log::debug!(
            "[RESOLVE] Read base inode {:#x}: seq {}, links {}, {}",
            mft_no,
            rec.hdr.sequence_number,
            rec.hdr.link_count,
            if is_dir { "directory" } else { "file" }
        );
        Ok(())
    }

    fn posix_mode(&self, is_dir: bool, attrs: FileAttributeFlags) -> u32 {
        if is_dir {
            S_IFDIR | (S_IRWXUGO & !self.config.dmask)
        } else {
            let mut mode = S_IFREG | (S_IRWXUGO & !self.config.fmask);
            if attrs.contains(FileAttributeFlags::READONLY) {
                mode &= !S_IWUGO;
            }
            mode
        }
    }

    /// 读入属性列表（常驻直接复制，非常驻通过运行列表读取）
    fn load_attr_list(&self, ino: &NtfsInode, rec: &AttrRecordBuf) -> Result<()> {
        let attr = rec.view();
        let flags = attr.flags();
        if flags.is_compressed() || flags.intersects(AttrFlags::IS_ENCRYPTED | AttrFlags::IS_SPARSE) {
            return Err(corrupt("Attribute list attribute is compressed, encrypted or sparse"));
        }

        let (list, runlist) = if !attr.is_non_resident() {
            let value = attr.value()?;
            let mut list = Vec::new();
            list.try_reserve_exact(value.len())?;
            list.extend_from_slice(value);
            (list, None)
        } else {
            if attr.lowest_vcn()? != 0 {
                return Err(corrupt("Attribute list has a non-zero lowest VCN"));
            }
            let sizes = SizeTriple {
                allocated: attr.allocated_size()?,
                data: attr.data_size()?,
                initialized: attr.initialized_size()?,
                compressed: 0,
            };
            if !sizes.is_consistent() {
                return Err(corrupt("Attribute list sizes are inconsistent"));
            }
            if sizes.data > NTFS_MAX_ATTR_LIST_SIZE {
                return Err(corrupt("Attribute list is too large"));
            }
            let rl = Runlist::decompress(&attr, self.dev.cluster_size())?;
            let mut list = Vec::new();
            list.try_reserve_exact(sizes.data as usize)?;
            list.resize(sizes.data as usize, 0);
            read_via_runlist(&self.dev, &rl, sizes.initialized, &mut list)?;
            (list, Some(rl))
        };

        log::debug!("[ATTRLIST] Inode {:#x} has a {} byte attribute list", ino.mft_no(), list.len());
        let mut info = ino.info_mut();
        info.attr_list = Some(Arc::from(list));
        info.attr_list_runlist = runlist;
        info.flags |= InodeFlags::ATTR_LIST;
        Ok(())
    }
}
