//! 属性 inode、raw inode 与索引 inode 的解析

use super::Acquired;
use crate::consts::*;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{AttrKey, InodeFlags, InodeGuard, InodeKind, NtfsInode, SizeTriple};
use crate::name::intern;
use crate::record::{corrupt, insert_resident_attr, resident_attr_len, AttrRecord, AttrRecordBuf};
use crate::types::{AttrFlags, CreateOptions, LockMode};
use crate::volume::NtfsVolume;
use alloc::vec::Vec;

impl<D: NtfsDevice> NtfsVolume<D> {
    /// 解析基本 inode 的一个属性
    ///
    /// # 参数
    ///
    /// * `base` - 已解析的基本 inode（调用者应持有其锁）
    /// * `ty` - 属性类型
    /// * `name` - 属性名，空表示未命名
    /// * `raw` - 是否解析为 raw 视图（不解释压缩/加密）
    /// * `options` - 创建选项
    /// * `mode` - 返回时持有的锁
    ///
    /// # 错误
    ///
    /// - `ErrorKind::NotFound` - 属性不存在且未要求创建，或基本 inode 已被删除
    /// - `ErrorKind::AlreadyExists` - 指定了 `EXCLUSIVE` 而属性已存在且非空
    /// - `ErrorKind::DeadlockAvoided` - 基本 inode 在挂接前开始排空
    /// - `ErrorKind::NoSpace` - 创建时基本记录已满
    pub fn resolve_attribute(
        &self,
        base: &NtfsInode,
        ty: u32,
        name: &[u16],
        raw: bool,
        options: CreateOptions,
        mode: LockMode,
    ) -> Result<InodeGuard> {
        if base.kind() != InodeKind::Base || ty == AT_UNUSED {
            return Err(Error::new(ErrorKind::InvalidInput, "Attributes are resolved against a base inode"));
        }
        if base.is_deleted() {
            return Err(Error::new(ErrorKind::NotFound, "Base inode has been deleted"));
        }

        let key = AttrKey::attr(base.mft_no(), ty, intern(name)?, raw);
        match self.acquire(&key, InodeKind::Attr, Some(base.handle()), mode)? {
            Acquired::Found(guard) => {
                if options.contains(CreateOptions::EXCLUSIVE) && guard.data_size() != 0 {
                    return Err(Error::new(ErrorKind::AlreadyExists, "Attribute already exists"));
                }
                Ok(guard)
            }
            Acquired::Created(ino) => self.finish_created(ino, mode, |ino| {
                if raw {
                    self.read_raw_attr(base, ino, options)?;
                } else {
                    self.read_attr(base, ino, options)?;
                }
                base.attach_attr(ino.handle())
            }),
        }
    }

    /// 解析目录（或视图索引）的索引 inode，总是以独占锁返回
    pub fn resolve_index(&self, base: &NtfsInode, name: &[u16]) -> Result<InodeGuard> {
        self.resolve_attribute(base, AT_INDEX_ALLOCATION, name, false, CreateOptions::empty(), LockMode::Exclusive)
    }

    fn inherit_base_fields(&self, base: &NtfsInode, ino: &NtfsInode) {
        let b = base.info();
        let mut info = ino.info_mut();
        info.seq_no = b.seq_no;
        info.link_count = b.link_count;
        info.mode = S_IFREG | (b.mode & S_IRWXUGO);
        info.uid = b.uid;
        info.gid = b.gid;
        info.file_attributes = b.file_attributes;
        info.creation_time = b.creation_time;
        info.last_data_change_time = b.last_data_change_time;
        info.last_mft_change_time = b.last_mft_change_time;
        info.last_access_time = b.last_access_time;
    }

    fn read_attr(&self, base: &NtfsInode, ino: &NtfsInode, options: CreateOptions) -> Result<()> {
        self.inherit_base_fields(base, ino);
        let ty = ino.key().ty;
        if ty == AT_INDEX_ALLOCATION {
            return self.read_index(base, ino);
        }

        let name = ino.key().name.clone();
        match self.lookup_attr(base, ty, &name)? {
            Some(extents) => {
                if options.contains(CreateOptions::EXCLUSIVE) && extents[0].view().logical_size()? != 0 {
                    return Err(Error::new(ErrorKind::AlreadyExists, "Attribute already exists"));
                }
                self.apply_attr_fields(ino, ty, &extents)
            }
            None if options.contains(CreateOptions::CREATE) && !options.contains(CreateOptions::MUST_EXIST) => {
                self.create_resident_attr(base, ino, ty, &name)
            }
            None => Err(Error::new(ErrorKind::NotFound, "Attribute does not exist")),
        }
    }

    /// 在基本记录中插入一个空的常驻属性
    fn create_resident_attr(&self, base: &NtfsInode, ino: &NtfsInode, ty: u32, name: &[u16]) -> Result<()> {
        if base.flags().contains(InodeFlags::ATTR_LIST) {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "Creating attributes in inodes with an attribute list is not supported",
            ));
        }

        let mut m = self.dev.map(base.mrec_lock(), base.mft_no())?;
        // 先在副本上插入，失败时记录保持原样
        let mut image = Vec::new();
        image.try_reserve_exact(m.data().len())?;
        image.extend_from_slice(m.data());
        let ofs = insert_resident_attr(&mut image, ty, name, &[], &self.collation)?;
        let len = resident_attr_len(name.len(), 0);
        let attr = AttrRecord::parse(&image[ofs..ofs + len])?.to_owned_record()?;
        m.data_mut().copy_from_slice(&image);
        m.unmap()?;

        log::info!(
            "[RESOLVE] Created resident attribute {:#x} in inode {:#x}",
            ty,
            base.mft_no()
        );
        self.apply_attr_fields(ino, ty, &[attr])
    }

    /// raw inode 的字段取自非 raw 的孪生 inode
    ///
    /// 未命名 $DATA 的孪生就是基本 inode 本身，其他属性先解析孪生属性 inode。
    /// 孪生 inode 不加主锁：调用者可能正独占持有它，字段在 info 与大小锁下复制。
    fn read_raw_attr(&self, base: &NtfsInode, ino: &NtfsInode, options: CreateOptions) -> Result<()> {
        let ty = ino.key().ty;
        let name = ino.key().name.clone();
        if ty == AT_DATA && name.is_empty() {
            self.copy_from_twin(base, ino);
            return Ok(());
        }
        let twin = self.resolve_attribute(
            base,
            ty,
            &name,
            false,
            options - CreateOptions::EXCLUSIVE,
            LockMode::Unlocked,
        )?;
        self.copy_from_twin(&twin, ino);
        Ok(())
    }

    fn copy_from_twin(&self, twin: &NtfsInode, ino: &NtfsInode) {
        let src = twin.info();
        let mut info = ino.info_mut();
        *info = src.clone();
        info.mode = S_IFREG | (src.mode & S_IRWXUGO);
        info.attr_list = None;
        info.attr_list_runlist = None;
        info.index = None;
        info.finder_info = None;
        info.backup_time = None;
        info.flags = (src.flags - (InodeFlags::ATTR_LIST | InodeFlags::INDEX | InodeFlags::DIRECTORY)) | InodeFlags::RAW;

        let mut sizes = twin.sizes();
        if src.flags.intersects(InodeFlags::COMPRESSED | InodeFlags::ENCRYPTED) {
            sizes.data = sizes.allocated;
            sizes.initialized = sizes.allocated;
        }
        ino.set_sizes(sizes);
    }

    /// 索引 inode：校验索引根，大索引还要校验 $INDEX_ALLOCATION 与 $BITMAP
    fn read_index(&self, base: &NtfsInode, ino: &NtfsInode) -> Result<()> {
        let name = ino.key().name.clone();
        let root = first_extent(self.lookup_attr(base, AT_INDEX_ROOT, &name)?)
            .ok_or_else(|| corrupt("$INDEX_ROOT attribute is missing"))?;
        let index = self.index_info(&root.view())?;
        {
            let mut info = ino.info_mut();
            info.index = Some(index);
            info.flags |= InodeFlags::INDEX | InodeFlags::MST_PROTECTED;
        }
        if !index.large {
            ino.set_sizes(SizeTriple::default());
            return Ok(());
        }

        let alloc = self
            .lookup_attr(base, AT_INDEX_ALLOCATION, &name)?
            .ok_or_else(|| corrupt("$INDEX_ALLOCATION attribute is missing"))?;
        self.apply_attr_fields(ino, AT_INDEX_ALLOCATION, &alloc)?;
        let data = ino.sizes().data;
        if data & (index.block_size as i64 - 1) != 0 {
            return Err(corrupt("Index allocation size is not a multiple of the index block size"));
        }

        let bitmap = first_extent(self.lookup_attr(base, AT_BITMAP, &name)?)
            .ok_or_else(|| corrupt("$BITMAP attribute is missing"))?;
        let bm = bitmap.view();
        let bm_flags = bm.flags();
        if bm_flags.is_compressed() || bm_flags.intersects(AttrFlags::IS_ENCRYPTED | AttrFlags::IS_SPARSE) {
            return Err(corrupt("Index bitmap is compressed, encrypted or sparse"));
        }
        let bits = bm.logical_size()?.saturating_mul(8);
        if bits < data >> index.block_size_shift {
            log::error!(
                "[RESOLVE] Inode {:#x}: index bitmap has {} bits for {} index blocks",
                base.mft_no(),
                bits,
                data >> index.block_size_shift
            );
            return Err(corrupt("Index bitmap is too small"));
        }
        Ok(())
    }
}

fn first_extent(extents: Option<Vec<AttrRecordBuf>>) -> Option<AttrRecordBuf> {
    extents.and_then(|v| v.into_iter().next())
}
