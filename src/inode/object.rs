//! 内存中的 inode 对象

use super::key::AttrKey;
use super::lock::InodeLock;
use crate::error::{Error, ErrorKind, Result};
use crate::runlist::Runlist;
use crate::types::{FileAttributeFlags, NtfsTime};
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// inode 在卷 arena 中的句柄
///
/// 代际计数用于发现已经被释放、槽位又被复用的旧句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InodeState {
    /// 尚未开始解析
    Unresolved = 0,
    /// 正在构造，仅创建者可见
    Resolving = 1,
    /// 已发布
    Ready = 2,
    /// 已删除，不可再使用
    Deleted = 3,
    /// 已释放（构造失败或回收完成）
    Freed = 4,
}

impl InodeState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unresolved,
            1 => Self::Resolving,
            2 => Self::Ready,
            3 => Self::Deleted,
            _ => Self::Freed,
        }
    }
}

/// inode 角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    /// 文件或目录的主记录
    Base,
    /// 基本 inode 的一个属性（命名流、索引分配等）
    Attr,
    /// 基本 inode 的扩展 MFT 记录
    Extent,
}

bitflags! {
    /// 能力标志（与生命周期状态相互独立）
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InodeFlags: u16 {
        /// 非常驻
        const NON_RESIDENT  = 0x0001;
        /// 压缩
        const COMPRESSED    = 0x0002;
        /// 稀疏
        const SPARSE        = 0x0004;
        /// 加密
        const ENCRYPTED     = 0x0008;
        /// 多扇区保护（索引分配）
        const MST_PROTECTED = 0x0010;
        /// 索引 inode
        const INDEX         = 0x0020;
        /// 存在属性列表
        const ATTR_LIST     = 0x0040;
        /// 目录
        const DIRECTORY     = 0x0080;
        /// raw 视图
        const RAW           = 0x0100;
    }
}

/// 大小三元组（压缩/稀疏属性另有压缩后大小）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeTriple {
    /// 分配大小
    pub allocated: i64,
    /// 数据大小
    pub data: i64,
    /// 已初始化大小
    pub initialized: i64,
    /// 压缩后大小
    pub compressed: i64,
}

impl SizeTriple {
    /// 0 ≤ initialized ≤ data ≤ allocated
    pub fn is_consistent(&self) -> bool {
        0 <= self.initialized && self.initialized <= self.data && self.data <= self.allocated
    }
}

/// 压缩参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionInfo {
    /// 压缩块大小（字节）
    pub block_size: u32,
    /// 压缩块大小的 log2
    pub block_size_shift: u8,
    /// 每个压缩块的簇数
    pub block_clusters: u32,
}

/// 索引参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
    /// 被索引的属性类型
    pub indexed_type: u32,
    /// 排序规则
    pub collation_rule: u32,
    /// 索引块大小
    pub block_size: u32,
    /// 索引块大小的 log2
    pub block_size_shift: u8,
    /// 索引 VCN 的单位大小
    pub vcn_size: u32,
    /// 索引 VCN 单位大小的 log2
    pub vcn_size_shift: u8,
    /// 是否存在 $INDEX_ALLOCATION
    pub large: bool,
}

/// 解析得到的 inode 字段
///
/// 构造期间由创建者填写，发布后只在主锁的保护下修改。
#[derive(Debug, Clone)]
pub struct InodeInfo {
    /// 序列号
    pub seq_no: u16,
    /// 硬链接数
    pub link_count: u16,
    /// POSIX 模式
    pub mode: u32,
    /// 所有者
    pub uid: u32,
    /// 组
    pub gid: u32,
    /// 文件属性
    pub file_attributes: FileAttributeFlags,
    /// 创建时间
    pub creation_time: NtfsTime,
    /// 数据修改时间
    pub last_data_change_time: NtfsTime,
    /// MFT 记录修改时间
    pub last_mft_change_time: NtfsTime,
    /// 访问时间
    pub last_access_time: NtfsTime,
    /// 能力标志
    pub flags: InodeFlags,
    /// 运行列表（非常驻属性）
    pub runlist: Option<Runlist>,
    /// 属性列表内容
    pub attr_list: Option<Arc<[u8]>>,
    /// 属性列表自身的运行列表（非常驻属性列表）
    pub attr_list_runlist: Option<Runlist>,
    /// 压缩参数
    pub compression: Option<CompressionInfo>,
    /// 索引参数
    pub index: Option<IndexInfo>,
    /// Finder 信息
    pub finder_info: Option<[u8; 32]>,
    /// 备份时间
    pub backup_time: Option<NtfsTime>,
}

impl Default for InodeInfo {
    fn default() -> Self {
        Self {
            seq_no: 0,
            link_count: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            file_attributes: FileAttributeFlags::empty(),
            creation_time: NtfsTime::default(),
            last_data_change_time: NtfsTime::default(),
            last_mft_change_time: NtfsTime::default(),
            last_access_time: NtfsTime::default(),
            flags: InodeFlags::empty(),
            runlist: None,
            attr_list: None,
            attr_list_runlist: None,
            compression: None,
            index: None,
            finder_info: None,
            backup_time: None,
        }
    }
}

/// 基本 inode 上挂接的子对象
#[derive(Debug, Default)]
pub(crate) struct Attached {
    /// 属性 inode（删除后留下墓碑）
    pub attrs: Vec<Option<InodeHandle>>,
    /// 扩展 inode（删除后留下墓碑）
    pub extents: Vec<Option<InodeHandle>>,
    /// 基本 inode 正在排空，不再接受新的挂接
    pub closed: bool,
}

impl Attached {
    pub fn live(&self) -> impl Iterator<Item = InodeHandle> + '_ {
        self.attrs.iter().chain(self.extents.iter()).flatten().copied()
    }

    pub fn push_attr(&mut self, child: InodeHandle) -> Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::DeadlockAvoided, "Base inode is being torn down"));
        }
        self.attrs.try_reserve(1)?;
        self.attrs.push(Some(child));
        Ok(())
    }

    pub fn push_extent(&mut self, child: InodeHandle) -> Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::DeadlockAvoided, "Base inode is being torn down"));
        }
        self.extents.try_reserve(1)?;
        self.extents.push(Some(child));
        Ok(())
    }
}

/// 内存中的 NTFS inode
///
/// 基本、属性、扩展三种角色共用同一形状。锁的层次（由外到内）：
/// 主读写锁 `lock`，挂接数组锁 `attached`，大小锁 `sizes`。
pub struct NtfsInode {
    handle: InodeHandle,
    key: AttrKey,
    kind: InodeKind,
    base: spin::Mutex<Option<InodeHandle>>,
    state: AtomicU8,
    lock: InodeLock,
    info: spin::RwLock<InodeInfo>,
    sizes: spin::Mutex<SizeTriple>,
    pub(crate) attached: spin::Mutex<Attached>,
    mrec_lock: spin::Mutex<()>,
    vnode_attached: AtomicBool,
    pub(crate) recycle_requested: AtomicBool,
    pub(crate) reclaiming: AtomicBool,
}

impl NtfsInode {
    /// 创建处于 `Unresolved` 状态的对象
    pub fn new(handle: InodeHandle, key: AttrKey, kind: InodeKind, base: Option<InodeHandle>) -> Self {
        Self {
            handle,
            key,
            kind,
            base: spin::Mutex::new(base),
            state: AtomicU8::new(InodeState::Unresolved as u8),
            lock: InodeLock::new(),
            info: spin::RwLock::new(InodeInfo::default()),
            sizes: spin::Mutex::new(SizeTriple::default()),
            attached: spin::Mutex::new(Attached::default()),
            mrec_lock: spin::Mutex::new(()),
            vnode_attached: AtomicBool::new(false),
            recycle_requested: AtomicBool::new(false),
            reclaiming: AtomicBool::new(false),
        }
    }

    /// arena 句柄
    pub fn handle(&self) -> InodeHandle {
        self.handle
    }

    /// 身份键
    pub fn key(&self) -> &AttrKey {
        &self.key
    }

    /// MFT 记录号
    pub fn mft_no(&self) -> u64 {
        self.key.mft_no
    }

    /// 角色
    pub fn kind(&self) -> InodeKind {
        self.kind
    }

    /// 基本 inode 的句柄（属性/扩展 inode）
    pub fn base(&self) -> Option<InodeHandle> {
        *self.base.lock()
    }

    /// 清除指向基本 inode 的句柄，只在释放的最后一步调用
    pub(crate) fn clear_base(&self) -> Option<InodeHandle> {
        self.base.lock().take()
    }

    /// 生命周期状态
    pub fn state(&self) -> InodeState {
        InodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: InodeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// 是否已发布
    pub fn is_ready(&self) -> bool {
        self.state() == InodeState::Ready
    }

    /// 是否已删除
    pub fn is_deleted(&self) -> bool {
        self.state() == InodeState::Deleted
    }

    /// 主锁
    pub fn lock(&self) -> &InodeLock {
        &self.lock
    }

    /// 读取字段
    pub fn info(&self) -> spin::RwLockReadGuard<'_, InodeInfo> {
        self.info.read()
    }

    /// 修改字段（调用者应持有主锁或对象尚未发布）
    pub fn info_mut(&self) -> spin::RwLockWriteGuard<'_, InodeInfo> {
        self.info.write()
    }

    /// 能力标志
    pub fn flags(&self) -> InodeFlags {
        self.info.read().flags
    }

    /// 序列号
    pub fn seq_no(&self) -> u16 {
        self.info.read().seq_no
    }

    /// 大小三元组快照（只取大小锁）
    pub fn sizes(&self) -> SizeTriple {
        *self.sizes.lock()
    }

    /// 设置大小三元组
    pub fn set_sizes(&self, sizes: SizeTriple) {
        *self.sizes.lock() = sizes;
    }

    /// 数据大小
    pub fn data_size(&self) -> i64 {
        self.sizes.lock().data
    }

    /// MFT 记录映射锁
    pub fn mrec_lock(&self) -> &spin::Mutex<()> {
        &self.mrec_lock
    }

    /// 宿主文件对象是否已挂接
    pub fn is_vnode_attached(&self) -> bool {
        self.vnode_attached.load(Ordering::Acquire)
    }

    /// 设置宿主文件对象挂接状态
    pub fn set_vnode_attached(&self, attached: bool) {
        self.vnode_attached.store(attached, Ordering::Release);
    }

    /// 挂接一个属性 inode
    ///
    /// 基本 inode 已开始排空时返回 `DeadlockAvoided`。
    pub(crate) fn attach_attr(&self, child: InodeHandle) -> Result<()> {
        self.attached.lock().push_attr(child)
    }

    /// 从挂接数组中移除子对象（留下墓碑）并清除子对象的基本句柄
    ///
    /// 两步都在挂接数组锁内完成。返回子对象是否在数组中。
    pub(crate) fn detach(&self, child: &NtfsInode) -> bool {
        let mut guard = self.attached.lock();
        let attached = &mut *guard;
        let handle = child.handle();
        let slot = attached
            .attrs
            .iter_mut()
            .chain(attached.extents.iter_mut())
            .find(|slot| **slot == Some(handle));
        let found = match slot {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        };
        child.clear_base();
        found
    }

    /// 当前挂接的子对象
    pub fn attached_children(&self) -> Vec<InodeHandle> {
        self.attached.lock().live().collect()
    }

    /// 当前挂接的扩展 inode 数
    pub fn extent_count(&self) -> usize {
        self.attached.lock().extents.iter().flatten().count()
    }

    /// Finder 信息（无效时为 None）
    pub fn finder_info(&self) -> Option<[u8; 32]> {
        self.info.read().finder_info
    }

    /// 设置或作废 Finder 信息
    pub fn set_finder_info(&self, info: Option<[u8; 32]>) {
        self.info.write().finder_info = info;
    }

    /// 备份时间（无效时为 None）
    pub fn backup_time(&self) -> Option<NtfsTime> {
        self.info.read().backup_time
    }

    /// 设置或作废备份时间
    pub fn set_backup_time(&self, time: Option<NtfsTime>) {
        self.info.write().backup_time = time;
    }
}

impl core::fmt::Debug for NtfsInode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NtfsInode")
            .field("mft_no", &self.key.mft_no)
            .field("type", &self.key.ty)
            .field("raw", &self.key.raw)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}
