//! 卷（挂载上下文）
//!
//! [`NtfsVolume`] 拥有解析层的全部共享状态：记录设备、身份哈希表、
//! inode arena、"有错误" 标志与重命名串行锁。所有解析调用都以它为入口，
//! 没有任何全局变量。
//!
//! - volume/config.rs 卷配置与宿主接口
//! - volume/arena.rs inode arena

mod arena;
mod config;

pub use arena::InodeArena;
pub use config::{NoVnodeHost, VnodeHost, VolumeConfig, VolumeStats};

use crate::device::{NtfsDevice, RecordDev};
use crate::error::{Error, Result};
use crate::hash::InodeHash;
use crate::inode::{AttrKey, InodeHandle, NtfsInode};
use crate::name::{NameCollation, Upcase};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

/// NTFS 卷
///
/// # 示例
///
/// ```rust,ignore
/// use ntfs_inode_core::{LockMode, NtfsVolume, VolumeConfig};
///
/// let vol = NtfsVolume::new(device, VolumeConfig::default())?;
/// let root = vol.resolve_base(5, LockMode::Shared)?;
/// println!("root has {} links", root.info().link_count);
/// ```
pub struct NtfsVolume<D: NtfsDevice> {
    pub(crate) dev: RecordDev<D>,
    pub(crate) config: VolumeConfig,
    pub(crate) collation: Arc<NameCollation>,
    pub(crate) hash: InodeHash,
    pub(crate) arena: spin::Mutex<InodeArena>,
    pub(crate) rename_lock: spin::Mutex<()>,
    pub(crate) host: Box<dyn VnodeHost>,
    has_errors: AtomicBool,
}

impl<D: NtfsDevice> NtfsVolume<D> {
    /// 挂载卷（不挂接宿主文件对象）
    ///
    /// # 参数
    ///
    /// * `device` - 底层设备
    /// * `config` - 卷配置
    ///
    /// # 错误
    ///
    /// - `ErrorKind::InvalidInput` - 设备的记录大小或簇大小无效
    pub fn new(device: D, config: VolumeConfig) -> Result<Self> {
        Self::with_host(device, config, Box::new(NoVnodeHost))
    }

    /// 挂载卷并指定宿主接口
    pub fn with_host(device: D, config: VolumeConfig, host: Box<dyn VnodeHost>) -> Result<Self> {
        let dev = RecordDev::new_with_cache(device, config.record_cache_size)?;
        let upcase = config.upcase.clone().map(Upcase::from_table).unwrap_or_default();
        let collation = Arc::new(NameCollation::new(config.case_sensitive, upcase));

        log::info!(
            "[VOLUME] Mounted: record size {}, cluster size {}, case {}",
            dev.record_size(),
            dev.cluster_size(),
            if config.case_sensitive { "sensitive" } else { "insensitive" }
        );
        Ok(Self {
            dev,
            hash: InodeHash::new(collation.clone()),
            collation,
            config,
            arena: spin::Mutex::new(InodeArena::new()),
            rename_lock: spin::Mutex::new(()),
            host,
            has_errors: AtomicBool::new(false),
        })
    }

    /// 记录设备
    pub fn device(&self) -> &RecordDev<D> {
        &self.dev
    }

    /// 卷配置
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// 名称排序规则
    pub fn collation(&self) -> &NameCollation {
        &self.collation
    }

    /// 身份哈希表
    pub fn inode_hash(&self) -> &InodeHash {
        &self.hash
    }

    /// 卷是否发现过损坏
    pub fn has_errors(&self) -> bool {
        self.has_errors.load(Ordering::Acquire)
    }

    /// 记录一次解析错误，损坏类错误会设置卷的错误标志
    pub(crate) fn note_error(&self, mft_no: u64, err: &Error) {
        if err.is_corruption() {
            self.has_errors.store(true, Ordering::Release);
            log::error!(
                "[RESOLVE] Inode {:#x}: {}. Volume is corrupt. Run chkdsk.",
                mft_no,
                err.message()
            );
        } else {
            log::debug!("[RESOLVE] Inode {:#x}: {}", mft_no, err);
        }
    }

    /// 按 arena 句柄取 inode，句柄过期时返回 None
    pub fn inode(&self, handle: InodeHandle) -> Option<Arc<NtfsInode>> {
        self.arena.lock().get(handle)
    }

    /// 只查找已发布的 inode，不分配、不做 I/O
    ///
    /// 正在构造或已删除的对象视为不存在。
    pub fn lookup_cached(&self, key: &AttrKey) -> Option<Arc<NtfsInode>> {
        self.hash.lookup_only(key).filter(|ino| ino.is_ready())
    }

    /// 写回所有脏 MFT 记录
    pub fn sync(&self) -> Result<()> {
        log::debug!("[VOLUME] Syncing");
        self.dev.flush()
    }

    /// 卷统计信息
    pub fn stats(&self) -> VolumeStats {
        VolumeStats {
            live_inodes: self.arena.lock().len(),
            hashed_inodes: self.hash.len(),
            record_cache: self.dev.cache_stats(),
            physical_reads: self.dev.physical_read_count(),
        }
    }
}

impl<D: NtfsDevice> core::fmt::Debug for NtfsVolume<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NtfsVolume")
            .field("dev", &self.dev)
            .field("hash", &self.hash)
            .field("has_errors", &self.has_errors())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::consts::AT_DATA;
    use crate::test_utils::{MemDevice, RecordBuilder};
    use crate::types::LockMode;

    #[test]
    fn test_note_error_sets_flag_only_for_corruption() {
        let vol = NtfsVolume::new(MemDevice::new(), VolumeConfig::default()).unwrap();
        vol.note_error(5, &Error::new(ErrorKind::NotFound, "gone"));
        assert!(!vol.has_errors());
        vol.note_error(5, &Error::new(ErrorKind::Corrupted, "bad"));
        assert!(vol.has_errors());
    }

    #[test]
    fn test_case_sensitive_config() {
        let config = VolumeConfig { case_sensitive: true, ..VolumeConfig::default() };
        let vol = NtfsVolume::new(MemDevice::new(), config).unwrap();
        assert!(vol.collation().case_sensitive);
        assert_eq!(vol.stats().live_inodes, 0);
    }

    #[test]
    fn test_stats_and_cached_lookup() {
        let mut dev = MemDevice::new();
        dev.put_record(40, &RecordBuilder::file(40).resident(AT_DATA, &[], b"abc").build());
        let vol = NtfsVolume::new(dev, VolumeConfig::default()).unwrap();
        assert!(vol.lookup_cached(&AttrKey::base(40)).is_none());

        let handle = vol.resolve_base(40, LockMode::Unlocked).unwrap().handle();
        let stats = vol.stats();
        assert_eq!(stats.live_inodes, 1);
        assert_eq!(stats.hashed_inodes, 1);
        assert_eq!(stats.physical_reads, 1);

        let cached = vol.lookup_cached(&AttrKey::base(40)).unwrap();
        assert!(Arc::ptr_eq(&cached, &vol.inode(handle).unwrap()));
        assert_eq!(cached.data_size(), 3);
        vol.sync().unwrap();
        assert!(!vol.has_errors());
    }
}
