//! 卷配置与宿主接口

use crate::cache::DEFAULT_RECORD_CACHE_SIZE;
use crate::consts::NTFS_DEFAULT_MAX_INDEX_BLOCK_SIZE;
use crate::inode::NtfsInode;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// 宿主的文件对象 (vnode) 接口
///
/// 回收基本 inode 时，已挂接文件对象的属性 inode 必须由宿主自己关闭。
///
/// # 示例
///
/// ```ignore
/// struct MyHost;
/// impl VnodeHost for MyHost {
///     fn recycle(&self, inode: &Arc<NtfsInode>) {
///         // 让宿主尽快释放该 inode 的文件对象，随后宿主调用 reclaim
///     }
/// }
/// ```
pub trait VnodeHost: Send + Sync {
    /// 请求宿主回收 inode 上挂接的文件对象
    fn recycle(&self, _inode: &Arc<NtfsInode>) {}

    /// 排空循环每一轮之间的退避
    fn relax(&self, _round: u64) {
        core::hint::spin_loop();
    }
}

/// 不挂接任何文件对象的宿主
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVnodeHost;

impl VnodeHost for NoVnodeHost {}

/// 卷配置
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    /// 属性名是否区分大小写
    pub case_sensitive: bool,
    /// 文件所有者
    pub uid: u32,
    /// 文件组
    pub gid: u32,
    /// 文件权限掩码
    pub fmask: u32,
    /// 目录权限掩码
    pub dmask: u32,
    /// MFT 记录缓存大小（记录数，0 表示不缓存）
    pub record_cache_size: usize,
    /// 排空循环每隔多少轮打印一次警告
    pub drain_warn_rounds: u64,
    /// 支持的最大索引块大小
    pub max_index_block_size: u32,
    /// $UpCase 表
    pub upcase: Option<Vec<u16>>,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            uid: 0,
            gid: 0,
            fmask: 0o022,
            dmask: 0o022,
            record_cache_size: DEFAULT_RECORD_CACHE_SIZE,
            drain_warn_rounds: 100_000,
            max_index_block_size: NTFS_DEFAULT_MAX_INDEX_BLOCK_SIZE,
            upcase: None,
        }
    }
}

/// 卷统计信息
#[derive(Debug, Clone, Default)]
pub struct VolumeStats {
    /// 存活的 inode 数
    pub live_inodes: usize,
    /// 哈希表中的 inode 数
    pub hashed_inodes: usize,
    /// 记录缓存统计
    pub record_cache: Option<crate::cache::CacheStats>,
    /// 物理读取次数
    pub physical_reads: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VolumeConfig::default();
        assert!(!config.case_sensitive);
        assert_eq!(config.fmask, 0o022);
        assert_eq!(config.record_cache_size, DEFAULT_RECORD_CACHE_SIZE);
        assert_eq!(config.max_index_block_size, 4096);
    }
}
