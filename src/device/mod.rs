//! 设备抽象
//!
//! - device/mod.rs [`NtfsDevice`] trait 与带统计、带记录缓存的 [`RecordDev`] 包装器
//! - device/record.rs [`MftRecordRef`]，持有 inode 记录锁的 MFT 记录映射

mod record;

pub use record::MftRecordRef;

use crate::cache::{CacheStats, RecordCache};
use crate::error::{Error, ErrorKind, Result};
use crate::record::{post_read_mst_fixup, pre_write_mst_fixup};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

/// NTFS 卷的底层设备接口
///
/// 实现者负责定位 $MFT 中的记录（包括 $MFT 本身的运行列表）以及簇的读取。
/// 记录以磁盘形式（未做多扇区修复）读写。
///
/// # 示例
///
/// ```rust,ignore
/// use ntfs_inode_core::{NtfsDevice, Result};
///
/// struct ImageFile {
///     // ...
/// }
///
/// impl NtfsDevice for ImageFile {
///     fn mft_record_size(&self) -> u32 {
///         1024
///     }
///
///     fn cluster_size(&self) -> u32 {
///         4096
///     }
///
///     fn read_mft_record(&mut self, mft_no: u64, buf: &mut [u8]) -> Result<usize> {
///         // 通过 $MFT 的运行列表定位记录并读取
///         Ok(buf.len())
///     }
///
///     fn write_mft_record(&mut self, mft_no: u64, buf: &[u8]) -> Result<usize> {
///         Ok(buf.len())
///     }
///
///     fn read_clusters(&mut self, lcn: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
///         Ok(count as usize * 4096)
///     }
/// }
/// ```
pub trait NtfsDevice {
    /// MFT 记录大小（通常 1024）
    fn mft_record_size(&self) -> u32;

    /// 簇大小（通常 4096）
    fn cluster_size(&self) -> u32;

    /// 读取一个 MFT 记录（磁盘形式）
    ///
    /// # 参数
    ///
    /// * `mft_no` - 记录号
    /// * `buf` - 目标缓冲区（大小为记录大小）
    ///
    /// # 返回
    ///
    /// 成功返回读取的字节数；记录号超出 $MFT 范围返回 `NotFound`
    fn read_mft_record(&mut self, mft_no: u64, buf: &mut [u8]) -> Result<usize>;

    /// 写入一个 MFT 记录（磁盘形式）
    fn write_mft_record(&mut self, mft_no: u64, buf: &[u8]) -> Result<usize>;

    /// 读取簇
    ///
    /// # 参数
    ///
    /// * `lcn` - 起始逻辑簇号
    /// * `count` - 簇数
    /// * `buf` - 目标缓冲区（大小至少为 count * cluster_size）
    fn read_clusters(&mut self, lcn: u64, count: u32, buf: &mut [u8]) -> Result<usize>;

    /// 刷新设备缓存
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }
}

/// 记录设备包装器
///
/// 在 [`NtfsDevice`] 之上提供：
/// - 读入记录后的多扇区修复与写出前的准备
/// - 可选的 MFT 记录缓存
/// - 逻辑/物理读写计数
///
/// 内部使用自旋锁，可以在多个线程间共享；锁顺序为先缓存后设备。
pub struct RecordDev<D> {
    device: spin::Mutex<D>,
    cache: spin::Mutex<Option<RecordCache>>,
    record_size: usize,
    cluster_size: u32,
    read_count: AtomicU64,
    physical_read_count: AtomicU64,
    write_count: AtomicU64,
    physical_write_count: AtomicU64,
}

impl<D: NtfsDevice> RecordDev<D> {
    /// 创建不带缓存的包装器
    pub fn new(device: D) -> Result<Self> {
        let record_size = device.mft_record_size() as usize;
        let cluster_size = device.cluster_size();

        if record_size == 0 || record_size % crate::consts::NTFS_BLOCK_SIZE != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "MFT record size must be a multiple of the sector size",
            ));
        }
        if !cluster_size.is_power_of_two() || (cluster_size as usize) < crate::consts::NTFS_BLOCK_SIZE {
            return Err(Error::new(ErrorKind::InvalidInput, "Invalid cluster size"));
        }

        Ok(Self {
            device: spin::Mutex::new(device),
            cache: spin::Mutex::new(None),
            record_size,
            cluster_size,
            read_count: AtomicU64::new(0),
            physical_read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            physical_write_count: AtomicU64::new(0),
        })
    }

    /// 创建带记录缓存的包装器
    ///
    /// # 参数
    ///
    /// * `device` - 底层设备
    /// * `cache_records` - 缓存记录数，0 表示不使用缓存
    pub fn new_with_cache(device: D, cache_records: usize) -> Result<Self> {
        let dev = Self::new(device)?;
        if cache_records != 0 {
            *dev.cache.lock() = Some(RecordCache::new(cache_records, dev.record_size)?);
        }
        Ok(dev)
    }

    /// MFT 记录大小
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// 簇大小
    pub fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    /// 设备是否只读
    pub fn is_read_only(&self) -> bool {
        self.device.lock().is_read_only()
    }

    /// 逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// 物理读取次数（实际设备操作）
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count.load(Ordering::Relaxed)
    }

    /// 逻辑写入次数
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// 物理写入次数
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count.load(Ordering::Relaxed)
    }

    /// 从设备读取并修复一个记录
    fn read_from_device(&self, mft_no: u64, buf: &mut [u8]) -> Result<()> {
        self.physical_read_count.fetch_add(1, Ordering::Relaxed);
        let n = self.device.lock().read_mft_record(mft_no, buf)?;
        if n != buf.len() {
            return Err(Error::new(ErrorKind::Io, "Short read of MFT record"));
        }
        post_read_mst_fixup(buf)
    }

    /// 读取一个 MFT 记录，返回修复后的映像
    ///
    /// 只做多扇区修复，记录头的校验由调用者完成。
    pub fn load_record(&self, mft_no: u64) -> Result<Vec<u8>> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let mut out = Vec::new();
        out.try_reserve_exact(self.record_size)?;
        out.resize(self.record_size, 0);

        // 缓存只在构造时设置
        if self.cache.lock().is_none() {
            self.read_from_device(mft_no, &mut out)?;
            return Ok(out);
        }
        let mut guard = self.cache.lock();
        let Some(cache) = guard.as_mut() else {
            return Err(Error::new(ErrorKind::InvalidState, "Record cache vanished"));
        };

        let written = cache.make_room(mft_no, &self.device)?;
        self.physical_write_count.fetch_add(written as u64, Ordering::Relaxed);
        let (buf, _) = cache.alloc(mft_no)?;
        if !buf.is_uptodate() {
            if let Err(e) = self.read_from_device(mft_no, &mut buf.data) {
                cache.invalidate(mft_no);
                return Err(e);
            }
            buf.mark_uptodate();
        }
        out.copy_from_slice(&buf.data);
        Ok(out)
    }

    /// 写入一个 MFT 记录（修复后的映像）
    ///
    /// 启用缓存时只写入缓存并标记为脏，否则立即写穿到设备。
    pub fn store_record(&self, mft_no: u64, data: &[u8]) -> Result<()> {
        if data.len() != self.record_size {
            return Err(Error::new(ErrorKind::InvalidInput, "Record image has the wrong size"));
        }
        if self.is_read_only() {
            return Err(Error::new(ErrorKind::InvalidState, "Device is read-only"));
        }
        self.write_count.fetch_add(1, Ordering::Relaxed);

        let mut guard = self.cache.lock();
        if let Some(cache) = guard.as_mut() {
            let written = cache.make_room(mft_no, &self.device)?;
            self.physical_write_count.fetch_add(written as u64, Ordering::Relaxed);
            return cache.write_record(mft_no, data);
        }
        drop(guard);

        let mut image = Vec::new();
        image.try_reserve_exact(data.len())?;
        image.extend_from_slice(data);
        pre_write_mst_fixup(&mut image)?;
        self.physical_write_count.fetch_add(1, Ordering::Relaxed);
        self.device.lock().write_mft_record(mft_no, &image)?;
        Ok(())
    }

    /// 读取簇（不经过记录缓存）
    pub fn read_clusters(&self, lcn: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let required = count as usize * self.cluster_size as usize;
        if buf.len() < required {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Buffer too small for requested clusters",
            ));
        }
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.physical_read_count.fetch_add(1, Ordering::Relaxed);
        self.device.lock().read_clusters(lcn, count, buf)
    }

    /// 写回所有脏记录并刷新设备
    pub fn flush(&self) -> Result<()> {
        let mut guard = self.cache.lock();
        let mut device = self.device.lock();
        if let Some(cache) = guard.as_mut() {
            let written = cache.flush_all(&mut *device)?;
            self.physical_write_count.fetch_add(written as u64, Ordering::Relaxed);
        }
        device.flush()
    }

    /// 使缓存中的记录失效
    pub fn invalidate_record(&self, mft_no: u64) {
        if let Some(cache) = self.cache.lock().as_mut() {
            cache.invalidate(mft_no);
        }
    }

    /// 缓存统计信息（未启用缓存时为 None）
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.lock().as_ref().map(|c| c.stats())
    }

    /// 映射一个 MFT 记录，映射期间持有 `lock`
    pub fn map<'a>(&'a self, lock: &'a spin::Mutex<()>, mft_no: u64) -> Result<MftRecordRef<'a, D>> {
        let guard = lock.lock();
        let data = self.load_record(mft_no)?;
        Ok(MftRecordRef::new(self, guard, mft_no, data))
    }
}

impl<D> core::fmt::Debug for RecordDev<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordDev")
            .field("record_size", &self.record_size)
            .field("cluster_size", &self.cluster_size)
            .field("read_count", &self.read_count)
            .field("physical_read_count", &self.physical_read_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemDevice, RecordBuilder};

    #[test]
    fn test_load_record_applies_fixup() {
        let mut dev = MemDevice::new();
        let image = RecordBuilder::new(12).seq(4).build();
        dev.put_record(12, &image);
        let rd = RecordDev::new(dev).unwrap();

        let loaded = rd.load_record(12).unwrap();
        assert_eq!(loaded, image);
        assert_eq!(rd.physical_read_count(), 1);
    }

    #[test]
    fn test_cached_reads_hit() {
        let mut dev = MemDevice::new();
        dev.put_record(12, &RecordBuilder::new(12).build());
        let rd = RecordDev::new_with_cache(dev, 4).unwrap();

        rd.load_record(12).unwrap();
        rd.load_record(12).unwrap();
        assert_eq!(rd.read_count(), 2);
        assert_eq!(rd.physical_read_count(), 1);
        assert_eq!(rd.cache_stats().unwrap().hits, 1);
    }

    #[test]
    fn test_failed_read_is_not_cached() {
        let mut dev = MemDevice::new();
        let mut raw = RecordBuilder::new(12).build();
        raw[100] = 1;
        dev.put_record(12, &raw);
        dev.tear_record(12);
        let rd = RecordDev::new_with_cache(dev, 4).unwrap();

        assert!(rd.load_record(12).unwrap_err().is_corruption());
        assert_eq!(rd.cache_stats().unwrap().dirty_records, 0);
        assert!(rd.load_record(12).is_err());
        assert_eq!(rd.physical_read_count(), 2);
    }

    #[test]
    fn test_store_write_back() {
        let mut dev = MemDevice::new();
        dev.put_record(3, &RecordBuilder::new(3).build());
        let rd = RecordDev::new_with_cache(dev, 4).unwrap();

        let mut image = rd.load_record(3).unwrap();
        image[0x100] = 0x5A;
        rd.store_record(3, &image).unwrap();
        assert_eq!(rd.physical_write_count(), 0);
        assert_eq!(rd.load_record(3).unwrap()[0x100], 0x5A);

        rd.flush().unwrap();
        assert_eq!(rd.physical_write_count(), 1);
        rd.invalidate_record(3);
        assert_eq!(rd.load_record(3).unwrap()[0x100], 0x5A);
    }

    #[test]
    fn test_store_write_through() {
        let mut dev = MemDevice::new();
        dev.put_record(3, &RecordBuilder::new(3).build());
        let rd = RecordDev::new(dev).unwrap();

        let mut image = rd.load_record(3).unwrap();
        image[0x100] = 0x5A;
        rd.store_record(3, &image).unwrap();
        assert_eq!(rd.physical_write_count(), 1);
        assert_eq!(rd.load_record(3).unwrap()[0x100], 0x5A);
    }
}
