//! MFT 记录缓存
//!
//! 以记录号为键的 LRU 缓存，缓存项保存修复后的记录映像。
//! 驱逐只会选择干净的记录；全部为脏时返回 `NoSpace`，由调用者先刷新再重试。

use super::buffer::RecordBuffer;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::record::{post_read_mst_fixup, pre_write_mst_fixup};
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::num::NonZeroUsize;
use lru::LruCache;

/// 默认缓存记录数
pub const DEFAULT_RECORD_CACHE_SIZE: usize = 64;

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 命中次数
    pub hits: u64,
    /// 未命中次数
    pub misses: u64,
    /// 写回次数
    pub writebacks: u64,
    /// 当前脏记录数
    pub dirty_records: usize,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// MFT 记录缓存
pub struct RecordCache {
    cache: LruCache<u64, RecordBuffer>,
    dirty_set: BTreeSet<u64>,
    record_size: usize,
    stats: CacheStats,
}

impl RecordCache {
    /// 创建缓存
    ///
    /// # 参数
    ///
    /// * `capacity` - 缓存记录数（必须非零）
    /// * `record_size` - MFT 记录大小
    pub fn new(capacity: usize, record_size: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity)
            .ok_or(Error::new(ErrorKind::InvalidInput, "Record cache capacity must be non-zero"))?;
        Ok(Self {
            cache: LruCache::new(cap),
            dirty_set: BTreeSet::new(),
            record_size,
            stats: CacheStats::default(),
        })
    }

    /// 分配缓存项
    ///
    /// 返回 `(缓存项, 是否新分配)`。新分配的缓存项需要调用者填充数据后标记有效。
    pub fn alloc(&mut self, mft_no: u64) -> Result<(&mut RecordBuffer, bool)> {
        self.stats.total_accesses += 1;

        if self.cache.contains(&mft_no) {
            self.stats.hits += 1;
            let buf = self
                .cache
                .get_mut(&mft_no)
                .ok_or(Error::new(ErrorKind::InvalidState, "Cached record vanished"))?;
            log::trace!("[CACHE] record {} HIT (dirty={})", mft_no, buf.is_dirty());
            return Ok((buf, false));
        }

        self.stats.misses += 1;
        log::debug!(
            "[CACHE] record {} MISS, cache={}/{}",
            mft_no,
            self.cache.len(),
            self.cache.cap().get()
        );

        if self.cache.len() >= self.cache.cap().get() {
            self.evict_one()?;
        }
        self.cache.put(mft_no, RecordBuffer::new(mft_no, self.record_size));
        let buf = self
            .cache
            .get_mut(&mft_no)
            .ok_or(Error::new(ErrorKind::InvalidState, "Cached record vanished"))?;
        Ok((buf, true))
    }

    /// 从 LRU 端驱逐一个干净的记录
    fn evict_one(&mut self) -> Result<()> {
        // iter() 从最近使用到最久未使用
        let victim = self
            .cache
            .iter()
            .rev()
            .map(|(k, _)| *k)
            .find(|k| !self.dirty_set.contains(k));

        match victim {
            Some(mft_no) => {
                self.cache.pop(&mft_no);
                log::debug!("[CACHE] Evicted clean record {}", mft_no);
                Ok(())
            }
            None => {
                log::warn!("[CACHE] Cannot evict: all {} records are dirty", self.cache.len());
                Err(Error::new(ErrorKind::NoSpace, "All cached records are dirty"))
            }
        }
    }

    /// 为 `mft_no` 腾出位置
    ///
    /// 缓存已满且所有记录都为脏时先写回全部脏记录。返回写回的记录数。
    pub fn make_room<D: NtfsDevice>(&mut self, mft_no: u64, device: &spin::Mutex<D>) -> Result<usize> {
        if self.cache.contains(&mft_no) || self.cache.len() < self.cache.cap().get() {
            return Ok(0);
        }
        match self.evict_one() {
            Err(e) if e.kind() == ErrorKind::NoSpace => {
                let written = self.flush_all(&mut *device.lock())?;
                self.evict_one()?;
                Ok(written)
            }
            other => other.map(|_| 0),
        }
    }

    /// 查找有效的缓存记录
    pub fn peek(&self, mft_no: u64) -> Option<&[u8]> {
        self.cache
            .peek(&mft_no)
            .filter(|b| b.is_uptodate())
            .map(|b| b.data.as_slice())
    }

    /// 写入记录并标记为脏
    pub fn write_record(&mut self, mft_no: u64, data: &[u8]) -> Result<()> {
        let (buf, _) = self.alloc(mft_no)?;
        if data.len() != buf.data.len() {
            return Err(Error::new(ErrorKind::InvalidInput, "Record image has the wrong size"));
        }
        buf.data.copy_from_slice(data);
        buf.mark_uptodate();
        buf.mark_dirty();
        self.dirty_set.insert(mft_no);
        Ok(())
    }

    /// 写回单个脏记录
    pub fn flush_record<D: NtfsDevice>(&mut self, mft_no: u64, device: &mut D) -> Result<()> {
        let Some(buf) = self.cache.peek_mut(&mft_no) else {
            self.dirty_set.remove(&mft_no);
            return Ok(());
        };
        if !buf.is_dirty() {
            return Ok(());
        }
        let mut image = Vec::new();
        image.try_reserve_exact(buf.data.len())?;
        image.extend_from_slice(&buf.data);
        pre_write_mst_fixup(&mut image)?;
        device.write_mft_record(mft_no, &image)?;
        // 磁盘上的 USN 已递增，缓存中的映像同步更新
        post_read_mst_fixup(&mut image)?;
        buf.data.copy_from_slice(&image);
        buf.mark_clean();
        self.dirty_set.remove(&mft_no);
        self.stats.writebacks += 1;
        log::debug!("[CACHE] Wrote back record {}", mft_no);
        Ok(())
    }

    /// 写回所有脏记录，返回写回数量
    pub fn flush_all<D: NtfsDevice>(&mut self, device: &mut D) -> Result<usize> {
        let dirty: Vec<u64> = self.dirty_set.iter().copied().collect();
        log::debug!("[CACHE] Flushing {} dirty records", dirty.len());
        for mft_no in &dirty {
            self.flush_record(*mft_no, device)?;
        }
        Ok(dirty.len())
    }

    /// 使记录失效（不写回）
    pub fn invalidate(&mut self, mft_no: u64) {
        self.cache.pop(&mft_no);
        self.dirty_set.remove(&mft_no);
    }

    /// 统计信息
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.dirty_records = self.dirty_set.len();
        stats
    }

    /// 缓存容量
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// 当前缓存记录数
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// 脏记录数
    pub fn dirty_count(&self) -> usize {
        self.dirty_set.len()
    }
}

impl core::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordCache")
            .field("capacity", &self.cache.cap())
            .field("len", &self.cache.len())
            .field("dirty_count", &self.dirty_set.len())
            .field("record_size", &self.record_size)
            .field("stats", &self.stats)
            .finish()
    }
}
