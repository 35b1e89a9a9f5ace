//! MFT 记录缓存
//!
//! # 主要组件
//!
//! - [`RecordBuffer`] - 单个缓存记录，保存修复后的记录映像与状态标志
//! - [`RecordCache`] - 以记录号为键的 LRU 缓存（基于 `lru` crate），跟踪脏记录
//! - [`CacheStats`] - 命中/未命中/写回统计
//!
//! 缓存由 [`crate::device::RecordDev`] 持有并在自旋锁下访问。
//! 驱逐只选择干净记录；所有记录都为脏时返回 `NoSpace`，
//! `RecordDev` 会先写回全部脏记录再重试。

mod buffer;
mod record_cache;

pub use buffer::{BufferFlags, RecordBuffer};
pub use record_cache::{CacheStats, RecordCache, DEFAULT_RECORD_CACHE_SIZE};
