//! 身份哈希缓存
//!
//! 每个卷一张表，把 (记录号, 属性类型, 属性名, raw) 映射到唯一的内存对象。
//! 表锁只在插入、查找、移除时持有，从不跨越 MFT 记录 I/O。

use crate::error::Result;
use crate::inode::{AttrKey, InodeState, NtfsInode};
use crate::name::NameCollation;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// inode 哈希表
pub struct InodeHash {
    buckets: spin::Mutex<BTreeMap<(u64, u32, bool), Vec<Arc<NtfsInode>>>>,
    collation: Arc<NameCollation>,
}

impl InodeHash {
    /// 创建空表
    pub fn new(collation: Arc<NameCollation>) -> Self {
        Self {
            buckets: spin::Mutex::new(BTreeMap::new()),
            collation,
        }
    }

    fn find(
        &self,
        buckets: &BTreeMap<(u64, u32, bool), Vec<Arc<NtfsInode>>>,
        key: &AttrKey,
    ) -> Option<Arc<NtfsInode>> {
        buckets
            .get(&key.bucket())?
            .iter()
            .find(|ino| ino.key().matches(key, &self.collation))
            .cloned()
    }

    /// 查找或创建
    ///
    /// 已存在时返回 `(对象, false)`；否则调用 `make` 分配新对象，
    /// 将其置为 `Resolving` 并插入，返回 `(对象, true)`。
    /// 整个过程在表锁下完成，同一个键只会创建一次。
    pub fn get_or_create<F>(&self, key: &AttrKey, make: F) -> Result<(Arc<NtfsInode>, bool)>
    where
        F: FnOnce() -> Result<Arc<NtfsInode>>,
    {
        let mut buckets = self.buckets.lock();
        if let Some(ino) = self.find(&buckets, key) {
            log::trace!("[HASH] Found inode {} type {:#x}", key.mft_no, key.ty);
            return Ok((ino, false));
        }

        let bucket = buckets.entry(key.bucket()).or_default();
        bucket.try_reserve(1)?;
        let ino = make()?;
        ino.set_state(InodeState::Resolving);
        bucket.push(ino.clone());
        log::trace!("[HASH] Inserted inode {} type {:#x}", key.mft_no, key.ty);
        Ok((ino, true))
    }

    /// 只查找，不分配
    pub fn lookup_only(&self, key: &AttrKey) -> Option<Arc<NtfsInode>> {
        let buckets = self.buckets.lock();
        self.find(&buckets, key)
    }

    fn remove_locked(
        buckets: &mut BTreeMap<(u64, u32, bool), Vec<Arc<NtfsInode>>>,
        inode: &NtfsInode,
    ) -> bool {
        let bucket_key = inode.key().bucket();
        let Some(bucket) = buckets.get_mut(&bucket_key) else {
            return false;
        };
        let Some(pos) = bucket.iter().position(|i| core::ptr::eq(Arc::as_ptr(i), inode)) else {
            return false;
        };
        bucket.swap_remove(pos);
        if bucket.is_empty() {
            buckets.remove(&bucket_key);
        }
        true
    }

    /// 从表中移除对象，返回对象是否在表中
    pub fn remove(&self, inode: &NtfsInode) -> bool {
        let mut buckets = self.buckets.lock();
        Self::remove_locked(&mut buckets, inode)
    }

    /// 在表锁下移除对象并执行 `f`
    ///
    /// 用于删除标记：移除与状态变更对并发查找是原子的。
    pub fn unhash_with<F: FnOnce()>(&self, inode: &NtfsInode, f: F) -> bool {
        let mut buckets = self.buckets.lock();
        let removed = Self::remove_locked(&mut buckets, inode);
        f();
        removed
    }

    /// 表中对象数
    pub fn len(&self) -> usize {
        self.buckets.lock().values().map(Vec::len).sum()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for InodeHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeHash").field("len", &self.len()).finish()
    }
}
