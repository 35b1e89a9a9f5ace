//! 带锁返回的 inode

use super::lock::HeldLock;
use super::object::NtfsInode;
use alloc::sync::Arc;
use core::ops::Deref;

/// 解析结果：inode 引用及调用者持有的锁
///
/// drop 时释放所持有的锁；以 `AlreadyLocked` 或 `Unlocked` 模式返回的守卫不持有锁。
pub struct InodeGuard {
    inode: Arc<NtfsInode>,
    held: HeldLock,
}

impl InodeGuard {
    /// 包装一个已按 `held` 加锁的 inode
    pub(crate) fn new(inode: Arc<NtfsInode>, held: HeldLock) -> Self {
        Self { inode, held }
    }

    /// inode 引用
    pub fn inode(&self) -> &Arc<NtfsInode> {
        &self.inode
    }

    /// 持有的锁
    pub fn held(&self) -> HeldLock {
        self.held
    }

    /// 释放锁，返回 inode 引用
    pub fn unlock(mut self) -> Arc<NtfsInode> {
        self.release();
        self.inode.clone()
    }

    fn release(&mut self) {
        let held = core::mem::replace(&mut self.held, HeldLock::None);
        // SAFETY: held 记录的正是本守卫获取的锁，且只释放一次
        unsafe { self.inode.lock().release(held) };
    }
}

impl Deref for InodeGuard {
    type Target = NtfsInode;

    fn deref(&self) -> &NtfsInode {
        &self.inode
    }
}

impl Drop for InodeGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl core::fmt::Debug for InodeGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeGuard")
            .field("inode", &self.inode)
            .field("held", &self.held)
            .finish()
    }
}
