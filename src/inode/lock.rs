//! 每个 inode 的主读写锁
//!
//! 解析层需要"带锁返回"对象：锁在一个调用中获取，在另一个调用中释放，
//! 因此不能用守卫的作用域表达。这里在 `spin::RwLock` 之上提供显式的
//! lock/unlock 接口（获取后遗忘守卫，释放时强制解锁）。

use core::mem;

/// inode 主锁
pub struct InodeLock {
    raw: spin::RwLock<()>,
}

/// 调用者持有的锁类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeldLock {
    /// 不持有
    None,
    /// 共享锁
    Shared,
    /// 独占锁
    Exclusive,
}

impl InodeLock {
    /// 创建未加锁的锁
    pub const fn new() -> Self {
        Self { raw: spin::RwLock::new(()) }
    }

    /// 获取共享锁
    pub fn lock_shared(&self) {
        mem::forget(self.raw.read());
    }

    /// 获取独占锁
    pub fn lock_exclusive(&self) {
        mem::forget(self.raw.write());
    }

    /// 尝试获取独占锁
    pub fn try_lock_exclusive(&self) -> bool {
        match self.raw.try_write() {
            Some(guard) => {
                mem::forget(guard);
                true
            }
            None => false,
        }
    }

    /// 释放共享锁
    ///
    /// # Safety
    ///
    /// 调用者必须持有一个通过 [`lock_shared`](Self::lock_shared) 获取的共享锁。
    pub unsafe fn unlock_shared(&self) {
        // SAFETY: 由调用者保证持有共享锁
        unsafe { self.raw.force_read_decrement() }
    }

    /// 释放独占锁
    ///
    /// # Safety
    ///
    /// 调用者必须持有通过 [`lock_exclusive`](Self::lock_exclusive) 获取的独占锁。
    pub unsafe fn unlock_exclusive(&self) {
        // SAFETY: 由调用者保证持有独占锁
        unsafe { self.raw.force_write_unlock() }
    }

    /// 释放调用者持有的锁
    ///
    /// # Safety
    ///
    /// `held` 必须与调用者实际持有的锁一致。
    pub unsafe fn release(&self, held: HeldLock) {
        match held {
            HeldLock::None => {}
            // SAFETY: 由调用者保证
            HeldLock::Shared => unsafe { self.unlock_shared() },
            HeldLock::Exclusive => unsafe { self.unlock_exclusive() },
        }
    }

    /// 是否被独占持有
    pub fn is_locked_exclusive(&self) -> bool {
        self.raw.writer_count() != 0
    }

    /// 当前共享持有者数量
    pub fn reader_count(&self) -> usize {
        self.raw.reader_count()
    }
}

impl Default for InodeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InodeLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeLock")
            .field("exclusive", &self.is_locked_exclusive())
            .field("readers", &self.reader_count())
            .finish()
    }
}
