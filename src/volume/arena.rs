//! 卷的 inode arena（存活 inode 列表）
//!
//! 所有 inode 都登记在这里，子对象通过 [`InodeHandle`] 引用基本 inode。
//! 槽位释放后代际计数递增，旧句柄因此失效。

use crate::error::Result;
use crate::inode::{InodeHandle, NtfsInode};
use alloc::sync::Arc;
use alloc::vec::Vec;

struct Slot {
    generation: u32,
    inode: Option<Arc<NtfsInode>>,
}

/// inode arena
#[derive(Default)]
pub struct InodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl InodeArena {
    /// 创建空 arena
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配槽位并用 `make` 构造对象
    pub fn insert_with<F>(&mut self, make: F) -> Result<Arc<NtfsInode>>
    where
        F: FnOnce(InodeHandle) -> NtfsInode,
    {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.try_reserve(1)?;
                self.free.try_reserve(self.slots.len() + 1)?;
                self.slots.push(Slot { generation: 0, inode: None });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let handle = InodeHandle { index, generation: slot.generation };
        let inode = Arc::new(make(handle));
        slot.inode = Some(inode.clone());
        self.live += 1;
        Ok(inode)
    }

    /// 按句柄取对象，句柄过期时返回 None
    pub fn get(&self, handle: InodeHandle) -> Option<Arc<NtfsInode>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.inode.clone()
    }

    /// 移除对象，返回是否移除成功
    pub fn remove(&mut self, handle: InodeHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation || slot.inode.is_none() {
            return false;
        }
        slot.inode = None;
        slot.generation = slot.generation.wrapping_add(1);
        // 容量已在插入时预留
        self.free.push(handle.index);
        self.live -= 1;
        true
    }

    /// 存活对象数
    pub fn len(&self) -> usize {
        self.live
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

impl core::fmt::Debug for InodeArena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeArena")
            .field("slots", &self.slots.len())
            .field("live", &self.live)
            .finish()
    }
}
