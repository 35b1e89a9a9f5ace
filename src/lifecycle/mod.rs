//! inode 回收、排空、释放与删除标记
//!
//! 基本 inode 被回收前必须先排空挂接的属性 inode：已挂接宿主文件对象的
//! 子对象交给宿主回收，其余的直接回收。排空没有超时，只定期打印警告。
//! 扩展 inode 没有宿主文件对象，随基本 inode 一起释放。

use crate::device::NtfsDevice;
use crate::inode::{InodeHandle, InodeKind, InodeState, NtfsInode};
use crate::volume::NtfsVolume;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

impl<D: NtfsDevice> NtfsVolume<D> {
    /// 无条件回收 inode
    ///
    /// 宿主在文件对象生命周期结束时调用。重复调用只有第一次生效。
    pub fn reclaim(&self, ino: &Arc<NtfsInode>) {
        if ino.reclaiming.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("[RECLAIM] Reclaiming inode {:#x} type {:#x}", ino.mft_no(), ino.key().ty);
        if ino.kind() == InodeKind::Base {
            self.drain(ino);
        }
        ino.set_vnode_attached(false);
        self.free_inode(ino);
    }

    /// 排空基本 inode 的属性 inode
    fn drain(&self, base: &Arc<NtfsInode>) {
        base.attached.lock().closed = true;
        let warn_rounds = self.config.drain_warn_rounds.max(1);
        let mut round = 0u64;
        loop {
            let pending: Vec<InodeHandle> = base.attached.lock().attrs.iter().flatten().copied().collect();
            if pending.is_empty() {
                break;
            }
            for handle in &pending {
                // 已被其他线程释放
                let Some(child) = self.arena.lock().get(*handle) else {
                    continue;
                };
                if !child.is_vnode_attached() {
                    self.reclaim(&child);
                } else if !child.recycle_requested.swap(true, Ordering::AcqRel) {
                    self.host.recycle(&child);
                }
            }
            round += 1;
            if round % warn_rounds == 0 {
                log::warn!(
                    "[RECLAIM] Inode {:#x}: still waiting for {} attribute inodes after {} rounds",
                    base.mft_no(),
                    pending.len(),
                    round
                );
            }
            self.host.relax(round);
        }
        if round != 0 {
            log::debug!("[RECLAIM] Inode {:#x} drained after {} rounds", base.mft_no(), round);
        }
    }

    /// 释放 inode：移出哈希表、释放运行列表与属性列表、从基本 inode 摘下、移出 arena
    ///
    /// 构造失败与回收共用这条路径。基本 inode 连同其扩展 inode 一起释放。
    pub(crate) fn free_inode(&self, ino: &NtfsInode) {
        self.hash.remove(ino);
        if ino.kind() == InodeKind::Base {
            let extents: Vec<InodeHandle> = {
                let mut attached = ino.attached.lock();
                attached.closed = true;
                attached.extents.iter().flatten().copied().collect()
            };
            for handle in extents {
                let ext = self.arena.lock().get(handle);
                if let Some(ext) = ext {
                    self.free_inode(&ext);
                }
            }
        }

        {
            let mut info = ino.info_mut();
            info.runlist = None;
            info.attr_list = None;
            info.attr_list_runlist = None;
        }

        if let Some(base_handle) = ino.base() {
            let base = self.arena.lock().get(base_handle);
            match base {
                Some(base) => {
                    base.detach(ino);
                }
                None => {
                    ino.clear_base();
                }
            }
        }
        self.arena.lock().remove(ino.handle());
        ino.set_state(InodeState::Freed);
        log::trace!("[RECLAIM] Freed inode {:#x} ({:?})", ino.mft_no(), ino.kind());
    }

    /// 标记 inode 已删除
    ///
    /// 在哈希表锁下同时完成移除与状态变更：之后的查找要么得到 `NotFound`，
    /// 要么创建新的对象，不会再得到这个对象。
    pub fn delete_inode(&self, ino: &NtfsInode) {
        self.hash.unhash_with(ino, || ino.set_state(InodeState::Deleted));
        log::debug!("[RECLAIM] Inode {:#x} type {:#x} marked deleted", ino.mft_no(), ino.key().ty);
    }
}
