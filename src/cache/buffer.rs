//! 缓存的 MFT 记录

use alloc::vec::Vec;
use bitflags::bitflags;

bitflags! {
    /// 记录缓存项标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u8 {
        /// 数据有效（已完成读后修复）
        const UPTODATE = 0x01;
        /// 数据已修改，需要写回
        const DIRTY    = 0x02;
    }
}

/// 一个缓存的 MFT 记录
///
/// `data` 保存已经完成多扇区修复的逻辑形式，写回设备前再做写前准备。
#[derive(Debug)]
pub struct RecordBuffer {
    /// MFT 记录号
    pub mft_no: u64,
    /// 记录数据
    pub data: Vec<u8>,
    /// 状态标志
    pub flags: BufferFlags,
}

impl RecordBuffer {
    /// 创建空记录缓冲区
    pub fn new(mft_no: u64, record_size: usize) -> Self {
        Self {
            mft_no,
            data: alloc::vec![0u8; record_size],
            flags: BufferFlags::empty(),
        }
    }

    /// 标记为脏
    pub fn mark_dirty(&mut self) {
        self.flags.insert(BufferFlags::DIRTY);
    }

    /// 标记为干净
    pub fn mark_clean(&mut self) {
        self.flags.remove(BufferFlags::DIRTY);
    }

    /// 是否为脏
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(BufferFlags::DIRTY)
    }

    /// 标记数据有效
    pub fn mark_uptodate(&mut self) {
        self.flags.insert(BufferFlags::UPTODATE);
    }

    /// 数据是否有效
    pub fn is_uptodate(&self) -> bool {
        self.flags.contains(BufferFlags::UPTODATE)
    }
}
