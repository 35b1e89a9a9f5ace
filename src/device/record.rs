//! MFT 记录映射
//!
//! 对应一个 inode 的 "map/unmap" 配对：映射期间持有该 inode 的记录锁，
//! 同一记录不会被并发地映射两次。修改过的映射在解除时写回。

use super::{NtfsDevice, RecordDev};
use crate::error::Result;
use crate::record::MftRecordHeader;
use alloc::vec::Vec;

/// 已映射的 MFT 记录
///
/// 类似 RAII 块句柄：`unmap()` 显式解除并返回写回结果，
/// 直接 drop 时同样写回，但只能记录错误。
pub struct MftRecordRef<'a, D: NtfsDevice> {
    dev: &'a RecordDev<D>,
    _guard: spin::MutexGuard<'a, ()>,
    mft_no: u64,
    data: Vec<u8>,
    dirty: bool,
    released: bool,
}

impl<'a, D: NtfsDevice> MftRecordRef<'a, D> {
    pub(super) fn new(
        dev: &'a RecordDev<D>,
        guard: spin::MutexGuard<'a, ()>,
        mft_no: u64,
        data: Vec<u8>,
    ) -> Self {
        Self {
            dev,
            _guard: guard,
            mft_no,
            data,
            dirty: false,
            released: false,
        }
    }

    /// 记录号
    pub fn mft_no(&self) -> u64 {
        self.mft_no
    }

    /// 记录数据（修复后的映像）
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 可变记录数据，调用后映射被标记为脏
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        &mut self.data
    }

    /// 解析记录头
    pub fn header(&self) -> Result<MftRecordHeader> {
        MftRecordHeader::parse(&self.data)
    }

    /// 是否被修改过
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn do_release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.dirty {
            self.dev.store_record(self.mft_no, &self.data)?;
            self.dirty = false;
        }
        Ok(())
    }

    /// 解除映射，写回修改
    pub fn unmap(mut self) -> Result<()> {
        self.do_release()
    }
}

impl<'a, D: NtfsDevice> Drop for MftRecordRef<'a, D> {
    fn drop(&mut self) {
        if let Err(e) = self.do_release() {
            log::error!("[RECORD] Failed to write back MFT record {}: {}", self.mft_no, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MemDevice, RecordBuilder};

    #[test]
    fn test_map_and_unmap_writes_back() {
        let mut dev = MemDevice::new();
        dev.put_record(8, &RecordBuilder::new(8).seq(2).build());
        let rd = RecordDev::new(dev).unwrap();
        let lock = spin::Mutex::new(());

        let mut m = rd.map(&lock, 8).unwrap();
        assert_eq!(m.header().unwrap().sequence_number, 2);
        assert!(lock.is_locked());
        m.data_mut()[0x120] = 7;
        m.unmap().unwrap();
        assert!(!lock.is_locked());
        assert_eq!(rd.physical_write_count(), 1);

        let m = rd.map(&lock, 8).unwrap();
        assert_eq!(m.data()[0x120], 7);
        drop(m);
        // 未修改的映射不写回
        assert_eq!(rd.physical_write_count(), 1);
    }

    #[test]
    fn test_drop_writes_back() {
        let mut dev = MemDevice::new();
        dev.put_record(8, &RecordBuilder::new(8).build());
        let rd = RecordDev::new(dev).unwrap();
        let lock = spin::Mutex::new(());
        {
            let mut m = rd.map(&lock, 8).unwrap();
            m.data_mut()[0x120] = 9;
        }
        assert_eq!(rd.load_record(8).unwrap()[0x120], 9);
    }
}
