//! MFT 记录头解析与校验

use super::{align8, corrupt, read_u16, read_u32, read_u64};
use crate::consts::*;
use crate::error::Result;
use crate::types::{MftRecordFlags, MftRef};
use byteorder::{ByteOrder, LittleEndian};

/// MFT 记录头
#[derive(Debug, Clone, Copy)]
pub struct MftRecordHeader {
    /// 序列号
    pub sequence_number: u16,
    /// 硬链接数
    pub link_count: u16,
    /// 第一个属性的偏移
    pub attrs_offset: u16,
    /// 记录标志
    pub flags: MftRecordFlags,
    /// 已使用字节数
    pub bytes_in_use: u32,
    /// 分配字节数（等于记录大小）
    pub bytes_allocated: u32,
    /// 基本记录引用（扩展记录非零）
    pub base_mft_record: MftRef,
    /// 下一个属性实例号
    pub next_attr_instance: u16,
}

impl MftRecordHeader {
    /// 解析并校验记录头
    ///
    /// 只检查记录本身的结构一致性（魔数、长度、属性起点），
    /// 是否在用、是否为扩展记录由调用者判断。
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < MFT_RECORD_HEADER_SIZE {
            return Err(corrupt("MFT record is too small"));
        }
        let magic = &buf[0..4];
        if magic == BAAD_RECORD_MAGIC {
            return Err(corrupt("MFT record is marked BAAD"));
        }
        if magic != MFT_RECORD_MAGIC {
            return Err(corrupt("MFT record magic is not FILE"));
        }

        let hdr = Self {
            sequence_number: read_u16(buf, MFT_HDR_SEQUENCE_NUMBER)?,
            link_count: read_u16(buf, MFT_HDR_LINK_COUNT)?,
            attrs_offset: read_u16(buf, MFT_HDR_ATTRS_OFFSET)?,
            flags: MftRecordFlags::from_bits_retain(read_u16(buf, MFT_HDR_FLAGS)?),
            bytes_in_use: read_u32(buf, MFT_HDR_BYTES_IN_USE)?,
            bytes_allocated: read_u32(buf, MFT_HDR_BYTES_ALLOCATED)?,
            base_mft_record: MftRef::from_raw(read_u64(buf, MFT_HDR_BASE_MFT_RECORD)?),
            next_attr_instance: read_u16(buf, MFT_HDR_NEXT_ATTR_INSTANCE)?,
        };

        if hdr.bytes_allocated as usize != buf.len() {
            return Err(corrupt("MFT record allocated size does not match record size"));
        }
        if hdr.bytes_in_use > hdr.bytes_allocated || hdr.bytes_in_use & 7 != 0 {
            return Err(corrupt("MFT record bytes in use is invalid"));
        }
        let attrs_offset = hdr.attrs_offset as usize;
        if attrs_offset < MFT_RECORD_HEADER_SIZE
            || attrs_offset != align8(attrs_offset)
            || attrs_offset + 4 > hdr.bytes_in_use as usize
        {
            return Err(corrupt("MFT record attribute offset is invalid"));
        }
        Ok(hdr)
    }

    /// 记录是否在用
    pub fn is_in_use(&self) -> bool {
        self.flags.contains(MftRecordFlags::IN_USE)
    }

    /// 记录是否为目录
    pub fn is_directory(&self) -> bool {
        self.flags.contains(MftRecordFlags::IS_DIRECTORY)
    }

    /// 记录是否为扩展记录
    pub fn is_extent(&self) -> bool {
        !self.base_mft_record.is_null()
    }

    /// 写回已使用字节数
    pub(crate) fn store_bytes_in_use(buf: &mut [u8], value: u32) {
        LittleEndian::write_u32(&mut buf[MFT_HDR_BYTES_IN_USE..MFT_HDR_BYTES_IN_USE + 4], value);
    }

    /// 写回下一个属性实例号
    pub(crate) fn store_next_attr_instance(buf: &mut [u8], value: u16) {
        LittleEndian::write_u16(
            &mut buf[MFT_HDR_NEXT_ATTR_INSTANCE..MFT_HDR_NEXT_ATTR_INSTANCE + 2],
            value,
        );
    }
}
