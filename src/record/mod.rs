//! MFT 记录读取器
//!
//! 将原始 MFT 记录缓冲区解码为带类型的属性记录，所有字段读取都经过边界检查。
//!
//! - record/mst.rs 多扇区传输保护（更新序列数组）的读后修复与写前准备
//! - record/header.rs 记录头解析与一致性校验
//! - record/attr.rs 属性记录视图（常驻/非常驻）
//! - record/search.rs 在单个记录内按 (类型, 名称) 查找属性
//! - record/layout.rs 标准信息、文件名、属性列表项、索引根的值布局
//! - record/write.rs 向记录插入常驻属性

mod attr;
mod header;
mod layout;
mod mst;
mod search;
mod write;

pub use attr::{AttrRecord, AttrRecordBuf};
pub use header::MftRecordHeader;
pub use layout::{AttrListEntry, AttrListIter, FileNameAttr, IndexRoot, StandardInformation};
pub use mst::{post_read_mst_fixup, pre_write_mst_fixup};
pub use search::AttrSearch;
pub use write::{insert_resident_attr, resident_attr_len};

use crate::error::{Error, ErrorKind, Result};
use byteorder::{ByteOrder, LittleEndian};

#[inline]
pub(crate) fn corrupt(message: &'static str) -> Error {
    Error::new(ErrorKind::Corrupted, message)
}

#[inline]
fn field<'a>(buf: &'a [u8], off: usize, len: usize) -> Result<&'a [u8]> {
    off.checked_add(len)
        .and_then(|end| buf.get(off..end))
        .ok_or_else(|| corrupt("Field lies outside of its structure"))
}

#[inline]
pub(crate) fn read_u8(buf: &[u8], off: usize) -> Result<u8> {
    Ok(field(buf, off, 1)?[0])
}

#[inline]
pub(crate) fn read_u16(buf: &[u8], off: usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(field(buf, off, 2)?))
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], off: usize) -> Result<u32> {
    Ok(LittleEndian::read_u32(field(buf, off, 4)?))
}

#[inline]
pub(crate) fn read_u64(buf: &[u8], off: usize) -> Result<u64> {
    Ok(LittleEndian::read_u64(field(buf, off, 8)?))
}

#[inline]
pub(crate) fn read_i64(buf: &[u8], off: usize) -> Result<i64> {
    Ok(LittleEndian::read_i64(field(buf, off, 8)?))
}

/// 8 字节对齐
#[inline]
pub(crate) const fn align8(n: usize) -> usize {
    (n + 7) & !7
}
