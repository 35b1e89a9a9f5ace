//! 单个 MFT 记录内的属性查找

use super::{corrupt, read_u32, AttrRecord, MftRecordHeader};
use crate::consts::*;
use crate::error::Result;
use crate::name::NameCollation;

/// 记录内属性遍历器
///
/// 从 `attrs_offset` 开始逐个读取属性记录，直到 `AT_END`。
/// 每条记录的长度必须非零、8 字节对齐且不超过 `bytes_in_use`。
pub struct AttrSearch<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
    done: bool,
}

impl<'a> AttrSearch<'a> {
    /// 在已通过 [`MftRecordHeader::parse`] 校验的记录上开始遍历
    pub fn new(buf: &'a [u8], hdr: &MftRecordHeader) -> Self {
        Self {
            buf,
            pos: hdr.attrs_offset as usize,
            end: (hdr.bytes_in_use as usize).min(buf.len()),
            done: false,
        }
    }

    /// 读取下一个属性，返回 (记录内偏移, 属性)
    pub fn next_attr(&mut self) -> Result<Option<(usize, AttrRecord<'a>)>> {
        if self.done {
            return Ok(None);
        }
        let ty = read_u32(self.buf, self.pos)?;
        if ty == AT_END {
            self.done = true;
            return Ok(None);
        }
        let len = read_u32(self.buf, self.pos + ATTR_LENGTH)? as usize;
        if len == 0 || len & 7 != 0 || self.pos + len > self.end {
            self.done = true;
            log::error!(
                "[RECORD] Bad attribute record at offset {:#x} (type {:#x}, length {})",
                self.pos,
                ty,
                len
            );
            return Err(corrupt("Attribute record lies outside of the MFT record"));
        }
        let ofs = self.pos;
        let attr = AttrRecord::parse(&self.buf[ofs..ofs + len])?;
        self.pos += len;
        Ok(Some((ofs, attr)))
    }

    /// 查找第一个匹配 (类型, 名称) 的属性
    ///
    /// 名称按卷的排序规则比较；空名称只匹配未命名属性。
    pub fn find(
        mut self,
        ty: u32,
        name: &[u16],
        collation: &NameCollation,
    ) -> Result<Option<(usize, AttrRecord<'a>)>> {
        while let Some((ofs, attr)) = self.next_attr()? {
            if attr.ty() != ty {
                continue;
            }
            if attr.name_length() as usize != name.len() {
                continue;
            }
            let attr_name = attr.name()?;
            if collation.equal(&attr_name, name) {
                return Ok(Some((ofs, attr)));
            }
        }
        Ok(None)
    }

    /// 查找第一个指定类型的属性（忽略名称）
    pub fn find_type(mut self, ty: u32) -> Result<Option<(usize, AttrRecord<'a>)>> {
        while let Some((ofs, attr)) = self.next_attr()? {
            if attr.ty() == ty {
                return Ok(Some((ofs, attr)));
            }
        }
        Ok(None)
    }

    /// 当前遍历位置（遍历结束时即 `AT_END` 标记的位置）
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordBuilder;
    use crate::name::Upcase;
    use alloc::vec::Vec;

    fn u(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_find_named_attribute() {
        let buf = RecordBuilder::new(30)
            .resident(AT_DATA, &[], b"unnamed")
            .resident(AT_DATA, &u("Stream"), b"named")
            .build();
        let hdr = MftRecordHeader::parse(&buf).unwrap();
        let ci = NameCollation::new(false, Upcase::default());

        let (_, a) = AttrSearch::new(&buf, &hdr)
            .find(AT_DATA, &u("STREAM"), &ci)
            .unwrap()
            .unwrap();
        assert_eq!(a.value().unwrap(), b"named");

        let (_, a) = AttrSearch::new(&buf, &hdr).find(AT_DATA, &[], &ci).unwrap().unwrap();
        assert_eq!(a.value().unwrap(), b"unnamed");

        let cs = NameCollation::new(true, Upcase::default());
        assert!(AttrSearch::new(&buf, &hdr)
            .find(AT_DATA, &u("STREAM"), &cs)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_attribute_past_bytes_in_use() {
        let mut buf = RecordBuilder::new(30).resident(AT_DATA, &[], b"value").build();
        let hdr = MftRecordHeader::parse(&buf).unwrap();
        let ofs = hdr.attrs_offset as usize;
        // 把属性长度改为超出 bytes_in_use
        buf[ofs + ATTR_LENGTH..ofs + ATTR_LENGTH + 4].copy_from_slice(&0x400u32.to_le_bytes());
        let err = AttrSearch::new(&buf, &hdr).find_type(AT_DATA).unwrap_err();
        assert!(err.is_corruption());
    }
}
