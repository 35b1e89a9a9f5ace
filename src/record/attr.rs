//! 属性记录视图
//!
//! [`AttrRecord`] 借用一个已经确认长度合法的属性记录切片，
//! 所有访问器都再次做边界检查，损坏的记录只会得到 `Corrupted`。

use super::{corrupt, read_i64, read_u16, read_u32, read_u8};
use crate::consts::*;
use crate::error::Result;
use crate::name::name_from_le_bytes;
use crate::types::AttrFlags;
use alloc::vec::Vec;

/// 属性记录（借用）
#[derive(Debug, Clone, Copy)]
pub struct AttrRecord<'a> {
    data: &'a [u8],
}

impl<'a> AttrRecord<'a> {
    /// 从属性记录字节构造，`data` 的长度应当等于属性的 length 字段
    ///
    /// 校验头部大小、名称位置以及名称必须位于值/映射对之前。
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < ATTR_RESIDENT_HEADER_SIZE {
            return Err(corrupt("Attribute record is too small"));
        }
        let rec = Self { data };
        let header_size = if rec.is_non_resident() {
            ATTR_NON_RESIDENT_HEADER_SIZE
        } else {
            ATTR_RESIDENT_HEADER_SIZE
        };
        if data.len() < header_size {
            return Err(corrupt("Attribute record is smaller than its header"));
        }

        let name_len = rec.name_length() as usize;
        if name_len != 0 {
            let name_ofs = rec.name_offset()? as usize;
            if name_ofs < ATTR_RESIDENT_HEADER_SIZE || name_ofs + name_len * 2 > data.len() {
                return Err(corrupt("Attribute name lies outside of the attribute record"));
            }
            // 名称必须位于值（常驻）或映射对（非常驻）之前
            let payload_ofs = if rec.is_non_resident() {
                rec.mapping_pairs_offset()? as usize
            } else {
                rec.value_offset()? as usize
            };
            if name_ofs + name_len * 2 > payload_ofs {
                return Err(corrupt("Attribute name is placed after the attribute value"));
            }
        }
        Ok(rec)
    }

    /// 原始字节
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// 属性类型
    pub fn ty(&self) -> u32 {
        // parse 已确认长度足够
        read_u32(self.data, ATTR_TYPE).unwrap_or(AT_END)
    }

    /// 记录长度
    pub fn length(&self) -> usize {
        self.data.len()
    }

    /// 是否非常驻
    pub fn is_non_resident(&self) -> bool {
        self.data[ATTR_NON_RESIDENT] != 0
    }

    /// 名称长度（UTF-16 单元数）
    pub fn name_length(&self) -> u8 {
        self.data[ATTR_NAME_LENGTH]
    }

    /// 名称偏移
    pub fn name_offset(&self) -> Result<u16> {
        read_u16(self.data, ATTR_NAME_OFFSET)
    }

    /// 名称的原始 UTF-16 字节
    pub fn name_bytes(&self) -> Result<&'a [u8]> {
        let len = self.name_length() as usize * 2;
        if len == 0 {
            return Ok(&[]);
        }
        let ofs = self.name_offset()? as usize;
        self.data
            .get(ofs..ofs + len)
            .ok_or_else(|| corrupt("Attribute name lies outside of the attribute record"))
    }

    /// 名称
    pub fn name(&self) -> Result<Vec<u16>> {
        Ok(name_from_le_bytes(self.name_bytes()?))
    }

    /// 名称是否与给定 UTF-16 序列逐单元相等（调用者自行处理大小写）
    pub fn name_units(&self) -> Result<impl Iterator<Item = u16> + 'a> {
        Ok(self
            .name_bytes()?
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]])))
    }

    /// 属性标志
    pub fn flags(&self) -> AttrFlags {
        AttrFlags::from_bits_retain(read_u16(self.data, ATTR_FLAGS).unwrap_or(0))
    }

    /// 实例号
    pub fn instance(&self) -> u16 {
        read_u16(self.data, ATTR_INSTANCE).unwrap_or(0)
    }

    //-------------------------------------------------------------------------
    // 常驻属性
    //-------------------------------------------------------------------------

    /// 值长度
    pub fn value_length(&self) -> Result<u32> {
        read_u32(self.data, ATTR_VALUE_LENGTH)
    }

    /// 值偏移
    pub fn value_offset(&self) -> Result<u16> {
        read_u16(self.data, ATTR_VALUE_OFFSET)
    }

    /// 常驻值（值必须完整落在属性记录内）
    pub fn value(&self) -> Result<&'a [u8]> {
        if self.is_non_resident() {
            return Err(corrupt("Attribute is not resident"));
        }
        let ofs = self.value_offset()? as usize;
        let len = self.value_length()? as usize;
        ofs.checked_add(len)
            .filter(|&end| ofs >= ATTR_RESIDENT_HEADER_SIZE && end <= self.data.len())
            .map(|end| &self.data[ofs..end])
            .ok_or_else(|| corrupt("Attribute value lies outside of the attribute record"))
    }

    //-------------------------------------------------------------------------
    // 非常驻属性
    //-------------------------------------------------------------------------

    /// 最低 VCN
    pub fn lowest_vcn(&self) -> Result<i64> {
        if !self.is_non_resident() {
            return Ok(0);
        }
        read_i64(self.data, ATTR_LOWEST_VCN)
    }

    /// 最高 VCN
    pub fn highest_vcn(&self) -> Result<i64> {
        read_i64(self.data, ATTR_HIGHEST_VCN)
    }

    /// 映射对偏移
    pub fn mapping_pairs_offset(&self) -> Result<u16> {
        read_u16(self.data, ATTR_MAPPING_PAIRS_OFFSET)
    }

    /// 压缩单元（簇数的 log2）
    pub fn compression_unit(&self) -> Result<u8> {
        read_u8(self.data, ATTR_COMPRESSION_UNIT)
    }

    /// 分配大小
    pub fn allocated_size(&self) -> Result<i64> {
        read_i64(self.data, ATTR_ALLOCATED_SIZE)
    }

    /// 数据大小
    pub fn data_size(&self) -> Result<i64> {
        read_i64(self.data, ATTR_DATA_SIZE)
    }

    /// 已初始化大小
    pub fn initialized_size(&self) -> Result<i64> {
        read_i64(self.data, ATTR_INITIALIZED_SIZE)
    }

    /// 压缩后大小（仅压缩或稀疏属性的第一个扩展有此字段）
    pub fn compressed_size(&self) -> Result<Option<i64>> {
        let flags = self.flags();
        if !flags.is_compressed() && !flags.contains(AttrFlags::IS_SPARSE) {
            return Ok(None);
        }
        if self.data.len() < ATTR_NON_RESIDENT_COMPRESSED_HEADER_SIZE {
            return Err(corrupt("Compressed attribute record is too small"));
        }
        read_i64(self.data, ATTR_COMPRESSED_SIZE).map(Some)
    }

    /// 映射对字节
    pub fn mapping_pairs(&self) -> Result<&'a [u8]> {
        let ofs = self.mapping_pairs_offset()? as usize;
        if ofs < ATTR_NON_RESIDENT_HEADER_SIZE || ofs > self.data.len() {
            return Err(corrupt("Mapping pairs offset lies outside of the attribute record"));
        }
        Ok(&self.data[ofs..])
    }

    /// 属性值的逻辑长度（常驻取值长度，非常驻取数据大小）
    pub fn logical_size(&self) -> Result<i64> {
        if self.is_non_resident() {
            self.data_size()
        } else {
            Ok(self.value()?.len() as i64)
        }
    }

    /// 复制为独立的缓冲区
    pub fn to_owned_record(&self) -> Result<AttrRecordBuf> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(self.data.len())?;
        bytes.extend_from_slice(self.data);
        Ok(AttrRecordBuf { bytes })
    }
}

/// 属性记录快照
///
/// 查找跨记录属性时先把记录复制出来，再释放记录映射，之后只操作快照。
#[derive(Debug, Clone)]
pub struct AttrRecordBuf {
    bytes: Vec<u8>,
}

impl AttrRecordBuf {
    /// 视图
    pub fn view(&self) -> AttrRecord<'_> {
        // 快照来自已通过 parse 的记录
        AttrRecord { data: &self.bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{non_resident_attr, resident_attr, NonResident};

    fn u(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_resident_value_and_name() {
        let bytes = resident_attr(AT_DATA, &u("Resource"), b"hello", AttrFlags::empty(), 0);
        let a = AttrRecord::parse(&bytes).unwrap();
        assert_eq!(a.ty(), AT_DATA);
        assert!(!a.is_non_resident());
        assert_eq!(a.name().unwrap(), u("Resource"));
        assert_eq!(a.value().unwrap(), b"hello");
        assert_eq!(a.logical_size().unwrap(), 5);
    }

    #[test]
    fn test_value_past_record_is_corrupt() {
        let mut bytes = resident_attr(AT_DATA, &[], b"hello", AttrFlags::empty(), 0);
        bytes[ATTR_VALUE_LENGTH] = 0xFF;
        let a = AttrRecord::parse(&bytes).unwrap();
        assert!(a.value().unwrap_err().is_corruption());
    }

    #[test]
    fn test_non_resident_sizes() {
        let nr = NonResident {
            allocated_size: 8192,
            data_size: 5000,
            initialized_size: 4096,
            highest_vcn: 1,
            mapping_pairs: alloc::vec![0x11, 0x02, 0x20, 0x00],
            ..NonResident::default()
        };
        let bytes = non_resident_attr(AT_DATA, &[], &nr);
        let a = AttrRecord::parse(&bytes).unwrap();
        assert!(a.is_non_resident());
        assert_eq!(a.allocated_size().unwrap(), 8192);
        assert_eq!(a.data_size().unwrap(), 5000);
        assert_eq!(a.initialized_size().unwrap(), 4096);
        assert_eq!(a.compressed_size().unwrap(), None);
        assert_eq!(a.mapping_pairs().unwrap()[0], 0x11);
    }

    #[test]
    fn test_name_after_value_is_corrupt() {
        let mut bytes = resident_attr(AT_DATA, &u("ab"), b"xy", AttrFlags::empty(), 0);
        // 把名称偏移挪到值之后
        let value_ofs = u16::from_le_bytes([bytes[ATTR_VALUE_OFFSET], bytes[ATTR_VALUE_OFFSET + 1]]);
        bytes[ATTR_NAME_OFFSET..ATTR_NAME_OFFSET + 2].copy_from_slice(&value_ofs.to_le_bytes());
        assert!(AttrRecord::parse(&bytes).is_err());
    }
}
