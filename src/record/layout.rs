//! 属性值布局
//!
//! 标准信息、文件名、属性列表项和索引根的解码。

use super::{corrupt, read_i64, read_u16, read_u32, read_u64, read_u8};
use crate::consts::*;
use crate::error::Result;
use crate::name::name_from_le_bytes;
use crate::types::{FileAttributeFlags, FileNameNamespace, MftRef, NtfsTime};
use alloc::vec::Vec;

/// $STANDARD_INFORMATION 值
#[derive(Debug, Clone, Copy)]
pub struct StandardInformation {
    /// 创建时间
    pub creation_time: NtfsTime,
    /// 数据修改时间
    pub last_data_change_time: NtfsTime,
    /// MFT 记录修改时间
    pub last_mft_change_time: NtfsTime,
    /// 访问时间
    pub last_access_time: NtfsTime,
    /// 文件属性
    pub file_attributes: FileAttributeFlags,
}

impl StandardInformation {
    /// 解析标准信息（至少 NTFS 1.2 的 48 字节）
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < STANDARD_INFORMATION_V1_SIZE {
            return Err(corrupt("Standard information attribute is too small"));
        }
        Ok(Self {
            creation_time: NtfsTime(read_i64(value, SI_CREATION_TIME)?),
            last_data_change_time: NtfsTime(read_i64(value, SI_LAST_DATA_CHANGE_TIME)?),
            last_mft_change_time: NtfsTime(read_i64(value, SI_LAST_MFT_CHANGE_TIME)?),
            last_access_time: NtfsTime(read_i64(value, SI_LAST_ACCESS_TIME)?),
            file_attributes: FileAttributeFlags::from_bits_retain(read_u32(
                value,
                SI_FILE_ATTRIBUTES,
            )?),
        })
    }
}

/// $FILE_NAME 值
#[derive(Debug, Clone)]
pub struct FileNameAttr {
    /// 父目录引用
    pub parent: MftRef,
    /// 分配大小（目录项中的副本）
    pub allocated_size: i64,
    /// 数据大小（目录项中的副本）
    pub data_size: i64,
    /// 文件属性
    pub file_attributes: FileAttributeFlags,
    /// 命名空间
    pub namespace: FileNameNamespace,
    /// 文件名
    pub name: Vec<u16>,
}

impl FileNameAttr {
    /// 解析文件名属性
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < FILE_NAME_HEADER_SIZE {
            return Err(corrupt("File name attribute is too small"));
        }
        let name_len = read_u8(value, FN_FILE_NAME_LENGTH)? as usize;
        let name_bytes = value
            .get(FILE_NAME_HEADER_SIZE..FILE_NAME_HEADER_SIZE + name_len * 2)
            .ok_or_else(|| corrupt("File name lies outside of the file name attribute"))?;
        let namespace = FileNameNamespace::from_raw(read_u8(value, FN_FILE_NAME_TYPE)?)
            .ok_or_else(|| corrupt("Unknown file name namespace"))?;
        Ok(Self {
            parent: MftRef::from_raw(read_u64(value, FN_PARENT_DIRECTORY)?),
            allocated_size: read_i64(value, FN_ALLOCATED_SIZE)?,
            data_size: read_i64(value, FN_DATA_SIZE)?,
            file_attributes: FileAttributeFlags::from_bits_retain(read_u32(
                value,
                FN_FILE_ATTRIBUTES,
            )?),
            namespace,
            name: name_from_le_bytes(name_bytes),
        })
    }
}

/// 属性列表项
#[derive(Debug, Clone, Copy)]
pub struct AttrListEntry<'a> {
    /// 属性类型
    pub ty: u32,
    /// 本项长度
    pub length: u16,
    /// 起始 VCN
    pub lowest_vcn: i64,
    /// 属性所在记录
    pub mft_reference: MftRef,
    /// 属性实例号
    pub instance: u16,
    name_bytes: &'a [u8],
}

impl<'a> AttrListEntry<'a> {
    /// 名称长度（UTF-16 单元数）
    pub fn name_length(&self) -> usize {
        self.name_bytes.len() / 2
    }

    /// 名称
    pub fn name(&self) -> Vec<u16> {
        name_from_le_bytes(self.name_bytes)
    }
}

/// 属性列表遍历器
///
/// 每一项都必须完整落在属性列表内，名称也必须落在项内。
pub struct AttrListIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AttrListIter<'a> {
    /// 在属性列表值上开始遍历
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn parse_entry(&self) -> Result<AttrListEntry<'a>> {
        let rest = &self.data[self.pos..];
        if rest.len() < ATTR_LIST_ENTRY_HEADER_SIZE {
            return Err(corrupt("Attribute list entry is truncated"));
        }
        let length = read_u16(rest, AL_LENGTH)?;
        let len = length as usize;
        if len < ATTR_LIST_ENTRY_HEADER_SIZE || len > rest.len() {
            return Err(corrupt("Attribute list entry length is invalid"));
        }
        let name_len = read_u8(rest, AL_NAME_LENGTH)? as usize * 2;
        let name_ofs = read_u8(rest, AL_NAME_OFFSET)? as usize;
        let name_bytes = if name_len == 0 {
            &rest[0..0]
        } else {
            if name_ofs < ATTR_LIST_ENTRY_HEADER_SIZE || name_ofs + name_len > len {
                return Err(corrupt("Attribute list entry name lies outside of the entry"));
            }
            &rest[name_ofs..name_ofs + name_len]
        };
        Ok(AttrListEntry {
            ty: read_u32(rest, AL_TYPE)?,
            length,
            lowest_vcn: read_i64(rest, AL_LOWEST_VCN)?,
            mft_reference: MftRef::from_raw(read_u64(rest, AL_MFT_REFERENCE)?),
            instance: read_u16(rest, AL_INSTANCE)?,
            name_bytes,
        })
    }
}

impl<'a> Iterator for AttrListIter<'a> {
    type Item = Result<AttrListEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        match self.parse_entry() {
            Ok(entry) => {
                self.pos += entry.length as usize;
                Some(Ok(entry))
            }
            Err(e) => {
                // 出错后停止遍历
                self.pos = self.data.len();
                Some(Err(e))
            }
        }
    }
}

/// $INDEX_ROOT 值头部
#[derive(Debug, Clone, Copy)]
pub struct IndexRoot {
    /// 被索引的属性类型（目录为 $FILE_NAME，视图索引为 0）
    pub indexed_type: u32,
    /// 排序规则
    pub collation_rule: u32,
    /// 索引块大小
    pub index_block_size: u32,
    /// 每个索引块的簇数
    pub clusters_per_index_block: u8,
    /// 索引头标志
    pub flags: u8,
}

impl IndexRoot {
    /// 解析索引根头部
    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < INDEX_ROOT_HEADER_SIZE {
            return Err(corrupt("Index root attribute is too small"));
        }
        Ok(Self {
            indexed_type: read_u32(value, IR_TYPE)?,
            collation_rule: read_u32(value, IR_COLLATION_RULE)?,
            index_block_size: read_u32(value, IR_INDEX_BLOCK_SIZE)?,
            clusters_per_index_block: read_u8(value, IR_CLUSTERS_PER_INDEX_BLOCK)?,
            flags: read_u8(value, IR_INDEX_HEADER + IH_FLAGS)?,
        })
    }

    /// 是否存在 $INDEX_ALLOCATION
    pub fn is_large(&self) -> bool {
        self.flags & LARGE_INDEX != 0
    }
}
