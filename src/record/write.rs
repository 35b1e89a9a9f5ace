//! 向 MFT 记录插入常驻属性

use super::{align8, AttrSearch, MftRecordHeader};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::name::NameCollation;
use byteorder::{ByteOrder, LittleEndian};
use core::cmp::Ordering;

/// 常驻属性记录的总长度（名称与值各自 8 字节对齐）
pub fn resident_attr_len(name_len: usize, value_len: usize) -> usize {
    align8(ATTR_RESIDENT_HEADER_SIZE + name_len * 2) + align8(value_len)
}

/// 在记录中插入一个常驻属性
///
/// 插入位置按 (类型, 名称排序) 确定，属性实例号取自记录头并递增。
/// 记录剩余空间不足时返回 `NoSpace`。返回新属性在记录内的偏移。
pub fn insert_resident_attr(
    buf: &mut [u8],
    ty: u32,
    name: &[u16],
    value: &[u8],
    collation: &NameCollation,
) -> Result<usize> {
    let hdr = MftRecordHeader::parse(buf)?;
    let len = resident_attr_len(name.len(), value.len());
    let in_use = hdr.bytes_in_use as usize;
    if in_use + len > hdr.bytes_allocated as usize {
        return Err(Error::new(ErrorKind::NoSpace, "No space left in MFT record"));
    }

    // 找到第一个排在新属性之后的位置
    let mut search = AttrSearch::new(buf, &hdr);
    let mut insert_at = None;
    while let Some((ofs, attr)) = search.next_attr()? {
        let order = attr.ty().cmp(&ty).then_with(|| {
            attr.name()
                .map(|n| collation.collate(&n, name))
                .unwrap_or(Ordering::Less)
        });
        if order == Ordering::Greater {
            insert_at = Some(ofs);
            break;
        }
    }
    let insert_at = match insert_at {
        Some(ofs) => ofs,
        None => search.position(),
    };

    buf.copy_within(insert_at..in_use, insert_at + len);

    let instance = hdr.next_attr_instance;
    let rec = &mut buf[insert_at..insert_at + len];
    rec.fill(0);
    let name_ofs = ATTR_RESIDENT_HEADER_SIZE;
    let value_ofs = align8(name_ofs + name.len() * 2);
    LittleEndian::write_u32(&mut rec[ATTR_TYPE..], ty);
    LittleEndian::write_u32(&mut rec[ATTR_LENGTH..], len as u32);
    rec[ATTR_NON_RESIDENT] = 0;
    rec[ATTR_NAME_LENGTH] = name.len() as u8;
    LittleEndian::write_u16(&mut rec[ATTR_NAME_OFFSET..], name_ofs as u16);
    LittleEndian::write_u16(&mut rec[ATTR_INSTANCE..], instance);
    LittleEndian::write_u32(&mut rec[ATTR_VALUE_LENGTH..], value.len() as u32);
    LittleEndian::write_u16(&mut rec[ATTR_VALUE_OFFSET..], value_ofs as u16);
    for (i, &c) in name.iter().enumerate() {
        LittleEndian::write_u16(&mut rec[name_ofs + i * 2..], c);
    }
    rec[value_ofs..value_ofs + value.len()].copy_from_slice(value);

    MftRecordHeader::store_bytes_in_use(buf, (in_use + len) as u32);
    MftRecordHeader::store_next_attr_instance(buf, instance.wrapping_add(1));

    log::debug!(
        "[RECORD] Inserted resident attribute {:#x} ({} bytes) at offset {:#x}",
        ty,
        len,
        insert_at
    );
    Ok(insert_at)
}
