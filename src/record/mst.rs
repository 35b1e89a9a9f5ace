//! 多扇区传输保护
//!
//! 每个 512 字节扇区的最后两个字节在磁盘上被替换为更新序列号 (USN)，
//! 原值保存在记录头之后的更新序列数组 (USA) 中。读入后必须还原，
//! 写出前必须重新放置。任何一个扇区尾部与 USN 不符都说明记录写入不完整。

use super::{corrupt, read_u16};
use crate::consts::*;
use crate::error::Result;
use byteorder::{ByteOrder, LittleEndian};

fn usa_bounds(buf: &[u8]) -> Result<(usize, usize)> {
    let usa_ofs = read_u16(buf, MFT_HDR_USA_OFS)? as usize;
    let usa_count = read_u16(buf, MFT_HDR_USA_COUNT)? as usize;

    if buf.len() % NTFS_BLOCK_SIZE != 0 || buf.is_empty() {
        return Err(corrupt("Record size is not a multiple of the sector size"));
    }
    if usa_ofs & 1 != 0 || usa_count == 0 {
        return Err(corrupt("Invalid update sequence array"));
    }
    if usa_count - 1 != buf.len() / NTFS_BLOCK_SIZE {
        return Err(corrupt("Update sequence array size does not match record size"));
    }
    // USA 必须完整落在第一个扇区内（扇区尾部的两个字节除外）
    if usa_ofs + usa_count * 2 > NTFS_BLOCK_SIZE - 2 {
        return Err(corrupt("Update sequence array extends past the first sector"));
    }
    Ok((usa_ofs, usa_count))
}

/// 读入后的修复：将扇区尾部还原为 USA 中保存的原值
pub fn post_read_mst_fixup(buf: &mut [u8]) -> Result<()> {
    let (usa_ofs, usa_count) = usa_bounds(buf)?;
    let usn = LittleEndian::read_u16(&buf[usa_ofs..usa_ofs + 2]);

    // 先全部校验，避免修复到一半才发现不一致
    for i in 1..usa_count {
        let tail = i * NTFS_BLOCK_SIZE - 2;
        if LittleEndian::read_u16(&buf[tail..tail + 2]) != usn {
            log::error!("[RECORD] Multi sector transfer error in sector {} (usn {:#x})", i - 1, usn);
            return Err(corrupt("Multi sector transfer error detected"));
        }
    }
    for i in 1..usa_count {
        let tail = i * NTFS_BLOCK_SIZE - 2;
        let saved = usa_ofs + i * 2;
        buf.copy_within(saved..saved + 2, tail);
    }
    Ok(())
}

/// 写出前的准备：递增 USN，保存扇区尾部并写入 USN
pub fn pre_write_mst_fixup(buf: &mut [u8]) -> Result<()> {
    let (usa_ofs, usa_count) = usa_bounds(buf)?;

    let mut usn = LittleEndian::read_u16(&buf[usa_ofs..usa_ofs + 2]).wrapping_add(1);
    if usn == 0 || usn == 0xFFFF {
        usn = 1;
    }
    LittleEndian::write_u16(&mut buf[usa_ofs..usa_ofs + 2], usn);

    for i in 1..usa_count {
        let tail = i * NTFS_BLOCK_SIZE - 2;
        let saved = usa_ofs + i * 2;
        buf.copy_within(tail..tail + 2, saved);
        LittleEndian::write_u16(&mut buf[tail..tail + 2], usn);
    }
    Ok(())
}
