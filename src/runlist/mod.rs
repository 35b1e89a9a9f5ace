//! 运行列表
//!
//! 非常驻属性的数据以映射对 (mapping pairs) 形式压缩存放在属性记录中。
//! 本模块提供：
//! - 映射对解压缩为 [`Runlist`]（带损坏检查）
//! - VCN → LCN 转换（稀疏空洞返回 [`LCN_HOLE`]）
//! - 通过运行列表读取属性值，超出已初始化大小的部分填零

use crate::device::{NtfsDevice, RecordDev};
use crate::error::{Error, ErrorKind, Result};
use crate::record::{corrupt, AttrRecord};
use alloc::vec::Vec;

/// 稀疏空洞
pub const LCN_HOLE: i64 = -1;
/// 该区间的映射不在本运行列表中（位于其他扩展）
pub const LCN_RL_NOT_MAPPED: i64 = -2;
/// 超出属性末尾
pub const LCN_ENOENT: i64 = -3;

/// 运行列表元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunlistElement {
    /// 起始虚拟簇号
    pub vcn: i64,
    /// 起始逻辑簇号，或 `LCN_*` 特殊值
    pub lcn: i64,
    /// 簇数
    pub length: i64,
}

/// 解压后的运行列表，以 `LCN_ENOENT` 元素结尾
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Runlist {
    elements: Vec<RunlistElement>,
}

/// 读取 `n` 字节的小端有符号整数
fn read_signed(bytes: &[u8]) -> i64 {
    let mut v: i64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        v |= (b as i64) << (i * 8);
    }
    let bits = bytes.len() * 8;
    if bits < 64 && bytes.last().map_or(false, |&b| b & 0x80 != 0) {
        v |= -1i64 << bits;
    }
    v
}

impl Runlist {
    /// 元素
    pub fn elements(&self) -> &[RunlistElement] {
        &self.elements
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// 解压一个非常驻属性记录的映射对
    ///
    /// # 参数
    ///
    /// * `attr` - 非常驻属性记录
    /// * `cluster_size` - 簇大小，用于计算第一个扩展的总簇数
    pub fn decompress(attr: &AttrRecord<'_>, cluster_size: u32) -> Result<Self> {
        if !attr.is_non_resident() {
            return Err(Error::new(ErrorKind::InvalidInput, "Attribute is resident"));
        }
        let lowest_vcn = attr.lowest_vcn()?;
        let highest_vcn = attr.highest_vcn()?;
        if lowest_vcn < 0 {
            return Err(corrupt("Negative lowest VCN"));
        }
        let mp = attr.mapping_pairs()?;

        let mut elements = Vec::new();
        if lowest_vcn != 0 {
            elements.try_reserve(1)?;
            elements.push(RunlistElement { vcn: 0, lcn: LCN_RL_NOT_MAPPED, length: lowest_vcn });
        }

        let mut vcn = lowest_vcn;
        let mut lcn: i64 = 0;
        let mut pos = 0usize;
        loop {
            let header = *mp
                .get(pos)
                .ok_or_else(|| corrupt("Mapping pairs are not terminated"))?;
            if header == 0 {
                break;
            }
            let len_bytes = (header & 0x0F) as usize;
            let lcn_bytes = (header >> 4) as usize;
            if len_bytes == 0 || len_bytes > 8 || lcn_bytes > 8 {
                return Err(corrupt("Invalid mapping pairs header"));
            }
            let body = mp
                .get(pos + 1..pos + 1 + len_bytes + lcn_bytes)
                .ok_or_else(|| corrupt("Mapping pair lies outside of the attribute record"))?;
            let length = read_signed(&body[..len_bytes]);
            if length <= 0 {
                return Err(corrupt("Invalid run length in mapping pairs"));
            }
            let run_lcn = if lcn_bytes == 0 {
                LCN_HOLE
            } else {
                lcn = lcn
                    .checked_add(read_signed(&body[len_bytes..]))
                    .ok_or_else(|| corrupt("Mapping pairs LCN overflow"))?;
                if lcn < 0 {
                    return Err(corrupt("Negative LCN in mapping pairs"));
                }
                lcn
            };
            elements.try_reserve(1)?;
            elements.push(RunlistElement { vcn, lcn: run_lcn, length });
            vcn = vcn
                .checked_add(length)
                .ok_or_else(|| corrupt("Mapping pairs VCN overflow"))?;
            pos += 1 + len_bytes + lcn_bytes;
        }

        if vcn - 1 != highest_vcn {
            log::error!(
                "[RUNLIST] Mapping pairs end at vcn {} but highest vcn is {}",
                vcn - 1,
                highest_vcn
            );
            return Err(corrupt("Mapping pairs do not match the highest VCN"));
        }

        // 第一个扩展：剩余部分映射在其他扩展中
        if lowest_vcn == 0 {
            let cluster_size = cluster_size as i64;
            let total = attr
                .allocated_size()?
                .checked_add(cluster_size - 1)
                .ok_or_else(|| corrupt("Allocated size overflow"))?
                / cluster_size;
            if total > vcn {
                elements.try_reserve(1)?;
                elements.push(RunlistElement { vcn, lcn: LCN_RL_NOT_MAPPED, length: total - vcn });
                vcn = total;
            }
        }
        elements.try_reserve(1)?;
        elements.push(RunlistElement { vcn, lcn: LCN_ENOENT, length: 0 });

        log::trace!("[RUNLIST] Decompressed {} runs", elements.len());
        Ok(Self { elements })
    }

    /// 合并另一个扩展的运行列表
    ///
    /// `other` 覆盖本列表中标记为未映射的区间，重叠的已映射区间视为损坏。
    pub fn merge(&mut self, other: &Runlist) -> Result<()> {
        let mut mapped: Vec<RunlistElement> = Vec::new();
        mapped.try_reserve(self.elements.len() + other.elements.len())?;
        let mut end = 0;
        for el in self.elements.iter().chain(other.elements.iter()) {
            end = end.max(el.vcn + el.length);
            if el.lcn >= LCN_HOLE {
                mapped.push(*el);
            }
        }
        mapped.sort_by_key(|el| el.vcn);

        let mut merged = Vec::new();
        merged.try_reserve(mapped.len() * 2 + 1)?;
        let mut vcn = 0;
        for el in mapped {
            if el.vcn < vcn {
                return Err(corrupt("Overlapping runlist fragments"));
            }
            if el.vcn > vcn {
                merged.push(RunlistElement { vcn, lcn: LCN_RL_NOT_MAPPED, length: el.vcn - vcn });
            }
            merged.push(el);
            vcn = el.vcn + el.length;
        }
        if end > vcn {
            merged.push(RunlistElement { vcn, lcn: LCN_RL_NOT_MAPPED, length: end - vcn });
            vcn = end;
        }
        merged.push(RunlistElement { vcn, lcn: LCN_ENOENT, length: 0 });
        self.elements = merged;
        Ok(())
    }

    /// VCN → LCN
    ///
    /// 返回物理簇号，或 `LCN_HOLE` / `LCN_RL_NOT_MAPPED` / `LCN_ENOENT`。
    pub fn vcn_to_lcn(&self, vcn: i64) -> i64 {
        if vcn < 0 {
            return LCN_ENOENT;
        }
        for el in &self.elements {
            if el.lcn == LCN_ENOENT {
                break;
            }
            if vcn >= el.vcn && vcn < el.vcn + el.length {
                return if el.lcn >= 0 { el.lcn + (vcn - el.vcn) } else { el.lcn };
            }
        }
        match self.elements.first() {
            Some(first) if vcn < first.vcn => LCN_RL_NOT_MAPPED,
            _ => LCN_ENOENT,
        }
    }
}

/// 通过运行列表读取属性值
///
/// 读取 `buf.len()` 字节；空洞和 `initialized_size` 之后的部分填零。
/// 遇到未映射区间返回损坏。
pub fn read_via_runlist<D: NtfsDevice>(
    dev: &RecordDev<D>,
    rl: &Runlist,
    initialized_size: i64,
    buf: &mut [u8],
) -> Result<()> {
    let cluster_size = dev.cluster_size() as usize;
    let mut cluster = Vec::new();
    cluster.try_reserve_exact(cluster_size)?;
    cluster.resize(cluster_size, 0);

    let init = initialized_size.max(0) as usize;
    buf.fill(0);
    let readable = init.min(buf.len());
    let mut pos = 0usize;
    while pos < readable {
        let vcn = (pos / cluster_size) as i64;
        let in_cluster = pos % cluster_size;
        let take = (cluster_size - in_cluster).min(readable - pos);
        match rl.vcn_to_lcn(vcn) {
            LCN_HOLE => {}
            lcn if lcn >= 0 => {
                dev.read_clusters(lcn as u64, 1, &mut cluster)?;
                buf[pos..pos + take].copy_from_slice(&cluster[in_cluster..in_cluster + take]);
            }
            _ => {
                log::error!("[RUNLIST] VCN {} is not mapped", vcn);
                return Err(corrupt("Attribute data lies outside of its runlist"));
            }
        }
        pos += take;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::AT_DATA;
    use crate::test_utils::{non_resident_attr, MemDevice, NonResident};
    use alloc::vec;

    fn decompress(nr: &NonResident) -> Result<Runlist> {
        let bytes = non_resident_attr(AT_DATA, &[], nr);
        Runlist::decompress(&AttrRecord::parse(&bytes).unwrap(), 4096)
    }

    #[test]
    fn test_decompress_with_hole() {
        // 2 簇 @ LCN 0x20，3 簇空洞，1 簇 @ LCN 0x20 - 0x10
        let rl = decompress(&NonResident {
            allocated_size: 6 * 4096,
            data_size: 6 * 4096,
            initialized_size: 6 * 4096,
            highest_vcn: 5,
            mapping_pairs: vec![0x11, 0x02, 0x20, 0x01, 0x03, 0x11, 0x01, 0xF0, 0x00],
            ..NonResident::default()
        })
        .unwrap();
        assert_eq!(rl.vcn_to_lcn(0), 0x20);
        assert_eq!(rl.vcn_to_lcn(1), 0x21);
        assert_eq!(rl.vcn_to_lcn(3), LCN_HOLE);
        assert_eq!(rl.vcn_to_lcn(5), 0x10);
        assert_eq!(rl.vcn_to_lcn(6), LCN_ENOENT);
    }

    #[test]
    fn test_highest_vcn_mismatch_is_corrupt() {
        let err = decompress(&NonResident {
            allocated_size: 4096,
            data_size: 4096,
            initialized_size: 4096,
            highest_vcn: 3,
            mapping_pairs: vec![0x11, 0x01, 0x20, 0x00],
            ..NonResident::default()
        })
        .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_unterminated_mapping_pairs() {
        let err = decompress(&NonResident {
            allocated_size: 4096,
            data_size: 4096,
            initialized_size: 4096,
            highest_vcn: 0,
            mapping_pairs: vec![0x11, 0x01],
            ..NonResident::default()
        })
        .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_first_extent_marks_remainder_unmapped() {
        let mut rl = decompress(&NonResident {
            allocated_size: 4 * 4096,
            data_size: 4 * 4096,
            initialized_size: 4 * 4096,
            highest_vcn: 1,
            mapping_pairs: vec![0x11, 0x02, 0x20, 0x00],
            ..NonResident::default()
        })
        .unwrap();
        assert_eq!(rl.vcn_to_lcn(2), LCN_RL_NOT_MAPPED);

        let second = decompress(&NonResident {
            lowest_vcn: 2,
            highest_vcn: 3,
            mapping_pairs: vec![0x11, 0x02, 0x40, 0x00],
            ..NonResident::default()
        })
        .unwrap();
        rl.merge(&second).unwrap();
        assert_eq!(rl.vcn_to_lcn(1), 0x21);
        assert_eq!(rl.vcn_to_lcn(3), 0x41);
        assert_eq!(rl.vcn_to_lcn(4), LCN_ENOENT);
    }

    #[test]
    fn test_read_via_runlist_zero_fills() {
        let mut dev = MemDevice::new();
        dev.put_cluster(0x20, &[0xAA; 4096]);
        dev.put_cluster(0x21, &[0xBB; 4096]);
        let rd = RecordDev::new(dev).unwrap();
        let rl = decompress(&NonResident {
            allocated_size: 3 * 4096,
            data_size: 3 * 4096,
            initialized_size: 4096 + 100,
            highest_vcn: 2,
            mapping_pairs: vec![0x11, 0x02, 0x20, 0x01, 0x01, 0x00],
            ..NonResident::default()
        })
        .unwrap();

        let mut buf = vec![0xFFu8; 3 * 4096];
        read_via_runlist(&rd, &rl, 4096 + 100, &mut buf).unwrap();
        assert!(buf[..4096].iter().all(|&b| b == 0xAA));
        assert!(buf[4096..4196].iter().all(|&b| b == 0xBB));
        assert!(buf[4196..].iter().all(|&b| b == 0));
    }
}
