//! 属性记录到 inode 字段
//!
//! 标志位、大小三元组、压缩参数和运行列表都在这里校验后写入 inode。
//! 磁盘上违反不变量的组合一律返回 `Corrupted`，已识别但未实现的特性返回 `Unsupported`。

use crate::consts::*;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{CompressionInfo, IndexInfo, InodeFlags, NtfsInode, SizeTriple};
use crate::record::{corrupt, AttrRecord, AttrRecordBuf, IndexRoot};
use crate::runlist::Runlist;
use crate::types::AttrFlags;
use crate::volume::NtfsVolume;

fn unsupported(message: &'static str) -> Error {
    Error::new(ErrorKind::Unsupported, message)
}

impl<D: NtfsDevice> NtfsVolume<D> {
    /// 由属性记录（可能跨多个扩展）填写 inode 的标志、大小和运行列表
    ///
    /// # 参数
    ///
    /// * `ino` - 正在构造的 inode
    /// * `ty` - 属性类型
    /// * `extents` - 按 lowest_vcn 排列的属性记录，第一个必须从 VCN 0 开始
    pub(crate) fn apply_attr_fields(&self, ino: &NtfsInode, ty: u32, extents: &[AttrRecordBuf]) -> Result<()> {
        let Some(first) = extents.first() else {
            return Err(corrupt("Attribute has no records"));
        };
        let attr = first.view();
        let flags = attr.flags();
        let mst = ty == AT_INDEX_ALLOCATION;
        let compressed = flags.is_compressed();
        let sparse = flags.contains(AttrFlags::IS_SPARSE);
        let encrypted = flags.contains(AttrFlags::IS_ENCRYPTED);

        let mut inode_flags = InodeFlags::empty();
        if compressed {
            if ty != AT_DATA {
                return Err(corrupt("Compressed attribute is not $DATA"));
            }
            if self.dev.cluster_size() > NTFS_MAX_COMPRESSION_CLUSTER_SIZE {
                return Err(unsupported("Compression is not supported with clusters larger than 4 KiB"));
            }
            if !flags.contains(AttrFlags::IS_COMPRESSED) {
                return Err(unsupported("Unknown compression method"));
            }
            inode_flags |= InodeFlags::COMPRESSED;
        }
        if sparse {
            inode_flags |= InodeFlags::SPARSE;
        }
        if mst {
            if compressed || sparse {
                return Err(corrupt("Multi sector protected attribute is compressed or sparse"));
            }
            inode_flags |= InodeFlags::MST_PROTECTED;
        }
        if encrypted {
            if compressed {
                return Err(corrupt("Attribute is both encrypted and compressed"));
            }
            if mst || ty != AT_DATA {
                return Err(corrupt("Encrypted attribute is not $DATA"));
            }
            inode_flags |= InodeFlags::ENCRYPTED;
        }

        if !attr.is_non_resident() {
            if mst {
                return Err(corrupt("Multi sector protected attribute is resident"));
            }
            let value_len = attr.value_length()? as i64;
            let allocated = attr.length() as i64 - attr.value_offset()? as i64;
            let sizes = SizeTriple { allocated, data: value_len, initialized: value_len, compressed: 0 };
            if !sizes.is_consistent() {
                return Err(corrupt("Resident attribute value exceeds the attribute record"));
            }
            // 常驻值必须完整
            attr.value()?;
            ino.info_mut().flags |= inode_flags;
            ino.set_sizes(sizes);
            return Ok(());
        }

        inode_flags |= InodeFlags::NON_RESIDENT;
        if attr.lowest_vcn()? != 0 {
            return Err(corrupt("First attribute extent has a non-zero lowest VCN"));
        }

        let cu = attr.compression_unit()?;
        let mut compression = None;
        if compressed && cu != NTFS_COMPRESSION_UNIT {
            return Err(unsupported("Compressed attribute has a non-standard compression unit"));
        }
        if cu != 0 {
            if cu != NTFS_COMPRESSION_UNIT {
                return Err(unsupported("Non-standard compression unit"));
            }
            let block_size = self.dev.cluster_size() << cu;
            compression = Some(CompressionInfo {
                block_size,
                block_size_shift: block_size.trailing_zeros() as u8,
                block_clusters: 1 << cu,
            });
        }

        let mut sizes = SizeTriple {
            allocated: attr.allocated_size()?,
            data: attr.data_size()?,
            initialized: attr.initialized_size()?,
            compressed: 0,
        };
        if !sizes.is_consistent() {
            log::error!(
                "[RESOLVE] Inode {:#x} type {:#x}: sizes {}/{}/{} are out of order",
                ino.mft_no(),
                ty,
                sizes.initialized,
                sizes.data,
                sizes.allocated
            );
            return Err(corrupt("Attribute sizes are inconsistent"));
        }
        if compressed || sparse {
            sizes.compressed = attr
                .compressed_size()?
                .ok_or_else(|| corrupt("Compressed attribute lacks a compressed size"))?;
        }

        let runlist = self.decompress_extents(&attr, &extents[1..])?;

        let mut info = ino.info_mut();
        info.flags |= inode_flags;
        info.compression = compression;
        info.runlist = Some(runlist);
        drop(info);
        ino.set_sizes(sizes);
        Ok(())
    }

    /// 解压第一个扩展的映射对，并合并后续扩展
    fn decompress_extents(&self, first: &AttrRecord<'_>, rest: &[AttrRecordBuf]) -> Result<Runlist> {
        let cluster_size = self.dev.cluster_size();
        let mut runlist = Runlist::decompress(first, cluster_size)?;
        for extent in rest {
            let attr = extent.view();
            if !attr.is_non_resident() {
                return Err(corrupt("Resident attribute has more than one extent"));
            }
            runlist.merge(&Runlist::decompress(&attr, cluster_size)?)?;
        }
        if !rest.is_empty() {
            log::trace!("[RUNLIST] Merged {} attribute extents", rest.len() + 1);
        }
        Ok(runlist)
    }

    /// 校验索引根并得到索引参数
    pub(crate) fn index_info(&self, root: &AttrRecord<'_>) -> Result<IndexInfo> {
        if root.is_non_resident() {
            return Err(corrupt("$INDEX_ROOT is not resident"));
        }
        let ir = IndexRoot::parse(root.value()?)?;

        match ir.indexed_type {
            AT_FILE_NAME => {
                if ir.collation_rule != COLLATION_FILE_NAME {
                    return Err(corrupt("Directory index does not use file name collation"));
                }
            }
            AT_UNUSED => {}
            _ => return Err(corrupt("Index is not indexed by $FILE_NAME or a view key")),
        }
        if !matches!(
            ir.collation_rule,
            COLLATION_BINARY
                | COLLATION_FILE_NAME
                | COLLATION_UNICODE_STRING
                | COLLATION_NTOFS_ULONG
                | COLLATION_NTOFS_SID
                | COLLATION_NTOFS_SECURITY_HASH
                | COLLATION_NTOFS_ULONGS
        ) {
            return Err(unsupported("Unknown index collation rule"));
        }

        let block_size = ir.index_block_size;
        if !block_size.is_power_of_two() {
            return Err(corrupt("Index block size is not a power of two"));
        }
        if block_size < NTFS_BLOCK_SIZE as u32 || block_size > self.config.max_index_block_size {
            return Err(unsupported("Index block size is out of the supported range"));
        }

        let cluster_size = self.dev.cluster_size();
        let vcn_size = if cluster_size <= block_size { cluster_size } else { NTFS_BLOCK_SIZE as u32 };
        Ok(IndexInfo {
            indexed_type: ir.indexed_type,
            collation_rule: ir.collation_rule,
            block_size,
            block_size_shift: block_size.trailing_zeros() as u8,
            vcn_size,
            vcn_size_shift: vcn_size.trailing_zeros() as u8,
            large: ir.is_large(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::*;
    use crate::error::ErrorKind;
    use crate::inode::{AttrKey, InodeFlags, InodeHandle, InodeKind, NtfsInode};
    use crate::record::AttrRecord;
    use crate::test_utils::{index_root_value, non_resident_attr, resident_attr, MemDevice, NonResident};
    use crate::types::AttrFlags;
    use crate::volume::{NtfsVolume, VolumeConfig};
    use alloc::vec;

    fn volume() -> NtfsVolume<MemDevice> {
        NtfsVolume::new(MemDevice::new(), VolumeConfig::default()).unwrap()
    }

    fn inode() -> NtfsInode {
        let handle = InodeHandle { index: 0, generation: 0 };
        NtfsInode::new(handle, AttrKey::base(40), InodeKind::Base, None)
    }

    fn apply(vol: &NtfsVolume<MemDevice>, ino: &NtfsInode, ty: u32, rec: &[u8]) -> crate::Result<()> {
        let buf = AttrRecord::parse(rec).unwrap().to_owned_record().unwrap();
        vol.apply_attr_fields(ino, ty, &[buf])
    }

    #[test]
    fn test_sparse_non_resident_sizes() {
        let vol = volume();
        let ino = inode();
        let nr = NonResident {
            highest_vcn: 3,
            allocated_size: 4 * 4096,
            data_size: 3 * 4096,
            initialized_size: 4096,
            compressed_size: Some(4096),
            flags: AttrFlags::IS_SPARSE,
            mapping_pairs: vec![0x11, 0x01, 0x20, 0x01, 0x03, 0x00],
            ..NonResident::default()
        };
        apply(&vol, &ino, AT_DATA, &non_resident_attr(AT_DATA, &[], &nr)).unwrap();

        assert!(ino.flags().contains(InodeFlags::SPARSE | InodeFlags::NON_RESIDENT));
        let sizes = ino.sizes();
        assert_eq!(sizes.compressed, 4096);
        assert_eq!(sizes.initialized, 4096);
        let info = ino.info();
        let rl = info.runlist.as_ref().unwrap();
        assert_eq!(rl.vcn_to_lcn(0), 0x20);
        assert_eq!(rl.vcn_to_lcn(2), crate::runlist::LCN_HOLE);
    }

    #[test]
    fn test_compressed_attribute_sets_compression_info() {
        let vol = volume();
        let ino = inode();
        let nr = NonResident {
            highest_vcn: 15,
            allocated_size: 16 * 4096,
            data_size: 10 * 4096,
            initialized_size: 10 * 4096,
            compressed_size: Some(8 * 4096),
            compression_unit: 4,
            flags: AttrFlags::IS_COMPRESSED,
            mapping_pairs: vec![0x11, 0x08, 0x40, 0x01, 0x08, 0x00],
            ..NonResident::default()
        };
        apply(&vol, &ino, AT_DATA, &non_resident_attr(AT_DATA, &[], &nr)).unwrap();
        let c = ino.info().compression.unwrap();
        assert_eq!(c.block_size, 16 * 4096);
        assert_eq!(c.block_clusters, 16);
        assert_eq!(c.block_size_shift, 16);
        assert!(ino.flags().contains(InodeFlags::COMPRESSED));
    }

    #[test]
    fn test_compressed_non_data_is_corrupt() {
        let vol = volume();
        let ino = inode();
        let rec = resident_attr(AT_BITMAP, &[], b"x", AttrFlags::IS_COMPRESSED, 0);
        assert!(apply(&vol, &ino, AT_BITMAP, &rec).unwrap_err().is_corruption());
    }

    #[test]
    fn test_unknown_compression_method() {
        let vol = volume();
        let ino = inode();
        let rec = resident_attr(AT_DATA, &[], b"x", AttrFlags::from_bits_retain(0x0002), 0);
        assert_eq!(apply(&vol, &ino, AT_DATA, &rec).unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_encrypted_and_compressed_is_corrupt() {
        let vol = volume();
        let ino = inode();
        let flags = AttrFlags::IS_COMPRESSED | AttrFlags::IS_ENCRYPTED;
        let rec = resident_attr(AT_DATA, &[], b"x", flags, 0);
        assert!(apply(&vol, &ino, AT_DATA, &rec).unwrap_err().is_corruption());
    }

    #[test]
    fn test_resident_index_allocation_is_corrupt() {
        let vol = volume();
        let ino = inode();
        let rec = resident_attr(AT_INDEX_ALLOCATION, &[], b"x", AttrFlags::empty(), 0);
        assert!(apply(&vol, &ino, AT_INDEX_ALLOCATION, &rec).unwrap_err().is_corruption());
    }

    #[test]
    fn test_non_zero_lowest_vcn_is_corrupt() {
        let vol = volume();
        let ino = inode();
        let nr = NonResident {
            lowest_vcn: 2,
            highest_vcn: 2,
            allocated_size: 3 * 4096,
            data_size: 3 * 4096,
            initialized_size: 3 * 4096,
            mapping_pairs: vec![0x11, 0x01, 0x20, 0x00],
            ..NonResident::default()
        };
        let rec = non_resident_attr(AT_DATA, &[], &nr);
        assert!(apply(&vol, &ino, AT_DATA, &rec).unwrap_err().is_corruption());
    }

    #[test]
    fn test_index_info_checks() {
        let vol = volume();
        let check = |ty, collation, size| {
            let rec = resident_attr(AT_INDEX_ROOT, &[], &index_root_value(ty, collation, size, false), AttrFlags::empty(), 0);
            vol.index_info(&AttrRecord::parse(&rec).unwrap())
        };

        let info = check(AT_FILE_NAME, COLLATION_FILE_NAME, 1024).unwrap();
        assert_eq!(info.vcn_size, 512);
        assert_eq!(info.vcn_size_shift, 9);
        assert_eq!(info.block_size_shift, 10);

        assert!(check(AT_UNUSED, COLLATION_NTOFS_ULONG, 4096).is_ok());
        assert!(check(AT_FILE_NAME, COLLATION_BINARY, 4096).unwrap_err().is_corruption());
        assert!(check(AT_DATA, COLLATION_BINARY, 4096).unwrap_err().is_corruption());
        assert_eq!(check(AT_UNUSED, 0x77, 4096).unwrap_err().kind(), ErrorKind::Unsupported);
        assert!(check(AT_FILE_NAME, COLLATION_FILE_NAME, 1000).unwrap_err().is_corruption());
        assert_eq!(check(AT_FILE_NAME, COLLATION_FILE_NAME, 256).unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(check(AT_FILE_NAME, COLLATION_FILE_NAME, 8192).unwrap_err().kind(), ErrorKind::Unsupported);
    }
}
