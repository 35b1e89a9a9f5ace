//! 测试辅助：内存设备与 MFT 记录构造器

use crate::consts::*;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::record::align8;
use crate::types::{AttrFlags, FileAttributeFlags, FileNameNamespace, MftRecordFlags, MftRef};
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};

const RECORD_SIZE: usize = 1024;
const CLUSTER_SIZE: usize = 4096;
const USA_OFS: usize = MFT_RECORD_HEADER_SIZE;
const USA_COUNT: usize = RECORD_SIZE / NTFS_BLOCK_SIZE + 1;
const ATTRS_OFFSET: usize = 0x38;

/// 内存中的 NTFS 设备
///
/// 记录以磁盘形式保存（扇区尾部为 USN），未写过的簇读出为零。
#[derive(Debug, Default)]
pub struct MemDevice {
    records: BTreeMap<u64, Vec<u8>>,
    clusters: BTreeMap<u64, Vec<u8>>,
    /// 记录读取次数
    pub record_reads: usize,
    /// 只读
    pub read_only: bool,
}

impl MemDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 放入一个记录（修复后的映像），按当前 USN 转换为磁盘形式
    pub fn put_record(&mut self, mft_no: u64, logical: &[u8]) {
        let mut raw = logical.to_vec();
        let usn = LittleEndian::read_u16(&raw[USA_OFS..]);
        for i in 1..USA_COUNT {
            let tail = i * NTFS_BLOCK_SIZE - 2;
            raw.copy_within(tail..tail + 2, USA_OFS + i * 2);
            LittleEndian::write_u16(&mut raw[tail..], usn);
        }
        self.records.insert(mft_no, raw);
    }

    /// 破坏最后一个扇区的尾部，模拟写入不完整
    pub fn tear_record(&mut self, mft_no: u64) {
        let raw = self.records.get_mut(&mft_no).expect("record exists");
        raw[RECORD_SIZE - 1] ^= 0xFF;
    }

    /// 记录的磁盘形式
    pub fn record_image(&self, mft_no: u64) -> Option<&Vec<u8>> {
        self.records.get(&mft_no)
    }

    /// 放入一个簇
    pub fn put_cluster(&mut self, lcn: u64, data: &[u8]) {
        let mut cluster = vec![0u8; CLUSTER_SIZE];
        cluster[..data.len()].copy_from_slice(data);
        self.clusters.insert(lcn, cluster);
    }
}

impl NtfsDevice for MemDevice {
    fn mft_record_size(&self) -> u32 {
        RECORD_SIZE as u32
    }

    fn cluster_size(&self) -> u32 {
        CLUSTER_SIZE as u32
    }

    fn read_mft_record(&mut self, mft_no: u64, buf: &mut [u8]) -> Result<usize> {
        self.record_reads += 1;
        let raw = self
            .records
            .get(&mft_no)
            .ok_or(Error::new(ErrorKind::NotFound, "No such MFT record"))?;
        buf.copy_from_slice(raw);
        Ok(buf.len())
    }

    fn write_mft_record(&mut self, mft_no: u64, buf: &[u8]) -> Result<usize> {
        self.records.insert(mft_no, buf.to_vec());
        Ok(buf.len())
    }

    fn read_clusters(&mut self, lcn: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        for i in 0..count as usize {
            let dst = &mut buf[i * CLUSTER_SIZE..(i + 1) * CLUSTER_SIZE];
            match self.clusters.get(&(lcn + i as u64)) {
                Some(cluster) => dst.copy_from_slice(cluster),
                None => dst.fill(0),
            }
        }
        Ok(count as usize * CLUSTER_SIZE)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// 非常驻属性的参数
#[derive(Debug, Clone)]
pub struct NonResident {
    pub lowest_vcn: i64,
    pub highest_vcn: i64,
    pub allocated_size: i64,
    pub data_size: i64,
    pub initialized_size: i64,
    pub compressed_size: Option<i64>,
    pub compression_unit: u8,
    pub flags: AttrFlags,
    pub mapping_pairs: Vec<u8>,
}

impl Default for NonResident {
    fn default() -> Self {
        Self {
            lowest_vcn: 0,
            highest_vcn: 0,
            allocated_size: 0,
            data_size: 0,
            initialized_size: 0,
            compressed_size: None,
            compression_unit: 0,
            flags: AttrFlags::empty(),
            mapping_pairs: vec![0],
        }
    }
}

fn put_name(rec: &mut [u8], ofs: usize, name: &[u16]) {
    for (i, &c) in name.iter().enumerate() {
        LittleEndian::write_u16(&mut rec[ofs + i * 2..], c);
    }
}

/// 常驻属性记录
pub fn resident_attr(ty: u32, name: &[u16], value: &[u8], flags: AttrFlags, instance: u16) -> Vec<u8> {
    let value_ofs = align8(ATTR_RESIDENT_HEADER_SIZE + name.len() * 2);
    let len = value_ofs + align8(value.len());
    let mut rec = vec![0u8; len];
    LittleEndian::write_u32(&mut rec[ATTR_TYPE..], ty);
    LittleEndian::write_u32(&mut rec[ATTR_LENGTH..], len as u32);
    rec[ATTR_NAME_LENGTH] = name.len() as u8;
    LittleEndian::write_u16(&mut rec[ATTR_NAME_OFFSET..], ATTR_RESIDENT_HEADER_SIZE as u16);
    LittleEndian::write_u16(&mut rec[ATTR_FLAGS..], flags.bits());
    LittleEndian::write_u16(&mut rec[ATTR_INSTANCE..], instance);
    LittleEndian::write_u32(&mut rec[ATTR_VALUE_LENGTH..], value.len() as u32);
    LittleEndian::write_u16(&mut rec[ATTR_VALUE_OFFSET..], value_ofs as u16);
    put_name(&mut rec, ATTR_RESIDENT_HEADER_SIZE, name);
    rec[value_ofs..value_ofs + value.len()].copy_from_slice(value);
    rec
}

/// 非常驻属性记录
pub fn non_resident_attr(ty: u32, name: &[u16], nr: &NonResident) -> Vec<u8> {
    let has_compressed_size = nr.compressed_size.is_some()
        || nr.flags.is_compressed()
        || nr.flags.contains(AttrFlags::IS_SPARSE);
    let header = if has_compressed_size {
        ATTR_NON_RESIDENT_COMPRESSED_HEADER_SIZE
    } else {
        ATTR_NON_RESIDENT_HEADER_SIZE
    };
    let mp_ofs = align8(header + name.len() * 2);
    let len = align8(mp_ofs + nr.mapping_pairs.len());
    let mut rec = vec![0u8; len];
    LittleEndian::write_u32(&mut rec[ATTR_TYPE..], ty);
    LittleEndian::write_u32(&mut rec[ATTR_LENGTH..], len as u32);
    rec[ATTR_NON_RESIDENT] = 1;
    rec[ATTR_NAME_LENGTH] = name.len() as u8;
    LittleEndian::write_u16(&mut rec[ATTR_NAME_OFFSET..], header as u16);
    LittleEndian::write_u16(&mut rec[ATTR_FLAGS..], nr.flags.bits());
    LittleEndian::write_i64(&mut rec[ATTR_LOWEST_VCN..], nr.lowest_vcn);
    LittleEndian::write_i64(&mut rec[ATTR_HIGHEST_VCN..], nr.highest_vcn);
    LittleEndian::write_u16(&mut rec[ATTR_MAPPING_PAIRS_OFFSET..], mp_ofs as u16);
    rec[ATTR_COMPRESSION_UNIT] = nr.compression_unit;
    LittleEndian::write_i64(&mut rec[ATTR_ALLOCATED_SIZE..], nr.allocated_size);
    LittleEndian::write_i64(&mut rec[ATTR_DATA_SIZE..], nr.data_size);
    LittleEndian::write_i64(&mut rec[ATTR_INITIALIZED_SIZE..], nr.initialized_size);
    if has_compressed_size {
        LittleEndian::write_i64(&mut rec[ATTR_COMPRESSED_SIZE..], nr.compressed_size.unwrap_or(0));
    }
    put_name(&mut rec, header, name);
    rec[mp_ofs..mp_ofs + nr.mapping_pairs.len()].copy_from_slice(&nr.mapping_pairs);
    rec
}

/// $STANDARD_INFORMATION 值
pub fn std_info_value(attrs: FileAttributeFlags, len: usize) -> Vec<u8> {
    let mut v = vec![0u8; len];
    for (i, ofs) in [SI_CREATION_TIME, SI_LAST_DATA_CHANGE_TIME, SI_LAST_MFT_CHANGE_TIME, SI_LAST_ACCESS_TIME]
        .into_iter()
        .enumerate()
    {
        LittleEndian::write_i64(&mut v[ofs..], NTFS_TIME_OFFSET + (i as i64 + 1) * 10_000_000);
    }
    LittleEndian::write_u32(&mut v[SI_FILE_ATTRIBUTES..], attrs.bits());
    v
}

/// $FILE_NAME 值
pub fn file_name_value(parent: MftRef, name: &[u16], namespace: FileNameNamespace) -> Vec<u8> {
    let mut v = vec![0u8; FILE_NAME_HEADER_SIZE + name.len() * 2];
    LittleEndian::write_u64(&mut v[FN_PARENT_DIRECTORY..], parent.raw());
    v[FN_FILE_NAME_LENGTH] = name.len() as u8;
    v[FN_FILE_NAME_TYPE] = namespace as u8;
    put_name(&mut v, FILE_NAME_HEADER_SIZE, name);
    v
}

/// 一个属性列表项（8 字节对齐）
pub fn attr_list_entry(ty: u32, name: &[u16], mref: MftRef, lowest_vcn: i64) -> Vec<u8> {
    let len = align8(ATTR_LIST_ENTRY_HEADER_SIZE + name.len() * 2);
    let mut v = vec![0u8; len];
    LittleEndian::write_u32(&mut v[AL_TYPE..], ty);
    LittleEndian::write_u16(&mut v[AL_LENGTH..], len as u16);
    v[AL_NAME_LENGTH] = name.len() as u8;
    v[AL_NAME_OFFSET] = ATTR_LIST_ENTRY_HEADER_SIZE as u8;
    LittleEndian::write_i64(&mut v[AL_LOWEST_VCN..], lowest_vcn);
    LittleEndian::write_u64(&mut v[AL_MFT_REFERENCE..], mref.raw());
    put_name(&mut v, ATTR_LIST_ENTRY_HEADER_SIZE, name);
    v
}

/// $INDEX_ROOT 值（只含结束项）
pub fn index_root_value(indexed_type: u32, collation: u32, block_size: u32, large: bool) -> Vec<u8> {
    let mut v = vec![0u8; INDEX_ROOT_HEADER_SIZE + 0x10];
    LittleEndian::write_u32(&mut v[IR_TYPE..], indexed_type);
    LittleEndian::write_u32(&mut v[IR_COLLATION_RULE..], collation);
    LittleEndian::write_u32(&mut v[IR_INDEX_BLOCK_SIZE..], block_size);
    v[IR_CLUSTERS_PER_INDEX_BLOCK] = if block_size as usize >= CLUSTER_SIZE {
        (block_size as usize / CLUSTER_SIZE) as u8
    } else {
        (block_size as usize / NTFS_BLOCK_SIZE) as u8
    };
    let ih = IR_INDEX_HEADER;
    LittleEndian::write_u32(&mut v[ih + IH_ENTRIES_OFFSET..], 0x10);
    LittleEndian::write_u32(&mut v[ih + IH_INDEX_LENGTH..], 0x20);
    LittleEndian::write_u32(&mut v[ih + IH_ALLOCATED_SIZE..], 0x20);
    v[ih + IH_FLAGS] = if large { LARGE_INDEX } else { 0 };
    // 结束项：长度 0x10，标志 INDEX_ENTRY_END
    LittleEndian::write_u16(&mut v[INDEX_ROOT_HEADER_SIZE + 8..], 0x10);
    LittleEndian::write_u16(&mut v[INDEX_ROOT_HEADER_SIZE + 12..], 0x02);
    v
}

/// MFT 记录构造器
///
/// 属性按调用顺序排列，调用者负责按 (类型, 名称) 排序。
/// `build()` 返回修复后的映像。
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    mft_no: u64,
    seq: u16,
    links: u16,
    flags: MftRecordFlags,
    base: MftRef,
    attrs: Vec<Vec<u8>>,
}

impl RecordBuilder {
    pub fn new(mft_no: u64) -> Self {
        Self {
            mft_no,
            seq: 1,
            links: 1,
            flags: MftRecordFlags::IN_USE,
            base: MftRef::default(),
            attrs: Vec::new(),
        }
    }

    pub fn seq(mut self, seq: u16) -> Self {
        self.seq = seq;
        self
    }

    pub fn links(mut self, links: u16) -> Self {
        self.links = links;
        self
    }

    pub fn directory(mut self) -> Self {
        self.flags |= MftRecordFlags::IS_DIRECTORY;
        self
    }

    pub fn flags(mut self, flags: MftRecordFlags) -> Self {
        self.flags = flags;
        self
    }

    /// 标记为 `base` 的扩展记录
    pub fn base(mut self, base: MftRef) -> Self {
        self.base = base;
        self
    }

    pub fn resident(self, ty: u32, name: &[u16], value: &[u8]) -> Self {
        let instance = self.attrs.len() as u16;
        self.raw_attr(resident_attr(ty, name, value, AttrFlags::empty(), instance))
    }

    pub fn resident_flags(self, ty: u32, name: &[u16], value: &[u8], flags: AttrFlags) -> Self {
        let instance = self.attrs.len() as u16;
        self.raw_attr(resident_attr(ty, name, value, flags, instance))
    }

    pub fn non_resident(self, ty: u32, name: &[u16], nr: &NonResident) -> Self {
        self.raw_attr(non_resident_attr(ty, name, nr))
    }

    /// 放入现成的属性记录，实例号按位置重写
    pub fn raw_attr(mut self, mut rec: Vec<u8>) -> Self {
        LittleEndian::write_u16(&mut rec[ATTR_INSTANCE..], self.attrs.len() as u16);
        self.attrs.push(rec);
        self
    }

    /// 带有标准信息的普通文件记录
    pub fn file(mft_no: u64) -> Self {
        Self::new(mft_no).resident(
            AT_STANDARD_INFORMATION,
            &[],
            &std_info_value(FileAttributeFlags::ARCHIVE, STANDARD_INFORMATION_V3_SIZE),
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&MFT_RECORD_MAGIC);
        LittleEndian::write_u16(&mut buf[MFT_HDR_USA_OFS..], USA_OFS as u16);
        LittleEndian::write_u16(&mut buf[MFT_HDR_USA_COUNT..], USA_COUNT as u16);
        LittleEndian::write_u16(&mut buf[MFT_HDR_SEQUENCE_NUMBER..], self.seq);
        LittleEndian::write_u16(&mut buf[MFT_HDR_LINK_COUNT..], self.links);
        LittleEndian::write_u16(&mut buf[MFT_HDR_ATTRS_OFFSET..], ATTRS_OFFSET as u16);
        LittleEndian::write_u16(&mut buf[MFT_HDR_FLAGS..], self.flags.bits());
        LittleEndian::write_u32(&mut buf[MFT_HDR_BYTES_ALLOCATED..], RECORD_SIZE as u32);
        LittleEndian::write_u64(&mut buf[MFT_HDR_BASE_MFT_RECORD..], self.base.raw());
        LittleEndian::write_u16(&mut buf[MFT_HDR_NEXT_ATTR_INSTANCE..], self.attrs.len() as u16);
        LittleEndian::write_u32(&mut buf[MFT_HDR_MFT_RECORD_NUMBER..], self.mft_no as u32);
        LittleEndian::write_u16(&mut buf[USA_OFS..], 1);

        let mut pos = ATTRS_OFFSET;
        for attr in &self.attrs {
            buf[pos..pos + attr.len()].copy_from_slice(attr);
            pos += attr.len();
        }
        LittleEndian::write_u32(&mut buf[pos..], AT_END);
        let in_use = align8(pos + 8);
        assert!(in_use <= RECORD_SIZE, "attributes do not fit in the record");
        LittleEndian::write_u32(&mut buf[MFT_HDR_BYTES_IN_USE..], in_use as u32);

        // USA 中保存扇区尾部的原值
        for i in 1..USA_COUNT {
            let tail = i * NTFS_BLOCK_SIZE - 2;
            buf.copy_within(tail..tail + 2, USA_OFS + i * 2);
        }
        buf
    }
}
