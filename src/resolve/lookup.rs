//! 跨记录的属性查找
//!
//! 基本记录放不下的属性分散在扩展记录中，由属性列表给出位置。
//! 这里先扫描属性列表得到涉及的记录，再逐个映射记录取出属性快照；
//! 同一时刻最多映射一个记录。

use crate::consts::*;
use crate::device::NtfsDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{AttrKey, InodeKind, InodeState, NtfsInode};
use crate::name::NameCollation;
use crate::record::{corrupt, AttrListIter, AttrRecordBuf, AttrSearch, MftRecordHeader};
use crate::types::MftRef;
use crate::volume::NtfsVolume;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

/// 属性列表中保存目标属性的一个记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedRecord {
    /// 记录引用
    pub mref: MftRef,
    /// 该记录中目标属性各扩展的起始 VCN（按列表顺序）
    pub lowest_vcns: Vec<i64>,
}

/// 在属性列表中查找保存 (类型, 名称) 属性的记录
///
/// 同一记录的多次引用合并为一项，结果按首次出现的顺序排列。
/// 列表按类型排序，遇到更大的类型即停止。
pub fn find_listed_records(
    list: &[u8],
    ty: u32,
    name: &[u16],
    collation: &NameCollation,
) -> Result<Vec<ListedRecord>> {
    let mut records: Vec<ListedRecord> = Vec::new();
    for entry in AttrListIter::new(list) {
        let entry = entry?;
        if entry.ty > ty {
            break;
        }
        if entry.ty != ty || entry.name_length() != name.len() {
            continue;
        }
        if !collation.equal(&entry.name(), name) {
            continue;
        }
        match records.iter_mut().find(|r| r.mref == entry.mft_reference) {
            Some(rec) => {
                rec.lowest_vcns.try_reserve(1)?;
                rec.lowest_vcns.push(entry.lowest_vcn);
            }
            None => {
                records.try_reserve(1)?;
                records.push(ListedRecord { mref: entry.mft_reference, lowest_vcns: vec![entry.lowest_vcn] });
            }
        }
    }
    Ok(records)
}

/// 在单个记录中查找 (类型, 名称, 起始 VCN) 匹配的属性
fn find_in_record(
    buf: &[u8],
    hdr: &MftRecordHeader,
    ty: u32,
    name: &[u16],
    lowest_vcn: i64,
    collation: &NameCollation,
) -> Result<Option<AttrRecordBuf>> {
    let mut search = AttrSearch::new(buf, hdr);
    while let Some((_, attr)) = search.next_attr()? {
        if attr.ty() != ty || attr.name_length() as usize != name.len() {
            continue;
        }
        if !collation.equal(&attr.name()?, name) || attr.lowest_vcn()? != lowest_vcn {
            continue;
        }
        return attr.to_owned_record().map(Some);
    }
    Ok(None)
}

impl<D: NtfsDevice> NtfsVolume<D> {
    /// 查找基本 inode 的一个属性，返回各扩展的快照（按起始 VCN 排列）
    ///
    /// 没有属性列表时只在基本记录中查找。有属性列表时按列表映射各记录，
    /// 列表声明存在但记录中找不到的属性视为损坏。
    ///
    /// # 返回
    ///
    /// 属性不存在时返回 None
    pub(crate) fn lookup_attr(
        &self,
        base: &NtfsInode,
        ty: u32,
        name: &[u16],
    ) -> Result<Option<Vec<AttrRecordBuf>>> {
        let list = base.info().attr_list.clone();
        let Some(list) = list else {
            let m = self.dev.map(base.mrec_lock(), base.mft_no())?;
            let hdr = m.header()?;
            let found = AttrSearch::new(m.data(), &hdr).find(ty, name, &self.collation)?;
            return match found {
                Some((_, attr)) => Ok(Some(vec![attr.to_owned_record()?])),
                None => Ok(None),
            };
        };

        let records = find_listed_records(&list, ty, name, &self.collation)?;
        let Some(first) = records.first() else {
            return Ok(None);
        };
        if first.lowest_vcns.first() != Some(&0) {
            return Err(corrupt("First attribute list entry does not start at VCN 0"));
        }

        let mut extents: Vec<(i64, AttrRecordBuf)> = Vec::new();
        for rec in &records {
            self.with_listed_record(base, rec.mref, |buf, hdr| {
                for &vcn in &rec.lowest_vcns {
                    let attr = find_in_record(buf, hdr, ty, name, vcn, &self.collation)?
                        .ok_or_else(|| corrupt("Attribute in the attribute list is missing from its record"))?;
                    extents.try_reserve(1)?;
                    extents.push((vcn, attr));
                }
                Ok(())
            })?;
        }

        extents.sort_by_key(|(vcn, _)| *vcn);
        log::trace!(
            "[ATTRLIST] Inode {:#x} type {:#x}: {} extents in {} records",
            base.mft_no(),
            ty,
            extents.len(),
            records.len()
        );
        Ok(Some(extents.into_iter().map(|(_, attr)| attr).collect()))
    }

    /// 映射属性列表引用的一个记录（基本记录或扩展记录）并在映射期间执行 `f`
    ///
    /// 扩展记录必须正在使用、指回本基本 inode 且序列号与引用一致。
    pub(crate) fn with_listed_record<F>(&self, base: &NtfsInode, mref: MftRef, f: F) -> Result<()>
    where
        F: FnOnce(&[u8], &MftRecordHeader) -> Result<()>,
    {
        let ext = if mref.mft_no() == base.mft_no() {
            if mref.seq_no() != base.seq_no() {
                return Err(corrupt("Attribute list references a stale base record"));
            }
            None
        } else {
            Some(self.resolve_extent(base, mref)?)
        };
        let owner: &NtfsInode = ext.as_deref().unwrap_or(base);
        let m = self.dev.map(owner.mrec_lock(), mref.mft_no())?;
        let hdr = m.header()?;
        if ext.is_some() {
            let base_ref = MftRef::new(base.mft_no(), base.seq_no());
            if !hdr.is_in_use() || hdr.base_mft_record != base_ref || hdr.sequence_number != mref.seq_no() {
                log::error!(
                    "[ATTRLIST] Extent record {:#x} does not belong to inode {:#x}",
                    mref.mft_no(),
                    base.mft_no()
                );
                return Err(corrupt("Extent record does not belong to its base inode"));
            }
        }
        f(m.data(), &hdr)?;
        m.unmap()
    }

    /// 取得基本 inode 的扩展 inode，不存在时创建
    ///
    /// 扩展 inode 以记录号为键进入哈希表，同时挂接在所属基本 inode 上，
    /// 因此同一记录在内存中只有一个对象、一把映射锁。新扩展 inode
    /// 直接记录引用中的序列号，记录本身由映射它的调用者校验。
    ///
    /// # 错误
    ///
    /// - `ErrorKind::Corrupted` - 序列号与引用不符，或记录已被其他基本 inode 占用
    /// - `ErrorKind::DeadlockAvoided` - 基本 inode 正在排空
    pub fn resolve_extent(&self, base: &NtfsInode, mref: MftRef) -> Result<Arc<NtfsInode>> {
        if base.kind() != InodeKind::Base {
            return Err(Error::new(ErrorKind::InvalidInput, "Extent inodes belong to base inodes only"));
        }
        let mft_no = mref.mft_no();
        let key = AttrKey::base(mft_no);
        let mut round = 0u64;
        loop {
            let mut attached = base.attached.lock();
            let existing = attached.extents.iter().flatten().find_map(|handle| {
                let Some(ext) = self.arena.lock().get(*handle) else {
                    panic!("Extent handle {:?} of inode {:#x} is stale", handle, base.mft_no());
                };
                (ext.mft_no() == mft_no).then_some(ext)
            });
            if let Some(ext) = existing {
                drop(attached);
                return self.check_extent_seq(base, ext, mref);
            }

            if attached.closed {
                return Err(Error::new(ErrorKind::DeadlockAvoided, "Base inode is being torn down"));
            }
            attached.extents.try_reserve(1)?;
            let (ext, created) = self.hash.get_or_create(&key, || {
                self.arena.lock().insert_with(|handle| {
                    NtfsInode::new(handle, key.clone(), InodeKind::Extent, Some(base.handle()))
                })
            })?;
            if created {
                ext.info_mut().seq_no = mref.seq_no();
                ext.set_state(InodeState::Ready);
                if let Err(e) = attached.push_extent(ext.handle()) {
                    drop(attached);
                    self.free_inode(&ext);
                    return Err(e);
                }
                log::debug!("[RESOLVE] New extent inode {:#x} for base {:#x}", mft_no, base.mft_no());
                return Ok(ext);
            }
            drop(attached);

            // 哈希表中的同号对象不属于本基本 inode
            match (ext.kind(), ext.state()) {
                (InodeKind::Extent, InodeState::Ready) => {
                    log::error!(
                        "[RESOLVE] Extent {:#x} referenced by inode {:#x} already belongs to another base",
                        mft_no,
                        base.mft_no()
                    );
                    let err = corrupt("Extent record is owned by another base inode");
                    self.note_error(base.mft_no(), &err);
                    return Err(err);
                }
                (InodeKind::Base, InodeState::Ready | InodeState::Deleted) => {
                    let err = corrupt("Extent record is in use as a base inode");
                    self.note_error(base.mft_no(), &err);
                    return Err(err);
                }
                // 正在构造或正在释放
                _ => {}
            }
            round += 1;
            self.host.relax(round);
        }
    }

    fn check_extent_seq(&self, base: &NtfsInode, ext: Arc<NtfsInode>, mref: MftRef) -> Result<Arc<NtfsInode>> {
        if ext.seq_no() != mref.seq_no() {
            log::error!(
                "[RESOLVE] Extent {:#x} has sequence {} but the reference has {}",
                mref.mft_no(),
                ext.seq_no(),
                mref.seq_no()
            );
            let err = corrupt("Extent reference has a stale sequence number");
            self.note_error(base.mft_no(), &err);
            return Err(err);
        }
        Ok(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Upcase;
    use crate::test_utils::{attr_list_entry, non_resident_attr, MemDevice, NonResident, RecordBuilder};
    use crate::types::LockMode;
    use crate::volume::VolumeConfig;

    fn u(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn volume(dev: MemDevice) -> NtfsVolume<MemDevice> {
        NtfsVolume::new(dev, VolumeConfig::default()).unwrap()
    }

    #[test]
    fn test_find_listed_records_dedups() {
        let mut list = attr_list_entry(AT_STANDARD_INFORMATION, &[], MftRef::new(70, 1), 0);
        list.extend(attr_list_entry(AT_DATA, &[], MftRef::new(71, 2), 0));
        list.extend(attr_list_entry(AT_DATA, &[], MftRef::new(72, 2), 10));
        list.extend(attr_list_entry(AT_DATA, &[], MftRef::new(71, 2), 20));
        list.extend(attr_list_entry(AT_DATA, &u("Resource"), MftRef::new(73, 1), 0));
        list.extend(attr_list_entry(AT_BITMAP, &[], MftRef::new(74, 1), 0));
        let ci = NameCollation::new(false, Upcase::default());

        let records = find_listed_records(&list, AT_DATA, &[], &ci).unwrap();
        assert_eq!(
            records,
            [
                ListedRecord { mref: MftRef::new(71, 2), lowest_vcns: vec![0, 20] },
                ListedRecord { mref: MftRef::new(72, 2), lowest_vcns: vec![10] },
            ]
        );

        let named = find_listed_records(&list, AT_DATA, &u("RESOURCE"), &ci).unwrap();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].mref.mft_no(), 73);
        assert!(find_listed_records(&list, AT_INDEX_ROOT, &[], &ci).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_attribute_list_is_corrupt() {
        let list = attr_list_entry(AT_DATA, &[], MftRef::new(71, 2), 0);
        let ci = NameCollation::default();
        assert!(find_listed_records(&list[..0x10], AT_DATA, &[], &ci).unwrap_err().is_corruption());
    }

    #[test]
    fn test_resolve_extent_reuses_and_checks_sequence() {
        let mut dev = MemDevice::new();
        dev.put_record(30, &RecordBuilder::file(30).resident(AT_DATA, &[], b"x").build());
        let vol = volume(dev);
        let base = vol.resolve_base(30, LockMode::Shared).unwrap();

        let a = vol.resolve_extent(&base, MftRef::new(31, 4)).unwrap();
        assert_eq!(a.kind(), InodeKind::Extent);
        assert_eq!(a.seq_no(), 4);
        assert_eq!(a.base(), Some(base.handle()));
        let b = vol.resolve_extent(&base, MftRef::new(31, 4)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(base.extent_count(), 1);
        assert_eq!(vol.stats().hashed_inodes, 2);
        assert!(Arc::ptr_eq(&vol.inode_hash().lookup_only(&AttrKey::base(31)).unwrap(), &a));

        assert!(!vol.has_errors());
        let err = vol.resolve_extent(&base, MftRef::new(31, 5)).unwrap_err();
        assert!(err.is_corruption());
        assert!(vol.has_errors());
    }

    #[test]
    fn test_resolve_extent_on_closed_base() {
        let mut dev = MemDevice::new();
        dev.put_record(30, &RecordBuilder::file(30).resident(AT_DATA, &[], b"x").build());
        let vol = volume(dev);
        let base = vol.resolve_base(30, LockMode::Shared).unwrap();
        base.attached.lock().closed = true;
        let err = vol.resolve_extent(&base, MftRef::new(31, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlockAvoided);
    }

    #[test]
    fn test_extent_record_shared_by_two_bases() {
        let mut dev = MemDevice::new();
        dev.put_record(30, &RecordBuilder::file(30).resident(AT_DATA, &[], b"x").build());
        dev.put_record(40, &RecordBuilder::file(40).resident(AT_DATA, &[], b"y").build());
        let vol = volume(dev);
        let first = vol.resolve_base(30, LockMode::Unlocked).unwrap().unlock();
        let second = vol.resolve_base(40, LockMode::Unlocked).unwrap().unlock();

        let ext = vol.resolve_extent(&first, MftRef::new(31, 1)).unwrap();
        let err = vol.resolve_extent(&second, MftRef::new(31, 1)).unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(second.extent_count(), 0);
        assert_eq!(vol.stats().live_inodes, 3);

        // 同一记录不能再作为基本 inode 出现
        assert!(vol.resolve_base(31, LockMode::Shared).unwrap_err().is_corruption());
        assert!(Arc::ptr_eq(&vol.lookup_cached(&AttrKey::base(31)).unwrap(), &ext));
        assert_eq!(vol.stats().hashed_inodes, 3);

        // 原所有者释放后记录可以被重新引用
        vol.reclaim(&first);
        assert!(vol.inode_hash().lookup_only(&AttrKey::base(31)).is_none());
        let again = vol.resolve_extent(&second, MftRef::new(31, 1)).unwrap();
        assert!(!Arc::ptr_eq(&again, &ext));
        assert_eq!(again.base(), Some(second.handle()));
    }

    fn data_extent(lowest: i64, highest: i64, lcn: u8, allocated: i64) -> Vec<u8> {
        let nr = NonResident {
            lowest_vcn: lowest,
            highest_vcn: highest,
            allocated_size: allocated,
            data_size: allocated,
            initialized_size: allocated,
            mapping_pairs: vec![0x11, (highest - lowest + 1) as u8, lcn, 0x00],
            ..NonResident::default()
        };
        non_resident_attr(AT_DATA, &[], &nr)
    }

    #[test]
    fn test_attribute_split_over_extent_records() {
        let mut dev = MemDevice::new();
        let mut list = attr_list_entry(AT_STANDARD_INFORMATION, &[], MftRef::new(70, 1), 0);
        list.extend(attr_list_entry(AT_ATTRIBUTE_LIST, &[], MftRef::new(70, 1), 0));
        list.extend(attr_list_entry(AT_DATA, &[], MftRef::new(71, 2), 0));
        list.extend(attr_list_entry(AT_DATA, &[], MftRef::new(72, 2), 2));
        dev.put_record(70, &RecordBuilder::file(70).resident(AT_ATTRIBUTE_LIST, &[], &list).build());
        dev.put_record(
            71,
            &RecordBuilder::new(71).seq(2).base(MftRef::new(70, 1)).raw_attr(data_extent(0, 1, 0x30, 4 * 4096)).build(),
        );
        dev.put_record(
            72,
            &RecordBuilder::new(72).seq(2).base(MftRef::new(70, 1)).raw_attr(data_extent(2, 3, 0x50, 0)).build(),
        );
        let vol = volume(dev);

        let ino = vol.resolve_base(70, LockMode::Shared).unwrap();
        assert_eq!(ino.extent_count(), 2);
        assert_eq!(ino.sizes().data, 4 * 4096);
        let info = ino.info();
        let rl = info.runlist.as_ref().unwrap();
        assert_eq!(rl.vcn_to_lcn(1), 0x31);
        assert_eq!(rl.vcn_to_lcn(3), 0x51);
    }

    #[test]
    fn test_extent_record_of_another_base_is_corrupt() {
        let mut dev = MemDevice::new();
        let mut list = attr_list_entry(AT_STANDARD_INFORMATION, &[], MftRef::new(70, 1), 0);
        list.extend(attr_list_entry(AT_DATA, &[], MftRef::new(71, 2), 0));
        dev.put_record(70, &RecordBuilder::file(70).resident(AT_ATTRIBUTE_LIST, &[], &list).build());
        dev.put_record(
            71,
            &RecordBuilder::new(71).seq(2).base(MftRef::new(90, 1)).resident(AT_DATA, &[], b"x").build(),
        );
        let vol = volume(dev);
        assert!(vol.resolve_base(70, LockMode::Shared).unwrap_err().is_corruption());
        assert!(vol.has_errors());
    }
}
