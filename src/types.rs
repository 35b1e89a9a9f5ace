//! NTFS 基础类型定义
//!
//! 这个模块包含磁盘格式中的小型强类型（MFT 引用、时间戳、各类标志位）
//! 以及解析层对外暴露的选项类型。

use crate::consts::*;
use bitflags::bitflags;
use core::fmt;

//=============================================================================
// MFT 引用
//=============================================================================

/// MFT 引用：低 48 位为记录号，高 16 位为序列号
///
/// 序列号用于在记录被复用后识别过期引用。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MftRef(u64);

impl MftRef {
    /// 由记录号和序列号组合
    pub const fn new(mft_no: u64, seq_no: u16) -> Self {
        Self((mft_no & MREF_MASK) | ((seq_no as u64) << 48))
    }

    /// 从磁盘上的原始 64 位值构造
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始 64 位值
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// MFT 记录号
    pub const fn mft_no(self) -> u64 {
        self.0 & MREF_MASK
    }

    /// 序列号
    pub const fn seq_no(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// 是否为空引用
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for MftRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MftRef({:#x}, seq {})", self.mft_no(), self.seq_no())
    }
}

//=============================================================================
// 时间戳
//=============================================================================

/// NTFS 时间戳：自 1601-01-01 UTC 起的 100ns 间隔数
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct NtfsTime(pub i64);

impl NtfsTime {
    /// 转换为 UNIX 时间 (秒, 纳秒)
    ///
    /// 纳秒部分总是非负，早于 1970 年的时间返回负的秒数。
    pub fn to_unix(self) -> (i64, u32) {
        let t = self.0 - NTFS_TIME_OFFSET;
        let secs = t.div_euclid(10_000_000);
        let nsec = (t.rem_euclid(10_000_000) * 100) as u32;
        (secs, nsec)
    }

    /// 由 UNIX 时间构造
    pub fn from_unix(secs: i64, nsec: u32) -> Self {
        Self(secs * 10_000_000 + (nsec / 100) as i64 + NTFS_TIME_OFFSET)
    }
}

//=============================================================================
// 锁与创建选项
//=============================================================================

/// 解析完成后返回对象时持有的锁
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// 独占锁（结构性修改）
    Exclusive,
    /// 共享锁（读多写少的访问）
    Shared,
    /// 调用者已经持有该对象的独占锁
    ///
    /// 仅用于调用者刚刚自己解析出、尚未发布的对象；
    /// 对未被独占持有的对象使用属于编程错误。
    AlreadyLocked,
    /// 不持有锁，仅返回引用
    Unlocked,
}

bitflags! {
    /// 解析属性 inode 时的创建选项
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CreateOptions: u8 {
        /// 不存在时创建（常驻、空值）
        const CREATE     = 0x01;
        /// 已存在且非空时失败
        const EXCLUSIVE  = 0x02;
        /// 不存在时失败
        const MUST_EXIST = 0x04;
    }
}

//=============================================================================
// 磁盘标志
//=============================================================================

bitflags! {
    /// MFT 记录头标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MftRecordFlags: u16 {
        /// 记录正在使用
        const IN_USE        = 0x0001;
        /// 记录是目录
        const IS_DIRECTORY  = 0x0002;
        /// 记录在 $Extend 下
        const IS_4          = 0x0004;
        /// 记录包含视图索引
        const IS_VIEW_INDEX = 0x0008;
    }
}

bitflags! {
    /// 属性记录标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        /// LZNT1 压缩
        const IS_COMPRESSED    = 0x0001;
        /// 压缩方法掩码
        const COMPRESSION_MASK = 0x00FF;
        /// 加密
        const IS_ENCRYPTED     = 0x4000;
        /// 稀疏
        const IS_SPARSE        = 0x8000;
    }
}

impl AttrFlags {
    /// 压缩方法位（COMPRESSION_MASK 内的位）
    pub fn compression_bits(self) -> u16 {
        self.bits() & Self::COMPRESSION_MASK.bits()
    }

    /// 是否带有任何压缩方法位
    pub fn is_compressed(self) -> bool {
        self.compression_bits() != 0
    }
}

bitflags! {
    /// 文件属性标志（标准信息与文件名属性中）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributeFlags: u32 {
        const READONLY            = 0x0000_0001;
        const HIDDEN              = 0x0000_0002;
        const SYSTEM              = 0x0000_0004;
        const DIRECTORY           = 0x0000_0010;
        const ARCHIVE             = 0x0000_0020;
        const DEVICE              = 0x0000_0040;
        const NORMAL              = 0x0000_0080;
        const TEMPORARY           = 0x0000_0100;
        const SPARSE_FILE         = 0x0000_0200;
        const REPARSE_POINT       = 0x0000_0400;
        const COMPRESSED          = 0x0000_0800;
        const OFFLINE             = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED           = 0x0000_4000;
        const DUP_FILE_NAME_INDEX_PRESENT = 0x1000_0000;
        const DUP_VIEW_INDEX_PRESENT      = 0x2000_0000;
    }
}

/// 文件名命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileNameNamespace {
    /// 区分大小写，任意 Unicode
    Posix = 0,
    /// 长文件名
    Win32 = 1,
    /// 8.3 短文件名
    Dos = 2,
    /// 长短文件名相同
    Win32AndDos = 3,
}

impl FileNameNamespace {
    /// 从磁盘值解析
    pub fn from_raw(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Posix),
            1 => Some(Self::Win32),
            2 => Some(Self::Dos),
            3 => Some(Self::Win32AndDos),
            _ => None,
        }
    }
}
