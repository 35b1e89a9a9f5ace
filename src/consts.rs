//! NTFS 常量定义
//!
//! 这个模块包含了 inode 解析层用到的所有磁盘格式常量，包括：
//! - MFT 记录头布局
//! - 属性类型与属性记录头布局
//! - 各类属性值（标准信息、文件名、属性列表、索引根）的布局
//! - 系统文件编号与各类上限

#![allow(missing_docs)]  // 偏移量常量按磁盘格式命名，不逐一注释

//=============================================================================
// 基础常量
//=============================================================================

/// 多扇区保护的扇区大小（512 字节）
pub const NTFS_BLOCK_SIZE: usize = 512;

/// NTFS_BLOCK_SIZE 的 log2
pub const NTFS_BLOCK_SIZE_SHIFT: u32 = 9;

/// 默认 MFT 记录大小（1024 字节）
pub const NTFS_DEFAULT_MFT_RECORD_SIZE: u32 = 1024;

/// 默认簇大小（4096 字节）
pub const NTFS_DEFAULT_CLUSTER_SIZE: u32 = 4096;

/// 默认支持的最大索引块大小
pub const NTFS_DEFAULT_MAX_INDEX_BLOCK_SIZE: u32 = 4096;

/// 标准压缩单元（2^4 = 16 个簇）
pub const NTFS_COMPRESSION_UNIT: u8 = 4;

/// 支持压缩的最大簇大小
pub const NTFS_MAX_COMPRESSION_CLUSTER_SIZE: u32 = 4096;

/// MFT 引用中记录号的掩码（低 48 位）
pub const MREF_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

/// 1601-01-01 到 1970-01-01 之间的 100ns 间隔数
pub const NTFS_TIME_OFFSET: i64 = 116_444_736_000_000_000;

/// 属性列表的最大长度（256 KiB）
pub const NTFS_MAX_ATTR_LIST_SIZE: i64 = 0x40000;

/// 父目录链遍历的最大深度
pub const NTFS_MAX_PATH_DEPTH: usize = 1024;

//=============================================================================
// 系统文件编号
//=============================================================================

/// $MFT
pub const FILE_MFT: u64 = 0;
/// $MFTMirr
pub const FILE_MFT_MIRR: u64 = 1;
/// $LogFile
pub const FILE_LOGFILE: u64 = 2;
/// $Volume
pub const FILE_VOLUME: u64 = 3;
/// $AttrDef
pub const FILE_ATTRDEF: u64 = 4;
/// 根目录
pub const FILE_ROOT: u64 = 5;
/// $Bitmap
pub const FILE_BITMAP: u64 = 6;
/// $Boot
pub const FILE_BOOT: u64 = 7;
/// $BadClus
pub const FILE_BADCLUS: u64 = 8;
/// $Secure（没有未命名 $DATA）
pub const FILE_SECURE: u64 = 9;
/// $UpCase
pub const FILE_UPCASE: u64 = 10;
/// $Extend
pub const FILE_EXTEND: u64 = 11;
/// 第一个用户文件
pub const FILE_FIRST_USER: u64 = 16;

//=============================================================================
// MFT 记录头
//=============================================================================

/// "FILE" 魔数
pub const MFT_RECORD_MAGIC: [u8; 4] = *b"FILE";

/// "BAAD" 魔数（多扇区传输出错的记录）
pub const BAAD_RECORD_MAGIC: [u8; 4] = *b"BAAD";

pub const MFT_HDR_USA_OFS: usize = 0x04;
pub const MFT_HDR_USA_COUNT: usize = 0x06;
pub const MFT_HDR_LSN: usize = 0x08;
pub const MFT_HDR_SEQUENCE_NUMBER: usize = 0x10;
pub const MFT_HDR_LINK_COUNT: usize = 0x12;
pub const MFT_HDR_ATTRS_OFFSET: usize = 0x14;
pub const MFT_HDR_FLAGS: usize = 0x16;
pub const MFT_HDR_BYTES_IN_USE: usize = 0x18;
pub const MFT_HDR_BYTES_ALLOCATED: usize = 0x1C;
pub const MFT_HDR_BASE_MFT_RECORD: usize = 0x20;
pub const MFT_HDR_NEXT_ATTR_INSTANCE: usize = 0x28;
pub const MFT_HDR_MFT_RECORD_NUMBER: usize = 0x2C;

/// NTFS 3.1 的 MFT 记录头大小（更新序列数组从这里开始）
pub const MFT_RECORD_HEADER_SIZE: usize = 0x30;

//=============================================================================
// 属性类型
//=============================================================================

pub const AT_UNUSED: u32 = 0x00;
pub const AT_STANDARD_INFORMATION: u32 = 0x10;
pub const AT_ATTRIBUTE_LIST: u32 = 0x20;
pub const AT_FILE_NAME: u32 = 0x30;
pub const AT_OBJECT_ID: u32 = 0x40;
pub const AT_SECURITY_DESCRIPTOR: u32 = 0x50;
pub const AT_VOLUME_NAME: u32 = 0x60;
pub const AT_VOLUME_INFORMATION: u32 = 0x70;
pub const AT_DATA: u32 = 0x80;
pub const AT_INDEX_ROOT: u32 = 0x90;
pub const AT_INDEX_ALLOCATION: u32 = 0xA0;
pub const AT_BITMAP: u32 = 0xB0;
pub const AT_REPARSE_POINT: u32 = 0xC0;
pub const AT_EA_INFORMATION: u32 = 0xD0;
pub const AT_EA: u32 = 0xE0;
pub const AT_LOGGED_UTILITY_STREAM: u32 = 0x100;
/// 属性链结束标记
pub const AT_END: u32 = 0xFFFF_FFFF;

//=============================================================================
// 属性记录头
//=============================================================================

pub const ATTR_TYPE: usize = 0x00;
pub const ATTR_LENGTH: usize = 0x04;
pub const ATTR_NON_RESIDENT: usize = 0x08;
pub const ATTR_NAME_LENGTH: usize = 0x09;
pub const ATTR_NAME_OFFSET: usize = 0x0A;
pub const ATTR_FLAGS: usize = 0x0C;
pub const ATTR_INSTANCE: usize = 0x0E;

// 常驻属性
pub const ATTR_VALUE_LENGTH: usize = 0x10;
pub const ATTR_VALUE_OFFSET: usize = 0x14;
pub const ATTR_RESIDENT_FLAGS: usize = 0x16;

// 非常驻属性
pub const ATTR_LOWEST_VCN: usize = 0x10;
pub const ATTR_HIGHEST_VCN: usize = 0x18;
pub const ATTR_MAPPING_PAIRS_OFFSET: usize = 0x20;
pub const ATTR_COMPRESSION_UNIT: usize = 0x22;
pub const ATTR_ALLOCATED_SIZE: usize = 0x28;
pub const ATTR_DATA_SIZE: usize = 0x30;
pub const ATTR_INITIALIZED_SIZE: usize = 0x38;
pub const ATTR_COMPRESSED_SIZE: usize = 0x40;

/// 常驻属性头大小
pub const ATTR_RESIDENT_HEADER_SIZE: usize = 0x18;
/// 非常驻属性头大小（无压缩大小字段）
pub const ATTR_NON_RESIDENT_HEADER_SIZE: usize = 0x40;
/// 非常驻属性头大小（压缩/稀疏）
pub const ATTR_NON_RESIDENT_COMPRESSED_HEADER_SIZE: usize = 0x48;

//=============================================================================
// 属性值布局
//=============================================================================

/// NTFS 1.2 标准信息大小
pub const STANDARD_INFORMATION_V1_SIZE: usize = 48;
/// NTFS 3.x 标准信息大小
pub const STANDARD_INFORMATION_V3_SIZE: usize = 72;

pub const SI_CREATION_TIME: usize = 0x00;
pub const SI_LAST_DATA_CHANGE_TIME: usize = 0x08;
pub const SI_LAST_MFT_CHANGE_TIME: usize = 0x10;
pub const SI_LAST_ACCESS_TIME: usize = 0x18;
pub const SI_FILE_ATTRIBUTES: usize = 0x20;

pub const FN_PARENT_DIRECTORY: usize = 0x00;
pub const FN_ALLOCATED_SIZE: usize = 0x28;
pub const FN_DATA_SIZE: usize = 0x30;
pub const FN_FILE_ATTRIBUTES: usize = 0x38;
pub const FN_FILE_NAME_LENGTH: usize = 0x40;
pub const FN_FILE_NAME_TYPE: usize = 0x41;
/// 文件名属性固定部分大小
pub const FILE_NAME_HEADER_SIZE: usize = 0x42;

pub const AL_TYPE: usize = 0x00;
pub const AL_LENGTH: usize = 0x04;
pub const AL_NAME_LENGTH: usize = 0x06;
pub const AL_NAME_OFFSET: usize = 0x07;
pub const AL_LOWEST_VCN: usize = 0x08;
pub const AL_MFT_REFERENCE: usize = 0x10;
pub const AL_INSTANCE: usize = 0x18;
/// 属性列表项固定部分大小
pub const ATTR_LIST_ENTRY_HEADER_SIZE: usize = 0x1A;

pub const IR_TYPE: usize = 0x00;
pub const IR_COLLATION_RULE: usize = 0x04;
pub const IR_INDEX_BLOCK_SIZE: usize = 0x08;
pub const IR_CLUSTERS_PER_INDEX_BLOCK: usize = 0x0C;
pub const IR_INDEX_HEADER: usize = 0x10;
pub const IH_ENTRIES_OFFSET: usize = 0x00;
pub const IH_INDEX_LENGTH: usize = 0x04;
pub const IH_ALLOCATED_SIZE: usize = 0x08;
pub const IH_FLAGS: usize = 0x0C;
/// 索引根固定部分大小（索引根 + 索引头）
pub const INDEX_ROOT_HEADER_SIZE: usize = 0x20;

/// 索引头标志：存在 $INDEX_ALLOCATION
pub const LARGE_INDEX: u8 = 0x01;

//=============================================================================
// 排序规则
//=============================================================================

pub const COLLATION_BINARY: u32 = 0x00;
pub const COLLATION_FILE_NAME: u32 = 0x01;
pub const COLLATION_UNICODE_STRING: u32 = 0x02;
pub const COLLATION_NTOFS_ULONG: u32 = 0x10;
pub const COLLATION_NTOFS_SID: u32 = 0x11;
pub const COLLATION_NTOFS_SECURITY_HASH: u32 = 0x12;
pub const COLLATION_NTOFS_ULONGS: u32 = 0x13;

/// 检查排序规则是否受支持
pub fn is_collation_rule_supported(rule: u32) -> bool {
    matches!(
        rule,
        COLLATION_BINARY
            | COLLATION_FILE_NAME
            | COLLATION_UNICODE_STRING
            | COLLATION_NTOFS_ULONG
            | COLLATION_NTOFS_SID
            | COLLATION_NTOFS_SECURITY_HASH
            | COLLATION_NTOFS_ULONGS
    )
}

//=============================================================================
// POSIX 模式位
//=============================================================================

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IRWXUGO: u32 = 0o777;
pub const S_IWUGO: u32 = 0o222;
