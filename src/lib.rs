//! ntfs_inode_core: NTFS inode 与属性解析、缓存引擎
//!
//! 把 MFT 中的文件记录及其属性解析成内存中的 inode 对象，并以
//! `(mft_no, type, name)` 为身份做全局去重缓存：
//! - **基本 inode**：一个文件记录，承载标准信息、链接数、默认 `$DATA` 或 `$I30` 索引
//! - **属性 inode**：命名流、索引分配等非默认属性，挂接在基本 inode 下
//! - **扩展 inode**：基本记录溢出的扩展记录，只服务于属性列表查找
//!
//! 所有入口都是 [`NtfsVolume`] 的方法；没有全局状态。
//!
//! # 示例
//!
//! ```rust,ignore
//! use ntfs_inode_core::{InodeFlags, LockMode, NtfsDevice, NtfsVolume, VolumeConfig, Result};
//! use ntfs_inode_core::name::I30;
//!
//! struct MyDisk { /* ... */ }
//!
//! impl NtfsDevice for MyDisk {
//!     // 实现记录与簇读写
//! }
//!
//! fn main() -> Result<()> {
//!     let vol = NtfsVolume::new(MyDisk::open(), VolumeConfig::default())?;
//!
//!     // 根目录
//!     let root = vol.resolve_base(5, LockMode::Shared)?;
//!     assert!(root.flags().contains(InodeFlags::DIRECTORY));
//!
//!     // 根目录的 $I30 索引分配
//!     let index = vol.resolve_index(&root, &I30)?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`device`] - 设备抽象、MFT 记录映射
//! - [`record`] - 磁盘上的记录与属性格式
//! - [`runlist`] - 映射对解码与运行列表
//! - [`inode`] - inode 对象、锁与身份键
//! - [`hash`] - 身份哈希表
//! - [`volume`] - 卷上下文与配置
//! - [`resolve`] - 基本/属性/扩展 inode 的解析
//! - [`lifecycle`] - 回收、排空与删除

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 磁盘数据类型
pub mod types;

/// 属性名与名字比较
pub mod name;

/// MFT 记录与属性格式
pub mod record;

/// 运行列表
pub mod runlist;

/// MFT 记录缓存
pub mod cache;

/// 设备抽象
pub mod device;

/// inode 对象模型
pub mod inode;

/// 身份哈希表
pub mod hash;

/// 卷上下文
pub mod volume;

/// inode 解析
pub mod resolve;

/// 回收与删除
pub mod lifecycle;

#[cfg(test)]
mod test_utils;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 设备
pub use device::{MftRecordRef, NtfsDevice, RecordDev};

// 数据类型
pub use types::{CreateOptions, LockMode, MftRef, NtfsTime};

// inode
pub use inode::{AttrKey, InodeFlags, InodeGuard, InodeKind, InodeState, NtfsInode, SizeTriple};

// 哈希表
pub use hash::InodeHash;

// 卷
pub use volume::{NoVnodeHost, NtfsVolume, VnodeHost, VolumeConfig, VolumeStats};

// 属性列表
pub use resolve::{find_listed_records, ListedRecord};
