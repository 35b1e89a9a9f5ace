//! inode 对象模型
//!
//! - inode/key.rs 身份键 [`AttrKey`]
//! - inode/lock.rs 显式加解锁的主读写锁 [`InodeLock`]
//! - inode/object.rs [`NtfsInode`]：基本/属性/扩展三种角色共用的对象，
//!   生命周期状态、能力标志、大小三元组、挂接数组
//! - inode/guard.rs 解析结果 [`InodeGuard`]，drop 时释放持有的锁

mod guard;
mod key;
mod lock;
mod object;

pub use guard::InodeGuard;
pub use key::AttrKey;
pub use lock::{HeldLock, InodeLock};
pub use object::{
    CompressionInfo, IndexInfo, InodeFlags, InodeHandle, InodeInfo, InodeKind, InodeState,
    NtfsInode, SizeTriple,
};
