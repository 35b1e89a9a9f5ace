//! 错误类型定义
//!
//! 提供 NTFS inode 解析层的错误类型。

use core::fmt;

/// NTFS 操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 文件系统损坏（磁盘结构违反不变量）
    Corrupted,
    /// 文件不存在（或已被删除）
    NotFound,
    /// 已存在
    AlreadyExists,
    /// 空间不足（MFT 记录已满）
    NoSpace,
    /// 已识别但不支持的磁盘特性
    Unsupported,
    /// 内存不足
    OutOfMemory,
    /// base inode 在挂接属性 inode 时已被并发删除
    DeadlockAvoided,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 是否为磁盘损坏
    pub fn is_corruption(&self) -> bool {
        self.kind == ErrorKind::Corrupted
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Error::new(ErrorKind::OutOfMemory, "Allocation failed")
    }
}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
