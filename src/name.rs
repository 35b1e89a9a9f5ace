//! 属性名称与名称比较
//!
//! NTFS 的属性名是 UTF-16 序列。解析层只需要两件事：
//! - 三个进程级常量名（目录索引名 `$I30` 与两个 macOS 兼容流名），
//!   它们以 `Cow::Borrowed` 形式共享，永远不会被释放
//! - 按卷的大小写规则比较名称（区分大小写或借助 upcase 表忽略大小写）

use crate::error::Result;
use alloc::borrow::Cow;
use alloc::vec::Vec;
use byteorder::{ByteOrder, LittleEndian};
use core::cmp::Ordering;

/// 属性名：常量名借用，其余名称独立分配
pub type AttrName = Cow<'static, [u16]>;

const fn utf16_lit<const N: usize>(s: &str) -> [u16; N] {
    let bytes = s.as_bytes();
    assert!(bytes.len() == N);
    let mut out = [0u16; N];
    let mut i = 0;
    while i < N {
        out[i] = bytes[i] as u16;
        i += 1;
    }
    out
}

/// 目录索引名 `$I30`
pub static I30: [u16; 4] = utf16_lit("$I30");

/// Finder 信息流名 `AFP_AfpInfo`
pub static AFP_AFP_INFO: [u16; 11] = utf16_lit("AFP_AfpInfo");

/// 资源分支流名 `com.apple.ResourceFork`
pub static AFP_RESOURCE: [u16; 22] = utf16_lit("com.apple.ResourceFork");

/// 将名称转换为 [`AttrName`]
///
/// 与常量名逐字相同的名称直接借用常量，其余名称复制一份。
pub fn intern(name: &[u16]) -> Result<AttrName> {
    if name.is_empty() {
        return Ok(Cow::Borrowed(&[]));
    }
    for constant in [&I30[..], &AFP_AFP_INFO[..], &AFP_RESOURCE[..]] {
        if constant == name {
            return Ok(Cow::Borrowed(constant));
        }
    }
    let mut owned = Vec::new();
    owned.try_reserve_exact(name.len())?;
    owned.extend_from_slice(name);
    Ok(Cow::Owned(owned))
}

/// 名称是否为进程级常量（不可释放）
pub fn is_constant(name: &AttrName) -> bool {
    matches!(name, Cow::Borrowed(_))
}

/// 从小端字节读取 UTF-16 名称
pub fn name_from_le_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(LittleEndian::read_u16).collect()
}

/// 名称的可打印形式（仅用于日志）
pub fn display(name: &[u16]) -> alloc::string::String {
    alloc::string::String::from_utf16_lossy(name)
}

/// 卷的 upcase 表
///
/// 卷提供 $UpCase 内容时使用该表，否则退回到 Unicode 简单大写映射
/// （只接受 BMP 内一对一的映射）。
#[derive(Debug, Clone, Default)]
pub struct Upcase {
    table: Option<Vec<u16>>,
}

impl Upcase {
    /// 使用卷提供的 upcase 表
    pub fn from_table(table: Vec<u16>) -> Self {
        Self { table: Some(table) }
    }

    /// 单个 UTF-16 单元的大写形式
    pub fn upcase(&self, c: u16) -> u16 {
        if let Some(table) = &self.table {
            return table.get(c as usize).copied().unwrap_or(c);
        }
        let Some(ch) = char::from_u32(c as u32) else {
            return c;
        };
        let mut upper = ch.to_uppercase();
        match (upper.next(), upper.next()) {
            (Some(u), None) if (u as u32) < 0x1_0000 => u as u16,
            _ => c,
        }
    }
}

/// 卷的名称排序规则
#[derive(Debug, Clone, Default)]
pub struct NameCollation {
    /// 是否区分大小写
    pub case_sensitive: bool,
    /// upcase 表
    pub upcase: Upcase,
}

impl NameCollation {
    /// 创建排序规则
    pub fn new(case_sensitive: bool, upcase: Upcase) -> Self {
        Self { case_sensitive, upcase }
    }

    /// 按卷规则判断两个名称是否相等
    pub fn equal(&self, a: &[u16], b: &[u16]) -> bool {
        if a.len() != b.len() {
            return false;
        }
        if self.case_sensitive {
            return a == b;
        }
        a.iter()
            .zip(b)
            .all(|(&x, &y)| x == y || self.upcase.upcase(x) == self.upcase.upcase(y))
    }

    /// 按 NTFS 属性排序规则比较名称
    ///
    /// 先忽略大小写比较，相同时再按原始值比较，与属性在记录中的排序一致。
    pub fn collate(&self, a: &[u16], b: &[u16]) -> Ordering {
        let folded = a
            .iter()
            .map(|&c| self.upcase.upcase(c))
            .cmp(b.iter().map(|&c| self.upcase.upcase(c)));
        folded.then_with(|| a.cmp(b))
    }
}
