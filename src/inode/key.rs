//! inode 身份键

use crate::consts::AT_UNUSED;
use crate::name::{AttrName, NameCollation};
use alloc::borrow::Cow;

/// 身份键：(记录号, 属性类型, 属性名, raw)
///
/// 基本 inode 与扩展 inode 使用 `AT_UNUSED` 且无名称。
/// 键在构造后不再修改，只用于哈希查找。
#[derive(Debug, Clone)]
pub struct AttrKey {
    /// MFT 记录号
    pub mft_no: u64,
    /// 属性类型
    pub ty: u32,
    /// 属性名
    pub name: AttrName,
    /// 是否为 raw 视图
    pub raw: bool,
}

impl AttrKey {
    /// 基本 inode（或扩展 inode）的键
    pub fn base(mft_no: u64) -> Self {
        Self {
            mft_no,
            ty: AT_UNUSED,
            name: Cow::Borrowed(&[]),
            raw: false,
        }
    }

    /// 属性 inode 的键
    pub fn attr(mft_no: u64, ty: u32, name: AttrName, raw: bool) -> Self {
        Self { mft_no, ty, name, raw }
    }

    /// 是否为基本 inode 的键
    pub fn is_base(&self) -> bool {
        self.ty == AT_UNUSED
    }

    /// 哈希桶键（不含名称）
    pub(crate) fn bucket(&self) -> (u64, u32, bool) {
        (self.mft_no, self.ty, self.raw)
    }

    /// 按卷的排序规则比较两个键
    ///
    /// 无名称的键只与无名称的键相等。
    pub fn matches(&self, other: &AttrKey, collation: &NameCollation) -> bool {
        if self.bucket() != other.bucket() {
            return false;
        }
        if self.is_base() {
            return true;
        }
        collation.equal(&self.name, &other.name)
    }
}
