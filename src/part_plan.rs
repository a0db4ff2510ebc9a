use super::{ErrorKind, ObjectStorageError, ObjectStorageResult};
use serde::{Deserialize, Serialize};
use std::{
    num::{NonZeroU64, NonZeroUsize},
    ops::Deref,
};

/// 分片大小
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartSize(NonZeroU64);

impl PartSize {
    /// 创建分片大小，分片大小为 0 时返回 [`None`]
    #[inline]
    pub fn new(part_size: u64) -> Option<Self> {
        NonZeroU64::new(part_size).map(Self)
    }

    #[inline]
    pub fn as_non_zero_u64(&self) -> NonZeroU64 {
        self.0
    }

    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.as_non_zero_u64().get()
    }
}

impl Default for PartSize {
    #[inline]
    fn default() -> Self {
        Self(NonZeroU64::new(1 << 22).unwrap())
    }
}

impl From<NonZeroU64> for PartSize {
    #[inline]
    fn from(size: NonZeroU64) -> Self {
        Self(size)
    }
}

impl From<PartSize> for u64 {
    #[inline]
    fn from(size: PartSize) -> Self {
        size.as_u64()
    }
}

impl TryFrom<u64> for PartSize {
    type Error = ObjectStorageError;

    #[inline]
    fn try_from(part_size: u64) -> ObjectStorageResult<Self> {
        Self::new(part_size).ok_or_else(|| {
            ObjectStorageError::new_with_msg(ErrorKind::InvalidConfiguration, "part size must be positive")
        })
    }
}

impl Deref for PartSize {
    type Target = NonZeroU64;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// 分片
///
/// 源文件中一段连续的字节区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    part_number: NonZeroUsize,
    offset: u64,
    len: u64,
}

impl Part {
    /// 获取分片编号，从 1 开始
    #[inline]
    pub fn part_number(&self) -> NonZeroUsize {
        self.part_number
    }

    /// 获取分片在源文件中的起始位置
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 获取分片长度
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 获取分片结束位置（不包含）
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// 分片计划
///
/// 根据文件长度和分片大小计算得出，不会被持久化。
/// 长度为 0 的文件不会产生任何分片。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    file_length: u64,
    part_size: PartSize,
    parts: Vec<Part>,
}

impl PartPlan {
    /// 计算分片计划
    ///
    /// 分片大小为 0 时返回 [`ErrorKind::InvalidConfiguration`] 错误
    pub fn new(file_length: u64, part_size: u64) -> ObjectStorageResult<Self> {
        Ok(Self::with_part_size(file_length, PartSize::try_from(part_size)?))
    }

    /// 使用非零分片大小计算分片计划
    pub fn with_part_size(file_length: u64, part_size: PartSize) -> Self {
        let size = part_size.as_u64();
        let mut part_count = file_length / size;
        if file_length % size != 0 {
            part_count += 1;
        }
        let parts = (0..part_count)
            .map(|index| {
                let offset = index * size;
                let len = if index + 1 == part_count {
                    file_length - offset
                } else {
                    size
                };
                Part {
                    part_number: NonZeroUsize::MIN.saturating_add(index as usize),
                    offset,
                    len,
                }
            })
            .collect();
        Self {
            file_length,
            part_size,
            parts,
        }
    }

    #[inline]
    pub fn file_length(&self) -> u64 {
        self.file_length
    }

    #[inline]
    pub fn part_size(&self) -> PartSize {
        self.part_size
    }

    #[inline]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    #[inline]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl<'a> IntoIterator for &'a PartPlan {
    type Item = &'a Part;
    type IntoIter = std::slice::Iter<'a, Part>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}
