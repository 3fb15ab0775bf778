//! 按内容类别区分的读取上限与成功下限。

use super::models::ContentCategory;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryLimits {
    /// 累计字节达到此值即停止读取；内容从不使用，只限制内存与时长
    pub ceiling: u64,
    /// 低于此值视为握手残留而非真实流数据
    pub min_success: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdTable {
    pub video: CategoryLimits,
    pub other: CategoryLimits,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            video: CategoryLimits {
                ceiling: 5 * MIB,
                min_success: 8 * KIB,
            },
            other: CategoryLimits {
                ceiling: 3 * MIB,
                min_success: 2 * KIB,
            },
        }
    }
}

impl ThresholdTable {
    pub fn limits(&self, category: ContentCategory) -> CategoryLimits {
        match category {
            ContentCategory::Video => self.video,
            ContentCategory::Other => self.other,
        }
    }

    pub fn is_success(&self, category: ContentCategory, bytes: u64, chunks: u64) -> bool {
        bytes >= self.limits(category).min_success && chunks >= 1
    }
}
