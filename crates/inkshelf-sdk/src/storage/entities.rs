//! 数据实体定义
//!
//! 本地持久化使用 camelCase 字段名；远端行结构见 `remote::rows`。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 书架收藏 - 每个用户每个 title_id 至多一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub title_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// 毫秒时间戳
    pub added_at: i64,
}

impl Bookmark {
    pub fn new(title_id: impl Into<String>, title: impl Into<String>, added_at: i64) -> Self {
        Self {
            title_id: title_id.into(),
            title: title.into(),
            image: None,
            added_at,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// 单部作品的阅读进度
///
/// `chapters_read` 只增不减，`chapter_progress` 每章只升不降；
/// 合并规则见 `sync::merge::merge_progress`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub title_id: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub last_chapter_id: String,
    #[serde(default)]
    pub last_chapter_title: String,
    #[serde(default)]
    pub chapters_read: BTreeSet<String>,
    /// chapter_id -> 百分比 (0..=100)
    #[serde(default)]
    pub chapter_progress: BTreeMap<String, u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chapters: Option<u32>,
    /// 最后一次修改的毫秒时间戳
    pub updated_at: i64,
}

impl ReadingProgress {
    pub fn new(title_id: impl Into<String>, updated_at: i64) -> Self {
        Self {
            title_id: title_id.into(),
            display_title: String::new(),
            cover_image: String::new(),
            last_chapter_id: String::new(),
            last_chapter_title: String::new(),
            chapters_read: BTreeSet::new(),
            chapter_progress: BTreeMap::new(),
            total_chapters: None,
            updated_at,
        }
    }

    /// 某章已保存的百分比，未读过返回 None
    pub fn percent_for(&self, chapter_id: &str) -> Option<u8> {
        self.chapter_progress.get(chapter_id).copied()
    }

    /// 抬高某章进度（只升不降），返回是否发生变化
    pub fn raise_chapter_percent(&mut self, chapter_id: &str, percent: u8) -> bool {
        let percent = clamp_percent(percent as i64);
        match self.chapter_progress.get_mut(chapter_id) {
            Some(current) if *current >= percent => false,
            Some(current) => {
                *current = percent;
                true
            }
            None => {
                self.chapter_progress.insert(chapter_id.to_string(), percent);
                true
            }
        }
    }

    /// 标记章节已读（幂等）
    pub fn mark_chapter_read(&mut self, chapter_id: &str) -> bool {
        self.chapters_read.insert(chapter_id.to_string())
    }

    pub fn is_chapter_read(&self, chapter_id: &str) -> bool {
        self.chapters_read.contains(chapter_id)
    }

    /// 更新已知总章节数（只取更大值）
    pub fn observe_total_chapters(&mut self, total: u32) {
        self.total_chapters = Some(self.total_chapters.map_or(total, |t| t.max(total)));
    }
}

/// 把任意整数收敛到 0..=100
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_percent_only_rises() {
        let mut progress = ReadingProgress::new("tower-of-god", 1);
        assert!(progress.raise_chapter_percent("12", 40));
        assert!(!progress.raise_chapter_percent("12", 35));
        assert!(progress.raise_chapter_percent("12", 80));
        assert_eq!(progress.percent_for("12"), Some(80));
        assert_eq!(progress.percent_for("13"), None);
    }

    #[test]
    fn mark_chapter_read_is_idempotent() {
        let mut progress = ReadingProgress::new("tower-of-god", 1);
        assert!(progress.mark_chapter_read("1"));
        assert!(!progress.mark_chapter_read("1"));
        assert_eq!(progress.chapters_read.len(), 1);
    }

    #[test]
    fn total_chapters_never_decreases() {
        let mut progress = ReadingProgress::new("omniscient-reader", 1);
        progress.observe_total_chapters(120);
        progress.observe_total_chapters(80);
        assert_eq!(progress.total_chapters, Some(120));
    }

    #[test]
    fn persisted_json_uses_camel_case() {
        let bookmark = Bookmark::new("solo-leveling", "Solo Leveling", 1_700_000_000_000);
        let json = serde_json::to_value(&bookmark).unwrap();
        assert_eq!(json["titleId"], "solo-leveling");
        assert_eq!(json["addedAt"], 1_700_000_000_000i64);
        assert!(json.get("image").is_none());
    }

    #[test]
    fn clamp_percent_bounds() {
        assert_eq!(clamp_percent(-4), 0);
        assert_eq!(clamp_percent(57), 57);
        assert_eq!(clamp_percent(140), 100);
    }
}
