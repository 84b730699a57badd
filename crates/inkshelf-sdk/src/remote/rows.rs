//! 远端行结构（snake_case 列）与本地实体之间的转换
//!
//! 远端数据逐行解码：单行缺字段或非法时跳过并记录日志，不影响其余行。

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{InkshelfSDKError, Result};
use crate::storage::{clamp_percent, Bookmark, ReadingProgress};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkRow {
    pub user_id: String,
    pub title_id: String,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
    pub added_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    pub title_id: String,
    #[serde(default)]
    pub display_title: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub last_chapter_id: Option<String>,
    #[serde(default)]
    pub last_chapter_title: Option<String>,
    #[serde(default)]
    pub chapters_read: Vec<String>,
    /// 远端可能存成任意整数，入库前收敛到 0..=100
    #[serde(default)]
    pub chapter_progress: BTreeMap<String, i64>,
    #[serde(default)]
    pub total_chapters: Option<i64>,
    pub updated_at: i64,
}

impl BookmarkRow {
    pub fn from_bookmark(uid: &str, bookmark: &Bookmark) -> Self {
        Self {
            user_id: uid.to_string(),
            title_id: bookmark.title_id.clone(),
            title: bookmark.title.clone(),
            image: bookmark.image.clone(),
            added_at: bookmark.added_at,
        }
    }
}

impl TryFrom<BookmarkRow> for Bookmark {
    type Error = InkshelfSDKError;

    fn try_from(row: BookmarkRow) -> Result<Self> {
        if row.title_id.trim().is_empty() {
            return Err(InkshelfSDKError::InvalidData("bookmark 行缺少 title_id".into()));
        }
        Ok(Bookmark {
            title_id: row.title_id,
            title: row.title,
            image: row.image,
            added_at: row.added_at,
        })
    }
}

impl ProgressRow {
    pub fn from_progress(uid: &str, progress: &ReadingProgress) -> Self {
        Self {
            user_id: uid.to_string(),
            title_id: progress.title_id.clone(),
            display_title: Some(progress.display_title.clone()),
            cover_image: Some(progress.cover_image.clone()),
            last_chapter_id: Some(progress.last_chapter_id.clone()),
            last_chapter_title: Some(progress.last_chapter_title.clone()),
            chapters_read: progress.chapters_read.iter().cloned().collect(),
            chapter_progress: progress
                .chapter_progress
                .iter()
                .map(|(k, v)| (k.clone(), *v as i64))
                .collect(),
            total_chapters: progress.total_chapters.map(i64::from),
            updated_at: progress.updated_at,
        }
    }
}

impl TryFrom<ProgressRow> for ReadingProgress {
    type Error = InkshelfSDKError;

    fn try_from(row: ProgressRow) -> Result<Self> {
        if row.title_id.trim().is_empty() {
            return Err(InkshelfSDKError::InvalidData("reading_progress 行缺少 title_id".into()));
        }
        let chapters_read: BTreeSet<String> = row.chapters_read.into_iter().collect();
        let chapter_progress: BTreeMap<String, u8> = row
            .chapter_progress
            .into_iter()
            .map(|(k, v)| (k, clamp_percent(v)))
            .collect();
        let total_chapters = row
            .total_chapters
            .filter(|t| *t >= 0)
            .map(|t| t.min(u32::MAX as i64) as u32);

        Ok(ReadingProgress {
            title_id: row.title_id,
            display_title: row.display_title.unwrap_or_default(),
            cover_image: row.cover_image.unwrap_or_default(),
            last_chapter_id: row.last_chapter_id.unwrap_or_default(),
            last_chapter_title: row.last_chapter_title.unwrap_or_default(),
            chapters_read,
            chapter_progress,
            total_chapters,
            updated_at: row.updated_at,
        })
    }
}

/// 逐行解码，跳过无法解析或非法的行
pub fn decode_rows<R, T>(table: &str, rows: Vec<serde_json::Value>) -> Vec<T>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = InkshelfSDKError>,
{
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let row: R = match serde_json::from_value(value) {
                Ok(row) => row,
                Err(e) => {
                    warn!("⚠️ 跳过无法解析的 {} 行 #{}: {}", table, index, e);
                    return None;
                }
            };
            match T::try_from(row) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("⚠️ 跳过非法的 {} 行 #{}: {}", table, index, e);
                    None
                }
            }
        })
        .collect();

    if decoded.len() < total {
        warn!("{} 共 {} 行，跳过 {} 行", table, total, total - decoded.len());
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_rows_are_skipped() {
        let rows = vec![
            json!({"user_id": "u1", "title_id": "a", "title": "A", "added_at": 1}),
            json!({"user_id": "u1", "title": "missing id", "added_at": 2}),
            json!({"user_id": "u1", "title_id": "", "title": "blank id", "added_at": 3}),
            json!({"user_id": "u1", "title_id": "b", "title": "B", "image": "cover.jpg", "added_at": 4}),
        ];
        let bookmarks: Vec<Bookmark> = decode_rows::<BookmarkRow, Bookmark>("bookmarks", rows);
        let ids: Vec<&str> = bookmarks.iter().map(|b| b.title_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(bookmarks[1].image.as_deref(), Some("cover.jpg"));
    }

    #[test]
    fn progress_row_values_are_clamped() {
        let rows = vec![json!({
            "user_id": "u1",
            "title_id": "t",
            "chapters_read": ["1", "1", "2"],
            "chapter_progress": {"1": 140, "2": -3, "3": 55},
            "total_chapters": -1,
            "updated_at": 99
        })];
        let progress: Vec<ReadingProgress> = decode_rows::<ProgressRow, ReadingProgress>("reading_progress", rows);
        assert_eq!(progress.len(), 1);
        let p = &progress[0];
        assert_eq!(p.chapters_read.len(), 2);
        assert_eq!(p.percent_for("1"), Some(100));
        assert_eq!(p.percent_for("2"), Some(0));
        assert_eq!(p.percent_for("3"), Some(55));
        assert_eq!(p.total_chapters, None);
        assert_eq!(p.display_title, "");
    }

    #[test]
    fn progress_row_carries_user_key() {
        let mut progress = ReadingProgress::new("tower-of-god", 7);
        progress.raise_chapter_percent("4", 30);
        progress.observe_total_chapters(600);
        let row = ProgressRow::from_progress("u9", &progress);
        assert_eq!(row.user_id, "u9");
        assert_eq!(row.title_id, "tower-of-god");
        assert_eq!(row.chapter_progress.get("4"), Some(&30));

        let back = ReadingProgress::try_from(row).unwrap();
        assert_eq!(back, progress);
    }
}
