//! 合并引擎 - 纯函数
//!
//! 把同一用户的本地副本与远端副本合并为一个收敛结果，无副作用、不会失败。
//!
//! - 书架：按 title_id 去重，键冲突时远端优先（远端是多设备的权威副本）
//! - 阅读进度：章节集合取并集，章节百分比逐键取最大，总章节数取最大，
//!   展示字段取 updated_at 较新的一侧（相等时取远端）

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::storage::{Bookmark, ReadingProgress};

/// 合并书架，结果按 added_at 降序（相同时按 title_id 升序）
pub fn merge_bookmarks(local: &[Bookmark], remote: &[Bookmark]) -> Vec<Bookmark> {
    let mut by_title: HashMap<&str, &Bookmark> = HashMap::with_capacity(local.len() + remote.len());

    for bookmark in remote {
        by_title.insert(bookmark.title_id.as_str(), bookmark);
    }
    for bookmark in local {
        by_title.entry(bookmark.title_id.as_str()).or_insert(bookmark);
    }

    let mut merged: Vec<Bookmark> = by_title.into_values().cloned().collect();
    merged.sort_by(bookmark_order);
    merged
}

/// 合并阅读进度，结果按 updated_at 降序（相同时按 title_id 升序）
pub fn merge_progress(local: &[ReadingProgress], remote: &[ReadingProgress]) -> Vec<ReadingProgress> {
    let local_map: HashMap<&str, &ReadingProgress> =
        local.iter().map(|p| (p.title_id.as_str(), p)).collect();
    let remote_map: HashMap<&str, &ReadingProgress> =
        remote.iter().map(|p| (p.title_id.as_str(), p)).collect();

    let mut merged: Vec<ReadingProgress> = Vec::with_capacity(local_map.len() + remote_map.len());

    for (title_id, remote_record) in &remote_map {
        match local_map.get(title_id) {
            Some(local_record) => merged.push(merge_progress_record(local_record, remote_record)),
            None => merged.push((*remote_record).clone()),
        }
    }
    for (title_id, local_record) in &local_map {
        if !remote_map.contains_key(title_id) {
            merged.push((*local_record).clone());
        }
    }

    merged.sort_by(progress_order);
    merged
}

/// 合并同一 title_id 的两条进度记录
pub fn merge_progress_record(local: &ReadingProgress, remote: &ReadingProgress) -> ReadingProgress {
    // 展示字段的来源：updated_at 更大者，相等取远端
    let newer = if local.updated_at > remote.updated_at {
        local
    } else {
        remote
    };

    let mut chapters_read = remote.chapters_read.clone();
    chapters_read.extend(local.chapters_read.iter().cloned());

    let mut chapter_progress = remote.chapter_progress.clone();
    for (chapter_id, &percent) in &local.chapter_progress {
        chapter_progress
            .entry(chapter_id.clone())
            .and_modify(|current| *current = (*current).max(percent))
            .or_insert(percent);
    }

    let total_chapters = match (local.total_chapters, remote.total_chapters) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).max(b.unwrap_or(0))),
    };

    ReadingProgress {
        title_id: newer.title_id.clone(),
        display_title: newer.display_title.clone(),
        cover_image: newer.cover_image.clone(),
        last_chapter_id: newer.last_chapter_id.clone(),
        last_chapter_title: newer.last_chapter_title.clone(),
        chapters_read,
        chapter_progress,
        total_chapters,
        updated_at: local.updated_at.max(remote.updated_at),
    }
}

/// 需要推送到远端的书架：合并结果中远端没有的
pub fn local_only_bookmarks(merged: &[Bookmark], remote: &[Bookmark]) -> Vec<Bookmark> {
    let remote_keys: std::collections::HashSet<&str> =
        remote.iter().map(|b| b.title_id.as_str()).collect();
    merged
        .iter()
        .filter(|b| !remote_keys.contains(b.title_id.as_str()))
        .cloned()
        .collect()
}

/// 需要推送到远端的进度：远端没有的，或合并后与远端副本不同的
pub fn local_only_progress(merged: &[ReadingProgress], remote: &[ReadingProgress]) -> Vec<ReadingProgress> {
    let remote_map: HashMap<&str, &ReadingProgress> =
        remote.iter().map(|p| (p.title_id.as_str(), p)).collect();
    merged
        .iter()
        .filter(|p| match remote_map.get(p.title_id.as_str()) {
            None => true,
            Some(remote_record) => *remote_record != *p,
        })
        .cloned()
        .collect()
}

fn bookmark_order(a: &Bookmark, b: &Bookmark) -> Ordering {
    b.added_at
        .cmp(&a.added_at)
        .then_with(|| a.title_id.cmp(&b.title_id))
}

fn progress_order(a: &ReadingProgress, b: &ReadingProgress) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.title_id.cmp(&b.title_id))
}
