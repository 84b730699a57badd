//! 同步编排器
//!
//! 每个用户一个状态机：`Idle → Pulling → Merging → Persisting → Pushing → Idle`。
//! 书架与阅读进度两个子流程互相独立，一个失败不影响另一个。
//!
//! ## 并发
//!
//! 同一用户的所有操作（full_sync 与单条修改）经过同一把异步锁串行执行：
//! 第二个 full_sync 会等待第一个结束，再基于最新快照执行。
//!
//! ## NOTE: 编排器不做重试
//!
//! 远端失败只汇报，不重试；重试与退避由 `SyncScheduler` 负责。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::merge::{local_only_bookmarks, local_only_progress, merge_bookmarks, merge_progress};
use super::optimistic::{MutationOutcome, OptimisticMutation};
use super::{EntityType, FlowReport, SyncFailureReason, SyncResult, SyncState};
use crate::error::{InkshelfSDKError, Result};
use crate::events::{event_builders, EventManager};
use crate::remote::RemoteStore;
use crate::sdk::SyncConfig;
use crate::storage::{clamp_percent, Bookmark, LocalStore, ReadingProgress};
use crate::utils::time::{millis_since, now_utc_millis};

/// 推送阶段的并发上限
const PUSH_CONCURRENCY: usize = 4;

/// 编排器依赖（显式注入，无全局单例）
#[derive(Clone)]
pub struct SyncContext {
    pub local: Arc<dyn LocalStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub events: Arc<EventManager>,
    pub config: SyncConfig,
}

/// 阅读进度跟踪器提交的一次章节进度
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChapterProgressUpdate {
    pub title_id: String,
    pub chapter_id: String,
    pub chapter_title: Option<String>,
    pub display_title: Option<String>,
    pub cover_image: Option<String>,
    pub total_chapters: Option<u32>,
    /// 0..=100
    pub percent: u8,
    /// 达到完成阈值
    pub completed: bool,
    /// 是否需要推送到远端（节流后的结果）
    pub push_remote: bool,
}

/// 同步编排器
pub struct SyncOrchestrator {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    events: Arc<EventManager>,
    config: SyncConfig,
    /// 同步锁（每个用户一个锁，防止并发修改本地副本）
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    states: parking_lot::RwLock<HashMap<String, SyncState>>,
}

impl SyncOrchestrator {
    pub fn new(context: SyncContext) -> Self {
        Self {
            local: context.local,
            remote: context.remote,
            events: context.events,
            config: context.config,
            user_locks: Mutex::new(HashMap::new()),
            states: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    /// 当前状态
    pub fn state(&self, uid: &str) -> SyncState {
        self.states.read().get(uid).cloned().unwrap_or_default()
    }

    /// 调度器取消一轮同步后把状态拉回 Idle
    ///
    /// 持有用户锁执行：若另一个 full_sync 正在进行，等它结束后状态已是终态，不再改写。
    pub(crate) async fn reset_state(&self, uid: &str) {
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;
        if self.state(uid) != SyncState::Idle {
            self.transition(uid, SyncState::Idle).await;
        }
    }

    async fn user_lock(&self, uid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(uid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn transition(&self, uid: &str, new_state: SyncState) {
        let old_state = {
            let mut states = self.states.write();
            let old = states.get(uid).cloned().unwrap_or_default();
            if old == new_state {
                return;
            }
            states.insert(uid.to_string(), new_state.clone());
            old
        };
        debug!("同步状态 {}: {:?} -> {:?}", uid, old_state, new_state);
        self.events
            .emit(event_builders::sync_state_changed(uid, old_state, new_state))
            .await;
    }

    /// 远端调用统一加超时，超时与其他远端错误走同一条失败路径
    async fn remote_call<T, F>(&self, label: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let timeout = Duration::from_secs(self.config.remote_timeout_secs);
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(InkshelfSDKError::Timeout(format!(
                "{} 超过 {}s 未返回",
                label, self.config.remote_timeout_secs
            ))),
        }
    }

    /// 并发推送差量，返回失败列表
    async fn push_all(
        &self,
        calls: Vec<BoxFuture<'_, Result<()>>>,
        report: &mut FlowReport,
    ) -> Vec<InkshelfSDKError> {
        let results: Vec<Result<()>> = stream::iter(calls)
            .buffer_unordered(PUSH_CONCURRENCY)
            .collect()
            .await;

        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(()) => report.pushed += 1,
                Err(e) => failures.push(e),
            }
        }
        failures
    }

    // ========== 全量同步 ==========

    /// 拉取 → 合并 → 落本地 → 推送差量
    ///
    /// 不返回 Err：子流程失败体现在 `SyncResult` 中。两个子流程都成功才写 lastSyncAt。
    pub async fn full_sync(&self, uid: &str) -> SyncResult {
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;

        info!("🔄 开始同步: user={}", uid);

        let bookmarks = self.run_flow(uid, EntityType::Bookmark).await;
        let progress = self.run_flow(uid, EntityType::ReadingProgress).await;

        let mut result = SyncResult {
            bookmarks,
            progress,
            synced_at: None,
        };

        if result.is_success() {
            let now = now_utc_millis();
            match self.local.set_last_sync_at(uid, now).await {
                Ok(()) => result.synced_at = Some(now),
                Err(e) => warn!("⚠️ 写入 lastSyncAt 失败: {}", e),
            }
            self.transition(uid, SyncState::Idle).await;
            info!(
                "✅ 同步完成: user={}, bookmarks={}, progress={}",
                uid,
                result.bookmarks_synced(),
                result.progress_synced()
            );
        } else {
            warn!("⚠️ 同步部分失败: user={}, errors={:?}", uid, result.errors());
        }

        self.events
            .emit(event_builders::sync_completed(uid, result.clone()))
            .await;
        // 失败已记入结果，本地副本未被破坏，回到 Idle 等待下次同步
        self.transition(uid, SyncState::Idle).await;
        result
    }

    async fn run_flow(&self, uid: &str, entity_type: EntityType) -> FlowReport {
        // 上一个子流程失败后先回到 Idle
        if matches!(self.state(uid), SyncState::Error { .. }) {
            self.transition(uid, SyncState::Idle).await;
        }

        let mut report = FlowReport::default();
        let outcome = match entity_type {
            EntityType::Bookmark => self.sync_bookmarks(uid, &mut report).await,
            EntityType::ReadingProgress => self.sync_progress(uid, &mut report).await,
        };

        if let Err(e) = outcome {
            warn!("⚠️ {} 同步失败: {}", entity_type, e);
            report.error = Some(e.to_string());
            report.reason = Some(SyncFailureReason::from(&e));
            self.transition(uid, SyncState::Error { error: e.to_string() })
                .await;
        }
        report
    }

    async fn sync_bookmarks(&self, uid: &str, report: &mut FlowReport) -> Result<()> {
        self.transition(uid, SyncState::Pulling).await;
        let pending = self.retry_pending_deletes(uid).await?;
        let mut remote = self
            .remote_call("fetch_bookmarks", self.remote.fetch_bookmarks(uid))
            .await?;
        // 仍未删掉的远端行不能参与合并，否则会把已移出的书签带回本地
        remote.retain(|b| !pending.contains(&b.title_id));
        let local = self.local.load_bookmarks(uid).await?;

        self.transition(uid, SyncState::Merging).await;
        let merged = merge_bookmarks(&local, &remote);
        let delta = local_only_bookmarks(&merged, &remote);

        self.transition(uid, SyncState::Persisting).await;
        self.local.save_bookmarks(uid, &merged).await?;
        report.merged = merged.len();

        self.transition(uid, SyncState::Pushing).await;
        let mut calls: Vec<BoxFuture<'_, Result<()>>> = Vec::with_capacity(delta.len());
        for bookmark in &delta {
            calls.push(Box::pin(self.remote_call(
                "upsert_bookmark",
                self.remote.upsert_bookmark(uid, bookmark),
            )));
        }
        let failures = self.push_all(calls, report).await;
        debug!("书架: 本地 {} / 远端 {} / 合并 {} / 推送 {}", local.len(), remote.len(), merged.len(), delta.len());
        push_failures(delta.len(), failures)
    }

    /// 重试上次失败的远端删除，返回仍未删掉的 title_id
    async fn retry_pending_deletes(&self, uid: &str) -> Result<Vec<String>> {
        let pending = self.local.load_pending_deletes(uid).await?;
        if pending.is_empty() {
            return Ok(pending);
        }
        let mut remaining = Vec::new();
        for title_id in pending {
            let deleted = self
                .remote_call("delete_bookmark", self.remote.delete_bookmark(uid, &title_id))
                .await;
            if let Err(e) = deleted {
                debug!("书签 {} 远端删除仍失败: {}", title_id, e);
                remaining.push(title_id);
            }
        }
        self.local.save_pending_deletes(uid, &remaining).await?;
        Ok(remaining)
    }

    /// 更新待删除列表；调用方持有用户锁
    async fn mark_pending_delete(&self, uid: &str, title_id: &str, pending: bool) -> Result<()> {
        let mut ids = self.local.load_pending_deletes(uid).await?;
        let present = ids.iter().any(|id| id == title_id);
        match (pending, present) {
            (true, false) => ids.push(title_id.to_string()),
            (false, true) => ids.retain(|id| id != title_id),
            _ => return Ok(()),
        }
        self.local.save_pending_deletes(uid, &ids).await
    }

    async fn sync_progress(&self, uid: &str, report: &mut FlowReport) -> Result<()> {
        self.transition(uid, SyncState::Pulling).await;
        let remote = self
            .remote_call("fetch_progress", self.remote.fetch_progress(uid))
            .await?;
        let local = self.local.load_progress(uid).await?;

        self.transition(uid, SyncState::Merging).await;
        let merged = merge_progress(&local, &remote);
        let delta = local_only_progress(&merged, &remote);

        self.transition(uid, SyncState::Persisting).await;
        self.local.save_progress(uid, &merged).await?;
        report.merged = merged.len();

        self.transition(uid, SyncState::Pushing).await;
        let mut calls: Vec<BoxFuture<'_, Result<()>>> = Vec::with_capacity(delta.len());
        for progress in &delta {
            calls.push(Box::pin(self.remote_call(
                "upsert_progress",
                self.remote.upsert_progress(uid, progress),
            )));
        }
        let failures = self.push_all(calls, report).await;
        debug!("阅读进度: 本地 {} / 远端 {} / 合并 {} / 推送 {}", local.len(), remote.len(), merged.len(), delta.len());
        push_failures(delta.len(), failures)
    }

    // ========== 同步节奏 ==========

    pub async fn is_sync_due(&self, uid: &str) -> Result<bool> {
        self.is_sync_due_at(uid, now_utc_millis()).await
    }

    /// 从未同步过，或距上次同步超过 `sync_interval_secs`
    pub async fn is_sync_due_at(&self, uid: &str, now_ms: i64) -> Result<bool> {
        let interval_ms = self.config.sync_interval_secs.saturating_mul(1000);
        Ok(match self.local.get_last_sync_at(uid).await? {
            None => true,
            Some(last) => millis_since(last, now_ms) > interval_ms,
        })
    }

    /// 到期才同步，未到期返回 None
    pub async fn sync_if_due(&self, uid: &str) -> Result<Option<SyncResult>> {
        if !self.is_sync_due(uid).await? {
            debug!("同步未到期: user={}", uid);
            return Ok(None);
        }
        Ok(Some(self.full_sync(uid).await))
    }

    // ========== 单条修改 ==========

    /// 加入书架：先写本地，再写远端；远端失败保留本地
    pub async fn add_bookmark(&self, uid: &str, bookmark: Bookmark) -> Result<MutationOutcome> {
        if bookmark.title_id.trim().is_empty() {
            return Err(InkshelfSDKError::InvalidArgument("title_id 不能为空".into()));
        }
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;

        let current = self.local.load_bookmarks(uid).await?;
        // 新书签作为“远端”一侧参与合并，同 title_id 时覆盖旧值
        let updated = merge_bookmarks(&current, std::slice::from_ref(&bookmark));

        let outcome = OptimisticMutation::new("add_bookmark")
            .run(
                self.local.save_bookmarks(uid, &updated),
                self.remote_call("upsert_bookmark", self.remote.upsert_bookmark(uid, &bookmark)),
                self.local.save_bookmarks(uid, &current),
            )
            .await?;

        self.mark_pending_delete(uid, &bookmark.title_id, false).await?;

        info!("📌 加入书架: user={}, title={}", uid, bookmark.title_id);
        self.events
            .emit(event_builders::bookmark_added(uid, &bookmark.title_id, outcome.is_committed()))
            .await;
        Ok(outcome)
    }

    /// 移出书架：本地不存在时仍会尝试删除远端
    pub async fn remove_bookmark(&self, uid: &str, title_id: &str) -> Result<MutationOutcome> {
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;

        let current = self.local.load_bookmarks(uid).await?;
        let updated: Vec<Bookmark> = current
            .iter()
            .filter(|b| b.title_id != title_id)
            .cloned()
            .collect();

        let outcome = OptimisticMutation::new("remove_bookmark")
            .run(
                self.local.save_bookmarks(uid, &updated),
                self.remote_call("delete_bookmark", self.remote.delete_bookmark(uid, title_id)),
                self.local.save_bookmarks(uid, &current),
            )
            .await?;

        // 远端删除失败时记下，下次 full_sync 重试
        self.mark_pending_delete(uid, title_id, matches!(outcome, MutationOutcome::Retained(_)))
            .await?;

        info!("🗑️ 移出书架: user={}, title={}", uid, title_id);
        self.events
            .emit(event_builders::bookmark_removed(uid, title_id, outcome.is_committed()))
            .await;
        Ok(outcome)
    }

    /// 写入整条进度记录
    ///
    /// 与本地已有记录按合并规则合并，过期的调用方不会让进度倒退。
    pub async fn update_progress(&self, uid: &str, progress: ReadingProgress) -> Result<ReadingProgress> {
        if progress.title_id.trim().is_empty() {
            return Err(InkshelfSDKError::InvalidArgument("title_id 不能为空".into()));
        }
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;

        let (record, pushed) = self.persist_progress(uid, progress, true).await?;
        self.events
            .emit(event_builders::progress_committed(uid, &record.title_id, None, None, pushed))
            .await;
        Ok(record)
    }

    /// 应用一次章节进度提交
    pub async fn record_chapter_progress(
        &self,
        uid: &str,
        update: ChapterProgressUpdate,
    ) -> Result<ReadingProgress> {
        if update.title_id.trim().is_empty() || update.chapter_id.trim().is_empty() {
            return Err(InkshelfSDKError::InvalidArgument(
                "title_id / chapter_id 不能为空".into(),
            ));
        }
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;

        let existing = self
            .local
            .load_progress(uid)
            .await?
            .into_iter()
            .find(|p| p.title_id == update.title_id);
        let now = now_utc_millis();
        let mut record = existing.unwrap_or_else(|| ReadingProgress::new(&update.title_id, now));

        let percent = clamp_percent(update.percent as i64);
        record.raise_chapter_percent(&update.chapter_id, percent);
        // 最近打开的章节，与是否读完无关
        if record.last_chapter_id != update.chapter_id {
            record.last_chapter_title.clear();
        }
        record.last_chapter_id = update.chapter_id.clone();
        if let Some(ref chapter_title) = update.chapter_title {
            record.last_chapter_title = chapter_title.clone();
        }
        if update.completed {
            record.mark_chapter_read(&update.chapter_id);
        }
        if let Some(ref display_title) = update.display_title {
            record.display_title = display_title.clone();
        }
        if let Some(ref cover_image) = update.cover_image {
            record.cover_image = cover_image.clone();
        }
        if let Some(total) = update.total_chapters {
            record.observe_total_chapters(total);
        }
        record.updated_at = record.updated_at.max(now);

        let (record, pushed) = self
            .persist_progress(uid, record, update.push_remote)
            .await?;
        debug!(
            "章节进度已提交: title={}, chapter={}, percent={}, pushed={}",
            update.title_id, update.chapter_id, percent, pushed
        );
        self.events
            .emit(event_builders::progress_committed(
                uid,
                &record.title_id,
                Some(&update.chapter_id),
                Some(percent),
                pushed,
            ))
            .await;
        Ok(record)
    }

    /// 合并进本地集合并落盘，按需推送合并后的整条记录；调用方持有用户锁
    async fn persist_progress(
        &self,
        uid: &str,
        incoming: ReadingProgress,
        push_remote: bool,
    ) -> Result<(ReadingProgress, bool)> {
        let current = self.local.load_progress(uid).await?;
        let updated = merge_progress(&current, std::slice::from_ref(&incoming));
        let record = updated
            .iter()
            .find(|p| p.title_id == incoming.title_id)
            .cloned()
            .unwrap_or(incoming);

        if !push_remote {
            self.local.save_progress(uid, &updated).await?;
            return Ok((record, false));
        }

        let outcome = OptimisticMutation::new("upsert_progress")
            .run(
                self.local.save_progress(uid, &updated),
                self.remote_call("upsert_progress", self.remote.upsert_progress(uid, &record)),
                self.local.save_progress(uid, &current),
            )
            .await?;
        Ok((record, outcome.is_committed()))
    }

    /// 清空阅读历史：本地立即清空，远端尽力删除
    pub async fn clear_history(&self, uid: &str) -> Result<MutationOutcome> {
        let lock = self.user_lock(uid).await;
        let _guard = lock.lock().await;

        let current = self.local.load_progress(uid).await?;
        let outcome = OptimisticMutation::new("clear_history")
            .run(
                self.local.save_progress(uid, &[]),
                self.remote_call("delete_all_progress", self.remote.delete_all_progress(uid)),
                self.local.save_progress(uid, &current),
            )
            .await?;

        info!("🧹 阅读历史已清空: user={}, 共 {} 条", uid, current.len());
        self.events.emit(event_builders::history_cleared(uid)).await;
        Ok(outcome)
    }

    pub async fn load_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>> {
        self.local.load_bookmarks(uid).await
    }

    pub async fn load_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>> {
        self.local.load_progress(uid).await
    }
}

/// 推送阶段：部分失败时本地已是合并后的超集，汇报错误等待下次同步
fn push_failures(attempted: usize, failures: Vec<InkshelfSDKError>) -> Result<()> {
    let failed = failures.len();
    match failures.into_iter().next() {
        None => Ok(()),
        Some(InkshelfSDKError::Remote { status, message }) => Err(InkshelfSDKError::Remote {
            status,
            message: format!("{}/{} 条推送失败: {}", failed, attempted, message),
        }),
        Some(first) => Err(first),
    }
}
