//! 同步模块
//!
//! 职责：
//! - 合并本地与远端副本（`merge`，纯函数）
//! - 编排 拉取 → 合并 → 落本地 → 推送差量（`orchestrator`）
//! - 乐观写入与失败处理（`optimistic`）
//! - 周期调度与失败退避（`scheduler` + `retry_policy`）

pub mod cursor_store;
pub mod entity_type;
pub mod merge;
pub mod optimistic;
pub mod orchestrator;
pub mod retry_policy;
pub mod scheduler;

pub use cursor_store::SyncCursorStore;
pub use entity_type::EntityType;
pub use optimistic::{MutationOutcome, OptimisticMutation, RollbackPolicy};
pub use orchestrator::{ChapterProgressUpdate, SyncContext, SyncOrchestrator};
pub use retry_policy::{RetryPolicy, SyncFailureReason};
pub use scheduler::SyncScheduler;

use serde::{Deserialize, Serialize};

/// 单用户同步状态机
///
/// `Idle → Pulling → Merging → Persisting → Pushing → Idle`，
/// `Pulling` / `Pushing` 失败时进入 `Error`，下一次同步开始前回到 `Idle`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Idle,
    Pulling,
    Merging,
    Persisting,
    Pushing,
    Error {
        /// 错误消息
        error: String,
    },
}

impl SyncState {
    pub fn is_busy(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Error { .. })
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Idle
    }
}

/// 单个实体类型子流程的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    /// 合并后本地持有的记录数
    pub merged: usize,
    /// 推送成功的记录数
    pub pushed: usize,
    pub error: Option<String>,
    /// 失败分类，供调度器决定是否退避重试
    pub reason: Option<SyncFailureReason>,
}

impl FlowReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// 一次 full_sync 的结果，失败以字符串形式汇报而不是 Err
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub bookmarks: FlowReport,
    pub progress: FlowReport,
    /// 两个子流程都成功时写入的 lastSyncAt
    pub synced_at: Option<i64>,
}

impl SyncResult {
    pub fn bookmarks_synced(&self) -> usize {
        self.bookmarks.merged
    }

    pub fn progress_synced(&self) -> usize {
        self.progress.merged
    }

    /// 所有子流程的错误，带实体类型前缀
    pub fn errors(&self) -> Vec<String> {
        [
            (EntityType::Bookmark, &self.bookmarks),
            (EntityType::ReadingProgress, &self.progress),
        ]
        .into_iter()
        .filter_map(|(entity_type, report)| {
            report
                .error
                .as_ref()
                .map(|e| format!("{}: {}", entity_type, e))
        })
        .collect()
    }

    pub fn is_success(&self) -> bool {
        self.bookmarks.succeeded() && self.progress.succeeded()
    }

    pub fn failure_reasons(&self) -> Vec<SyncFailureReason> {
        [&self.bookmarks, &self.progress]
            .into_iter()
            .filter_map(|report| report.reason.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_result_reports_per_flow_errors() {
        let result = SyncResult {
            bookmarks: FlowReport {
                merged: 3,
                pushed: 1,
                ..Default::default()
            },
            progress: FlowReport {
                error: Some("Transport error: offline".into()),
                reason: Some(SyncFailureReason::NetworkUnavailable),
                ..Default::default()
            },
            synced_at: None,
        };
        assert!(!result.is_success());
        assert_eq!(result.bookmarks_synced(), 3);
        assert_eq!(
            result.errors(),
            vec!["reading_progress: Transport error: offline".to_string()]
        );
        assert_eq!(
            result.failure_reasons(),
            vec![SyncFailureReason::NetworkUnavailable]
        );
    }

    #[test]
    fn error_state_is_not_busy() {
        assert!(SyncState::Pulling.is_busy());
        assert!(!SyncState::Idle.is_busy());
        assert!(!SyncState::Error { error: "x".into() }.is_busy());
    }
}
