//! 乐观写入
//!
//! 先写本地（总是成功），再尝试远端；远端失败时按 `RollbackPolicy`
//! 保留本地修改（由下一次 full_sync 收敛），或应用预先计算好的逆操作。

use std::future::Future;

use tracing::warn;

use crate::error::{InkshelfSDKError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// 保留本地修改（同步引擎默认）
    #[default]
    Retain,
    /// 应用逆操作撤销本地修改
    Revert,
}

/// 远端步骤的结果
#[derive(Debug)]
pub enum MutationOutcome {
    Committed,
    /// 远端失败，本地修改保留
    Retained(InkshelfSDKError),
    /// 远端失败，本地修改已撤销
    Reverted(InkshelfSDKError),
}

impl MutationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed)
    }

    pub fn remote_error(&self) -> Option<&InkshelfSDKError> {
        match self {
            MutationOutcome::Committed => None,
            MutationOutcome::Retained(e) | MutationOutcome::Reverted(e) => Some(e),
        }
    }
}

/// 一次乐观修改：`label` 仅用于日志
pub struct OptimisticMutation<'a> {
    label: &'a str,
    policy: RollbackPolicy,
}

impl<'a> OptimisticMutation<'a> {
    pub fn new(label: &'a str) -> Self {
        Self {
            label,
            policy: RollbackPolicy::Retain,
        }
    }

    pub fn with_policy(mut self, policy: RollbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 依次执行 apply → remote → (失败时) revert
    ///
    /// 本地步骤失败直接返回 Err；远端失败只体现在 `MutationOutcome` 中。
    pub async fn run<A, R, V>(self, apply: A, remote: R, revert: V) -> Result<MutationOutcome>
    where
        A: Future<Output = Result<()>>,
        R: Future<Output = Result<()>>,
        V: Future<Output = Result<()>>,
    {
        apply.await?;

        let error = match remote.await {
            Ok(()) => return Ok(MutationOutcome::Committed),
            Err(e) => e,
        };

        match self.policy {
            RollbackPolicy::Retain => {
                warn!("⚠️ {} 远端写入失败，保留本地修改: {}", self.label, error);
                Ok(MutationOutcome::Retained(error))
            }
            RollbackPolicy::Revert => {
                warn!("⚠️ {} 远端写入失败，撤销本地修改: {}", self.label, error);
                revert.await?;
                Ok(MutationOutcome::Reverted(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    async fn push(log: Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> Result<()> {
        log.lock().push(entry);
        Ok(())
    }

    async fn unreachable_remote() -> Result<()> {
        Err(InkshelfSDKError::Transport("offline".into()))
    }

    #[tokio::test]
    async fn retain_keeps_local_change_on_remote_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outcome = OptimisticMutation::new("add_bookmark")
            .run(
                push(log.clone(), "apply"),
                unreachable_remote(),
                push(log.clone(), "revert"),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Retained(_)));
        assert_eq!(*log.lock(), vec!["apply"]);
    }

    #[tokio::test]
    async fn revert_applies_inverse_on_remote_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outcome = OptimisticMutation::new("add_bookmark")
            .with_policy(RollbackPolicy::Revert)
            .run(
                push(log.clone(), "apply"),
                unreachable_remote(),
                push(log.clone(), "revert"),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Reverted(_)));
        assert!(outcome.remote_error().is_some());
        assert_eq!(*log.lock(), vec!["apply", "revert"]);
    }

    #[tokio::test]
    async fn committed_skips_revert() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outcome = OptimisticMutation::new("remove_bookmark")
            .with_policy(RollbackPolicy::Revert)
            .run(
                push(log.clone(), "apply"),
                push(log.clone(), "remote"),
                push(log.clone(), "revert"),
            )
            .await
            .unwrap();

        assert!(outcome.is_committed());
        assert_eq!(*log.lock(), vec!["apply", "remote"]);
    }
}
