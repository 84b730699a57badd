//! 同步调度层（SyncScheduler）
//!
//! **职责边界**（与 SyncOrchestrator 分离）：
//! - **SyncOrchestrator**：只做「拉取 → 合并 → 落本地 → 推送」，遇错即汇报，不重试。
//! - **本模块**：决定「什么时候同步」：周期检查是否到期、失败后按 `RetryPolicy` 退避、
//!   响应前后台切换。
//!
//! 进入后台时取消正在进行的调度同步；丢弃同步 future 是安全的，本地副本只会被合并后的超集替换。

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::orchestrator::SyncOrchestrator;
use super::{SyncFailureReason, SyncResult};
use crate::error::Result;
use crate::lifecycle::LifecycleHook;

struct SchedulerShared {
    orchestrator: Arc<SyncOrchestrator>,
    active_user: Mutex<Option<String>>,
    wake: Notify,
    paused: AtomicBool,
    consecutive_failures: AtomicU32,
    /// 当前这一轮同步的取消令牌
    in_flight: Mutex<Option<CancellationToken>>,
}

/// 同步调度器
pub struct SyncScheduler {
    shared: Arc<SchedulerShared>,
    shutdown: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                orchestrator,
                active_user: Mutex::new(None),
                wake: Notify::new(),
                paused: AtomicBool::new(false),
                consecutive_failures: AtomicU32::new(0),
                in_flight: Mutex::new(None),
            }),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// 切换调度的用户（登出时传 None）
    pub fn set_active_user(&self, uid: Option<String>) {
        *self.shared.active_user.lock() = uid;
        self.shared.consecutive_failures.store(0, Ordering::SeqCst);
        self.cancel_in_flight();
    }

    pub fn active_user(&self) -> Option<String> {
        self.shared.active_user.lock().clone()
    }

    /// 立即检查一次是否到期
    pub fn trigger(&self) {
        self.shared.wake.notify_one();
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// 启动后台任务（重复调用无副作用）
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        let shutdown = CancellationToken::new();
        *self.shutdown.lock() = Some(shutdown.clone());

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            info!("✅ 同步调度器已启动");
            Self::run_loop(shared, shutdown).await;
            info!("同步调度器已停止");
        });
        *self.handle.lock() = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            shutdown.cancel();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("⚠️ 同步调度任务异常退出: {}", e);
            }
        }
    }

    fn cancel_in_flight(&self) {
        if let Some(token) = self.shared.in_flight.lock().take() {
            token.cancel();
        }
    }

    async fn run_loop(shared: Arc<SchedulerShared>, shutdown: CancellationToken) {
        let config = shared.orchestrator.config().clone();
        let tick = Duration::from_secs(config.scheduler_tick_secs.max(1));
        let mut backoff: Option<Duration> = None;

        loop {
            let wait = backoff.unwrap_or(tick);
            select! {
                _ = shutdown.cancelled() => break,
                _ = shared.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }

            if shared.paused.load(Ordering::SeqCst) {
                debug!("后台状态，跳过本轮同步检查");
                continue;
            }
            let Some(uid) = shared.active_user.lock().clone() else {
                continue;
            };

            let cycle = shutdown.child_token();
            *shared.in_flight.lock() = Some(cycle.clone());

            let outcome = select! {
                _ = cycle.cancelled() => None,
                result = shared.orchestrator.sync_if_due(&uid) => Some(result),
            };
            shared.in_flight.lock().take();

            backoff = match outcome {
                None => {
                    info!("⏸️ 本轮同步已取消: user={}", uid);
                    shared.orchestrator.reset_state(&uid).await;
                    None
                }
                Some(Ok(None)) => None,
                Some(Ok(Some(result))) => Self::after_sync(&shared, &config.retry_policy, &result),
                Some(Err(e)) => {
                    // 读取 lastSyncAt 失败，本地存储问题，不退避
                    warn!("⚠️ 同步到期检查失败: {}", e);
                    None
                }
            };
        }
    }

    fn after_sync(
        shared: &SchedulerShared,
        policy: &super::RetryPolicy,
        result: &SyncResult,
    ) -> Option<Duration> {
        let reasons = result.failure_reasons();
        if reasons.is_empty() {
            shared.consecutive_failures.store(0, Ordering::SeqCst);
            return None;
        }

        let retry_count = shared.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        // 取最保守的原因：任一不可重试则等待正常周期
        let reason = reasons
            .iter()
            .find(|r| !r.is_retryable())
            .or_else(|| reasons.first())
            .cloned()
            .unwrap_or(SyncFailureReason::Unknown(String::new()));

        match policy.next_delay(retry_count, &reason) {
            Some(delay) => {
                info!(
                    "🔁 同步失败 ({:?})，{:.1}s 后重试 (第 {} 次)",
                    reason,
                    delay.as_secs_f64(),
                    retry_count + 1
                );
                Some(delay)
            }
            None => {
                warn!("⚠️ 同步失败 ({:?})，不再退避重试，等待下个周期", reason);
                None
            }
        }
    }
}

#[async_trait]
impl LifecycleHook for SyncScheduler {
    async fn on_background(&self) -> Result<()> {
        self.shared.paused.store(true, Ordering::SeqCst);
        self.cancel_in_flight();
        info!("同步调度器进入后台");
        Ok(())
    }

    async fn on_foreground(&self) -> Result<()> {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.trigger();
        info!("同步调度器回到前台，立即检查同步");
        Ok(())
    }
}
