//! 阅读会话 - 用 tokio 任务驱动 `ProgressTracker`
//!
//! 每次滚动事件重置防抖计时；静止满窗口后把提交交给编排器落本地（并按节流结果推送远端）。
//! 关闭或丢弃会话时立即提交未保存的进度。

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::tracker::{percent_from_scroll, ChapterContext, ProgressTracker, TrackerPhase};
use crate::error::{InkshelfSDKError, Result};
use crate::sdk::ProgressConfig;
use crate::sync::{ChapterProgressUpdate, SyncOrchestrator};

enum SessionInput {
    Position(u8),
    Close,
}

pub struct ProgressSession {
    tracker: Arc<Mutex<ProgressTracker>>,
    tx: mpsc::UnboundedSender<SessionInput>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressSession {
    /// 打开章节：读取本地已保存的进度后进入 Reading
    pub async fn open(
        orchestrator: Arc<SyncOrchestrator>,
        uid: &str,
        context: ChapterContext,
        config: ProgressConfig,
    ) -> Result<Self> {
        let saved = orchestrator
            .load_progress(uid)
            .await?
            .into_iter()
            .find(|p| p.title_id == context.title_id)
            .and_then(|p| p.percent_for(&context.chapter_id));

        info!(
            "📖 打开章节: title={}, chapter={}, saved={:?}",
            context.title_id, context.chapter_id, saved
        );

        let mut tracker = ProgressTracker::new(context, config);
        tracker.on_loaded(saved);
        let tracker = Arc::new(Mutex::new(tracker));

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_session(
            tracker.clone(),
            orchestrator,
            uid.to_string(),
            rx,
        ));

        Ok(Self {
            tracker,
            tx,
            handle: Some(handle),
        })
    }

    /// 上报滚动百分比（0..=100）
    pub fn report_percent(&self, percent: u8) {
        if self.tx.send(SessionInput::Position(percent)).is_err() {
            debug!("阅读会话已结束，忽略进度: {}", percent);
        }
    }

    /// 上报滚动偏移量
    pub fn report_scroll(&self, offset: f64, scrollable_height: f64) {
        self.report_percent(percent_from_scroll(offset, scrollable_height));
    }

    /// 续读偏移量，每次打开只返回一次
    pub fn resume_offset(&self, scrollable_height: f64) -> Option<f64> {
        self.tracker.lock().take_resume_offset(scrollable_height)
    }

    pub fn phase(&self) -> TrackerPhase {
        self.tracker.lock().phase()
    }

    pub fn high_water(&self) -> u8 {
        self.tracker.lock().high_water()
    }

    /// 关闭会话并等待最后一次提交完成
    pub async fn close(mut self) -> Result<()> {
        let _ = self.tx.send(SessionInput::Close);
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| InkshelfSDKError::Other(format!("阅读会话任务异常: {}", e)))?;
        }
        Ok(())
    }
}

impl Drop for ProgressSession {
    fn drop(&mut self) {
        // 未显式 close 时让后台任务自行提交剩余进度
        if self.handle.is_some() {
            let _ = self.tx.send(SessionInput::Close);
        }
    }
}

async fn run_session(
    tracker: Arc<Mutex<ProgressTracker>>,
    orchestrator: Arc<SyncOrchestrator>,
    uid: String,
    mut rx: mpsc::UnboundedReceiver<SessionInput>,
) {
    loop {
        let deadline = tracker.lock().next_deadline();
        select! {
            input = rx.recv() => match input {
                Some(SessionInput::Position(percent)) => {
                    tracker.lock().on_position(percent, Instant::now());
                }
                Some(SessionInput::Close) | None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                let update = tracker.lock().poll(Instant::now());
                if let Some(update) = update {
                    commit(&orchestrator, &uid, update).await;
                }
            }
        }
    }

    let pending = tracker.lock().flush();
    if let Some(update) = pending {
        commit(&orchestrator, &uid, update).await;
    }
    debug!("阅读会话结束: user={}", uid);
}

async fn commit(orchestrator: &SyncOrchestrator, uid: &str, update: ChapterProgressUpdate) {
    let title_id = update.title_id.clone();
    if let Err(e) = orchestrator.record_chapter_progress(uid, update).await {
        warn!("⚠️ 阅读进度提交失败: title={}, error={}", title_id, e);
    }
}
