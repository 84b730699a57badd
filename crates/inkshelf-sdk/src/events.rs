//! 事件系统模块 - 同步与阅读相关事件的广播
//!
//! 功能包括：
//! - 同步状态机变更 / 同步完成
//! - 书架增删
//! - 阅读进度提交与清空历史
//! - 事件广播、过滤订阅和回调监听

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::sync::{SyncResult, SyncState};
use crate::utils::time::now_utc_millis;

/// SDK 事件类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SDKEvent {
    /// 同步状态机变更
    SyncStateChanged {
        user_id: String,
        old_state: SyncState,
        new_state: SyncState,
        timestamp: i64,
    },
    /// 一次 full_sync 结束（成功或部分失败）
    SyncCompleted {
        user_id: String,
        result: SyncResult,
        timestamp: i64,
    },
    BookmarkAdded {
        user_id: String,
        title_id: String,
        /// 远端是否已写入
        remote_synced: bool,
        timestamp: i64,
    },
    BookmarkRemoved {
        user_id: String,
        title_id: String,
        remote_synced: bool,
        timestamp: i64,
    },
    /// 阅读进度已写入本地
    ProgressCommitted {
        user_id: String,
        title_id: String,
        chapter_id: Option<String>,
        percent: Option<u8>,
        pushed_remote: bool,
        timestamp: i64,
    },
    HistoryCleared {
        user_id: String,
        timestamp: i64,
    },
}

impl SDKEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SDKEvent::SyncStateChanged { .. } => "sync_state_changed",
            SDKEvent::SyncCompleted { .. } => "sync_completed",
            SDKEvent::BookmarkAdded { .. } => "bookmark_added",
            SDKEvent::BookmarkRemoved { .. } => "bookmark_removed",
            SDKEvent::ProgressCommitted { .. } => "progress_committed",
            SDKEvent::HistoryCleared { .. } => "history_cleared",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            SDKEvent::SyncStateChanged { user_id, .. }
            | SDKEvent::SyncCompleted { user_id, .. }
            | SDKEvent::BookmarkAdded { user_id, .. }
            | SDKEvent::BookmarkRemoved { user_id, .. }
            | SDKEvent::ProgressCommitted { user_id, .. }
            | SDKEvent::HistoryCleared { user_id, .. } => user_id,
        }
    }

    /// 事件关联的作品
    pub fn title_id(&self) -> Option<&str> {
        match self {
            SDKEvent::BookmarkAdded { title_id, .. }
            | SDKEvent::BookmarkRemoved { title_id, .. }
            | SDKEvent::ProgressCommitted { title_id, .. } => Some(title_id),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            SDKEvent::SyncStateChanged { timestamp, .. }
            | SDKEvent::SyncCompleted { timestamp, .. }
            | SDKEvent::BookmarkAdded { timestamp, .. }
            | SDKEvent::BookmarkRemoved { timestamp, .. }
            | SDKEvent::ProgressCommitted { timestamp, .. }
            | SDKEvent::HistoryCleared { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub event_types: Option<Vec<String>>,
    pub user_ids: Option<Vec<String>>,
    pub title_ids: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn with_user_ids(mut self, user_ids: Vec<String>) -> Self {
        self.user_ids = Some(user_ids);
        self
    }

    pub fn with_title_ids(mut self, title_ids: Vec<String>) -> Self {
        self.title_ids = Some(title_ids);
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &SDKEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        if let Some(ref user_ids) = self.user_ids {
            if !user_ids.iter().any(|u| u == event.user_id()) {
                return false;
            }
        }

        if let Some(ref title_ids) = self.title_ids {
            // 事件没有作品 ID 但过滤器要求有
            match event.title_id() {
                Some(title_id) if title_ids.iter().any(|t| t == title_id) => {}
                _ => return false,
            }
        }

        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SDKEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<i64>,
}

/// 事件管理器
pub struct EventManager {
    sender: broadcast::Sender<SDKEvent>,
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SDKEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景（无 UI 客户端），仅打 debug
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read().await;
        for key in [event.event_type(), "*"] {
            if let Some(event_listeners) = listeners.get(key) {
                for listener in event_listeners {
                    listener(&event);
                }
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SDKEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器，`"*"` 监听全部事件
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SDKEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 带过滤的事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<SDKEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<SDKEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<SDKEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<SDKEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// 事件构造器
pub mod event_builders {
    use super::*;

    pub fn sync_state_changed(user_id: &str, old_state: SyncState, new_state: SyncState) -> SDKEvent {
        SDKEvent::SyncStateChanged {
            user_id: user_id.to_string(),
            old_state,
            new_state,
            timestamp: now_utc_millis(),
        }
    }

    pub fn sync_completed(user_id: &str, result: SyncResult) -> SDKEvent {
        SDKEvent::SyncCompleted {
            user_id: user_id.to_string(),
            result,
            timestamp: now_utc_millis(),
        }
    }

    pub fn bookmark_added(user_id: &str, title_id: &str, remote_synced: bool) -> SDKEvent {
        SDKEvent::BookmarkAdded {
            user_id: user_id.to_string(),
            title_id: title_id.to_string(),
            remote_synced,
            timestamp: now_utc_millis(),
        }
    }

    pub fn bookmark_removed(user_id: &str, title_id: &str, remote_synced: bool) -> SDKEvent {
        SDKEvent::BookmarkRemoved {
            user_id: user_id.to_string(),
            title_id: title_id.to_string(),
            remote_synced,
            timestamp: now_utc_millis(),
        }
    }

    pub fn progress_committed(
        user_id: &str,
        title_id: &str,
        chapter_id: Option<&str>,
        percent: Option<u8>,
        pushed_remote: bool,
    ) -> SDKEvent {
        SDKEvent::ProgressCommitted {
            user_id: user_id.to_string(),
            title_id: title_id.to_string(),
            chapter_id: chapter_id.map(str::to_string),
            percent,
            pushed_remote,
            timestamp: now_utc_millis(),
        }
    }

    pub fn history_cleared(user_id: &str) -> SDKEvent {
        SDKEvent::HistoryCleared {
            user_id: user_id.to_string(),
            timestamp: now_utc_millis(),
        }
    }
}
