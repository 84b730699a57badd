//! 阅读进度跟踪
//!
//! - `tracker`: 与定时器无关的状态机（防抖、节流、完成判定、续读）
//! - `session`: tokio 驱动的阅读会话，把提交交给 `SyncOrchestrator`

pub mod session;
pub mod tracker;

pub use session::ProgressSession;
pub use tracker::{percent_from_scroll, ChapterContext, ProgressTracker, TrackerPhase};
