//! Inkshelf SDK - 漫画阅读客户端的本地优先同步引擎
//!
//! 本 SDK 提供：
//! - 📚 书架与阅读进度的本地副本（sled 持久化，离线可用）
//! - 🔀 确定性合并：书架按并集、阅读进度按记录级最新优先并保留已读章节
//! - 🔄 同步编排：拉取 → 合并 → 落盘 → 推送，失败按原因退避重试
//! - 📖 阅读进度跟踪：滚动防抖、推送节流、完成判定、续读定位
//! - ⚙️ 事件系统：同步状态与数据变化统一广播
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use inkshelf_sdk::{Bookmark, InkshelfConfig, InkshelfSDK};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InkshelfConfig::builder()
//!         .data_dir("/path/to/data")
//!         .remote("https://db.example.com", "anon-key")
//!         .build();
//!
//!     let sdk = InkshelfSDK::initialize(config).await?;
//!     sdk.login("user123").await?;
//!
//!     sdk.add_bookmark(Bookmark::new("one-piece", "One Piece", 0)).await?;
//!     let result = sdk.full_sync().await?;
//!     println!("同步结果: {:?}", result.errors());
//!
//!     sdk.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod progress;
pub mod remote;
pub mod sdk;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

pub use error::{InkshelfSDKError, Result};
pub use events::{EventFilter, EventManager, SDKEvent};
pub use lifecycle::{LifecycleHook, LifecycleManager};
pub use progress::{ChapterContext, ProgressSession, ProgressTracker, TrackerPhase};
pub use remote::{HttpRemoteStore, InMemoryRemoteStore, RemoteStore};
pub use sdk::{InkshelfConfig, InkshelfConfigBuilder, InkshelfSDK, ProgressConfig, RemoteConfig, SyncConfig};
pub use storage::{Bookmark, InMemoryLocalStore, KvLocalStore, KvStore, LocalStore, ReadingProgress};
pub use sync::{
    EntityType, MutationOutcome, RetryPolicy, RollbackPolicy, SyncFailureReason, SyncOrchestrator,
    SyncResult, SyncScheduler, SyncState,
};
pub use version::SDK_VERSION;
