//! 时间处理工具
//!
//! - **存储层**: 所有时间字段使用 UTC 毫秒时间戳（i64）
//! - **业务层**: 统一使用 `now_utc_millis()` 生成时间

use chrono::Utc;

/// 当前 UTC 毫秒时间戳
pub fn now_utc_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 距离给定时间戳经过的毫秒数（时钟回拨时返回 0）
pub fn millis_since(then_ms: i64, now_ms: i64) -> u64 {
    now_ms.saturating_sub(then_ms).max(0) as u64
}
