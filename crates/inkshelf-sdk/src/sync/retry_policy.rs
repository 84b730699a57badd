use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InkshelfSDKError;

/// 同步失败原因分类
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncFailureReason {
    /// 远端调用超时 - 可重试
    NetworkTimeout,
    /// 网络不可用 - 等待恢复后重试
    NetworkUnavailable,
    /// 服务端错误 - 根据状态码决定
    ServerError(u16),
    /// 认证失败 - 刷新 token 后重试
    AuthFailure,
    /// 限流 - 延迟重试
    RateLimited,
    /// 本地存储失败 - 不重试，等待下一次调度
    LocalStorage(String),
    /// 未知错误
    Unknown(String),
}

impl SyncFailureReason {
    /// 判断是否可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncFailureReason::NetworkTimeout => true,
            SyncFailureReason::NetworkUnavailable => true,
            // 5xx 可重试，4xx 不重试
            SyncFailureReason::ServerError(code) => (500..600).contains(code),
            SyncFailureReason::AuthFailure => true,
            SyncFailureReason::RateLimited => true,
            SyncFailureReason::LocalStorage(_) => false,
            SyncFailureReason::Unknown(_) => true,
        }
    }

    /// 重试延迟倍数
    pub fn delay_multiplier(&self) -> f64 {
        match self {
            SyncFailureReason::NetworkUnavailable => 2.0,
            SyncFailureReason::ServerError(_) => 1.5,
            SyncFailureReason::AuthFailure => 0.5,
            SyncFailureReason::RateLimited => 3.0,
            _ => 1.0,
        }
    }
}

impl From<&InkshelfSDKError> for SyncFailureReason {
    fn from(error: &InkshelfSDKError) -> Self {
        match error {
            InkshelfSDKError::Timeout(_) => SyncFailureReason::NetworkTimeout,
            InkshelfSDKError::Transport(_) | InkshelfSDKError::NotConnected => {
                SyncFailureReason::NetworkUnavailable
            }
            InkshelfSDKError::Remote { status: 401, .. } | InkshelfSDKError::Remote { status: 403, .. } => {
                SyncFailureReason::AuthFailure
            }
            InkshelfSDKError::Remote { status: 429, .. } => SyncFailureReason::RateLimited,
            InkshelfSDKError::Remote { status, .. } => SyncFailureReason::ServerError(*status),
            InkshelfSDKError::KvStore(msg) | InkshelfSDKError::IO(msg) => {
                SyncFailureReason::LocalStorage(msg.clone())
            }
            other => SyncFailureReason::Unknown(other.to_string()),
        }
    }
}

/// 重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 基础延迟时间（秒）
    pub base_delay_seconds: u64,
    /// 最大延迟时间（秒）
    pub max_delay_seconds: u64,
    /// 指数退避因子
    pub backoff_factor: f64,
    /// 随机抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_seconds: 2,
            max_delay_seconds: 300,
            backoff_factor: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 第 `retry_count` 次失败后的等待时间；不应重试时返回 None
    pub fn next_delay(&self, retry_count: u32, reason: &SyncFailureReason) -> Option<Duration> {
        if !self.should_retry(retry_count, reason) {
            return None;
        }

        // base_delay * (backoff_factor ^ retry_count) * 原因倍数，封顶后加抖动
        let base_delay = self.base_delay_seconds as f64 * self.backoff_factor.powf(retry_count as f64);
        let capped = (base_delay * reason.delay_multiplier()).min(self.max_delay_seconds as f64);
        let jitter = capped * self.jitter_factor * (rand::random::<f64>() - 0.5);

        Some(Duration::from_secs_f64((capped + jitter).max(0.0)))
    }

    pub fn should_retry(&self, retry_count: u32, reason: &SyncFailureReason) -> bool {
        retry_count < self.max_retries && reason.is_retryable()
    }
}
