use thiserror::Error;

#[derive(Debug, Error)]
pub enum InkshelfSDKError {
    #[error("KV store error: {0}")]
    KvStore(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    IO(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Timeout: {0}")]
    Timeout(String),
    // 远端返回的非 2xx 响应
    #[error("Remote error [{status}]: {message}")]
    Remote { status: u16, message: String },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Config error: {0}")]
    Config(String),
    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for InkshelfSDKError {
    fn from(error: serde_json::Error) -> Self {
        InkshelfSDKError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for InkshelfSDKError {
    fn from(error: std::io::Error) -> Self {
        InkshelfSDKError::IO(error.to_string())
    }
}

impl From<sled::Error> for InkshelfSDKError {
    fn from(error: sled::Error) -> Self {
        InkshelfSDKError::KvStore(error.to_string())
    }
}

impl From<reqwest::Error> for InkshelfSDKError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            InkshelfSDKError::Timeout(error.to_string())
        } else if let Some(status) = error.status() {
            InkshelfSDKError::Remote {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            InkshelfSDKError::InvalidData(error.to_string())
        } else {
            InkshelfSDKError::Transport(error.to_string())
        }
    }
}

impl InkshelfSDKError {
    /// 是否为远端相关错误（网络、超时、服务端响应）
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            InkshelfSDKError::Transport(_)
                | InkshelfSDKError::Timeout(_)
                | InkshelfSDKError::Remote { .. }
                | InkshelfSDKError::NotConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, InkshelfSDKError>;
