//! SDK 版本信息

/// SDK semver，来自 Cargo.toml
///
/// 禁止手写版本号，必须用 `env!("CARGO_PKG_VERSION")` 与 Cargo.toml 保持同步。
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 本地持久化格式版本，写入 KV 的 `schema_version` 键。
/// 读取到更高版本时拒绝打开（防 downgrade 导致格式不兼容）。
pub const LOCAL_SCHEMA_VERSION: u32 = 1;
