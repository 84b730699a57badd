//! HTTP 远端存储 - PostgREST 风格接口
//!
//! - `GET    {base}/rest/v1/{table}?user_id=eq.{uid}`
//! - `POST   {base}/rest/v1/{table}?on_conflict=user_id,title_id`（merge-duplicates，即 upsert）
//! - `DELETE {base}/rest/v1/{table}?user_id=eq.{uid}[&title_id=eq.{tid}]`

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::{debug, info};

use super::rows::{decode_rows, BookmarkRow, ProgressRow};
use super::RemoteStore;
use crate::error::{InkshelfSDKError, Result};
use crate::sdk::RemoteConfig;
use crate::storage::{Bookmark, ReadingProgress};
use crate::sync::EntityType;

const UPSERT_CONFLICT_KEYS: &str = "user_id,title_id";

/// HTTP 远端存储客户端
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    api_key: String,
    /// 登录流程在外部完成，这里只持有当前 access token
    access_token: RwLock<Option<String>>,
}

impl HttpRemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| InkshelfSDKError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        info!("✅ 远端存储客户端已创建 (base_url: {})", base_url);

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            access_token: RwLock::new(config.access_token.clone()),
        })
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    fn table_url(&self, entity_type: EntityType) -> String {
        format!("{}/rest/v1/{}", self.base_url, entity_type.table_name())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.api_key.clone());
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
    }

    async fn fetch_rows(&self, entity_type: EntityType, uid: &str) -> Result<Vec<serde_json::Value>> {
        let request = self
            .client
            .get(self.table_url(entity_type))
            .query(&[("select", "*".to_string()), ("user_id", format!("eq.{}", uid))]);
        let response = self.authorized(request).send().await?;
        let response = check_status(response).await?;
        let rows: Vec<serde_json::Value> = response.json().await?;
        debug!("拉取 {} 行数: {}", entity_type.table_name(), rows.len());
        Ok(rows)
    }

    async fn upsert_row<T: Serialize>(&self, entity_type: EntityType, row: &T) -> Result<()> {
        let request = self
            .client
            .post(self.table_url(entity_type))
            .query(&[("on_conflict", UPSERT_CONFLICT_KEYS)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row]);
        let response = self.authorized(request).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_rows(&self, entity_type: EntityType, uid: &str, title_id: Option<&str>) -> Result<()> {
        let mut filters = vec![("user_id", format!("eq.{}", uid))];
        if let Some(title_id) = title_id {
            filters.push(("title_id", format!("eq.{}", title_id)));
        }
        let request = self.client.delete(self.table_url(entity_type)).query(&filters);
        let response = self.authorized(request).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

/// 非 2xx 响应转换为 `Remote` 错误，带上响应体便于排查
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InkshelfSDKError::Remote {
        status: status.as_u16(),
        message: body,
    })
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_bookmarks(&self, uid: &str) -> Result<Vec<Bookmark>> {
        let rows = self.fetch_rows(EntityType::Bookmark, uid).await?;
        Ok(decode_rows::<BookmarkRow, Bookmark>(EntityType::Bookmark.table_name(), rows))
    }

    async fn fetch_progress(&self, uid: &str) -> Result<Vec<ReadingProgress>> {
        let rows = self.fetch_rows(EntityType::ReadingProgress, uid).await?;
        Ok(decode_rows::<ProgressRow, ReadingProgress>(
            EntityType::ReadingProgress.table_name(),
            rows,
        ))
    }

    async fn upsert_bookmark(&self, uid: &str, bookmark: &Bookmark) -> Result<()> {
        let row = BookmarkRow::from_bookmark(uid, bookmark);
        self.upsert_row(EntityType::Bookmark, &row).await
    }

    async fn delete_bookmark(&self, uid: &str, title_id: &str) -> Result<()> {
        self.delete_rows(EntityType::Bookmark, uid, Some(title_id)).await
    }

    async fn upsert_progress(&self, uid: &str, progress: &ReadingProgress) -> Result<()> {
        let row = ProgressRow::from_progress(uid, progress);
        self.upsert_row(EntityType::ReadingProgress, &row).await
    }

    async fn delete_all_progress(&self, uid: &str) -> Result<()> {
        self.delete_rows(EntityType::ReadingProgress, uid, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> RemoteConfig {
        RemoteConfig {
            base_url: base_url.to_string(),
            api_key: "anon-key".to_string(),
            access_token: None,
            connect_timeout_secs: Some(1),
            request_timeout_secs: Some(1),
        }
    }

    #[test]
    fn table_urls_strip_trailing_slash() {
        let store = HttpRemoteStore::new(&config("https://db.example.com/")).unwrap();
        assert_eq!(
            store.table_url(EntityType::Bookmark),
            "https://db.example.com/rest/v1/bookmarks"
        );
        assert_eq!(
            store.table_url(EntityType::ReadingProgress),
            "https://db.example.com/rest/v1/reading_progress"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_a_remote_error() {
        // 127.0.0.1:9 (discard) 通常没有监听
        let store = HttpRemoteStore::new(&config("http://127.0.0.1:9")).unwrap();
        let err = store.fetch_bookmarks("u1").await.unwrap_err();
        assert!(err.is_remote(), "unexpected error: {:?}", err);
    }
}
