use std::collections::HashMap;
use anyhow::Result;
use async_trait::async_trait;
use rivals_common::{ChildUpdates, Notification, Score};
use serde_json::Value;

#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// One round trip for every id. Ids without a stored score are left out of the map.
    async fn scores(&self, ids: &[String]) -> Result<HashMap<String, Score>>;
}

/// The remote tree. Absent paths read as `None`, never as an error.
#[async_trait]
pub trait RemoteStore: ScoreSource {
    async fn read(&self, path: &str) -> Result<Option<Value>>;
    /// All paths are written or none are.
    async fn update(&self, updates: ChildUpdates) -> Result<()>;
    async fn delete(&self, path: &str) -> Result<()>;
    /// A fresh child key under `parent`. Nothing is written.
    async fn allocate_id(&self, parent: &str) -> Result<String>;
    async fn upload_blob(&self, path: &str, bytes: Vec<u8>) -> Result<()>;
    async fn delete_blob(&self, path: &str) -> Result<()>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<()>;
}
