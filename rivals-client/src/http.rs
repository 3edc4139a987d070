use std::collections::HashMap;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rivals_common::paths::normalize;
use rivals_common::{ChildUpdates, Notification, Score, Url};
use serde_json::Value;
use crate::store::{Notifier, RemoteStore, ScoreSource};
use crate::ClientConfig;

/// The remote tree served by `rivals-server`.
#[derive(Clone, Debug)]
pub struct HttpStore {
    client: Client,
    base: Url,
}

impl HttpStore {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), config.server_url.clone())
    }

    pub fn with_client(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    fn db_url(&self, path: &str) -> Result<String> {
        let path = normalize(path)?;
        Ok(if path.is_empty() { self.base.join("db") } else { self.base.join(format!("db/{path}")) })
    }

    fn url(&self, namespace: &str, path: &str) -> Result<String> {
        Ok(self.base.join(format!("{namespace}/{}", normalize(path)?)))
    }

    pub async fn download_blob(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let response = self.client.get(self.url("blobs", path)?).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.bytes().await?.to_vec()))
    }
}

#[async_trait]
impl ScoreSource for HttpStore {
    async fn scores(&self, ids: &[String]) -> Result<HashMap<String, Score>> {
        Ok(self.client.post(self.base.join("scores"))
            .json(ids)
            .send()
            .await?
            .error_for_status()?
            .json::<_>()
            .await?)
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.client.get(self.db_url(path)?)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("reading {path}"))?
            .json::<Option<Value>>()
            .await?)
    }
    async fn update(&self, updates: ChildUpdates) -> Result<()> {
        self.client.post(self.base.join("db"))
            .json(&updates)
            .send()
            .await?
            .error_for_status()
            .context("multi-path update")?;
        Ok(())
    }
    async fn delete(&self, path: &str) -> Result<()> {
        self.client.delete(self.db_url(path)?)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("deleting {path}"))?;
        Ok(())
    }
    async fn allocate_id(&self, parent: &str) -> Result<String> {
        Ok(self.client.post(self.url("push", parent)?)
            .send()
            .await?
            .error_for_status()?
            .json::<_>()
            .await?)
    }
    async fn upload_blob(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.client.put(self.url("blobs", path)?)
            .body(bytes)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("uploading {path}"))?;
        Ok(())
    }
    async fn delete_blob(&self, path: &str) -> Result<()> {
        self.client.delete(self.url("blobs", path)?)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("deleting blob {path}"))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpStore {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<()> {
        self.client.post(self.url("notify", user_id)?)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
