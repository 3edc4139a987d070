//! An in-process remote tree that records every call made against it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use anyhow::{bail, Result};
use async_trait::async_trait;
use rivals_common::paths::{self, check_disjoint, is_ancestor, normalize};
use rivals_common::{tree, ChildUpdates, Notification, Parsed, Score};
use serde_json::Value;
use crate::store::{Notifier, RemoteStore, ScoreSource};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    Read(String),
    Update(Vec<String>),
    Delete(String),
    AllocateId(String),
    UploadBlob(String),
    DeleteBlob(String),
    Scores(Vec<String>),
    Notify(String),
}
impl Call {
    pub fn is_write(&self) -> bool {
        !matches!(self, Call::Read(_) | Call::AllocateId(_) | Call::Scores(_))
    }
}

#[derive(Default)]
struct Inner {
    root: Value,
    blobs: BTreeMap<String, Vec<u8>>,
    calls: Vec<Call>,
    failing: Vec<String>,
    failing_blobs: bool,
    next_id: u64,
}
impl Inner {
    fn check_writable<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for path in paths {
            if let Some(prefix) = self.failing.iter().find(|prefix| is_ancestor(prefix, path)) {
                bail!("write to `{path}` rejected under `{prefix}`");
            }
        }
        Ok(())
    }
    fn next_key(&mut self) -> String {
        self.next_id += 1;
        format!("k{:04}", self.next_id)
    }
}

/// Clones share the same tree, so a test can keep one handle and give another to the code under test.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes directly, without recording a call.
    pub fn seed(&self, path: &str, value: Value) {
        tree::set(&mut self.state().root, path, value);
    }

    /// Makes every later write at or below `prefix` fail.
    pub fn fail_writes_under(&self, prefix: &str) {
        self.state().failing.push(prefix.trim_matches('/').to_string());
    }

    pub fn fail_blob_uploads(&self) {
        self.state().failing_blobs = true;
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        tree::get(&self.state().root, path).cloned()
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.state().blobs.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn score_lookups(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Scores(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self, user_id: &str) -> Vec<Notification> {
        match self.get(&paths::notifications(user_id)) {
            Some(Value::Object(entries)) => entries.into_iter().filter_map(|(_, v)| Parsed::from_value(v).ok()).collect(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl ScoreSource for MemoryStore {
    async fn scores(&self, ids: &[String]) -> Result<HashMap<String, Score>> {
        let mut state = self.state();
        state.calls.push(Call::Scores(ids.to_vec()));
        let mut scores = HashMap::new();
        for id in ids {
            if let Some(value) = tree::get(&state.root, &paths::user_score(id)) {
                if let Parsed::Record(score) = Parsed::<Score>::from_value(value.clone()) {
                    scores.insert(id.clone(), score);
                }
            }
        }
        Ok(scores)
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        let path = normalize(path)?;
        let mut state = self.state();
        state.calls.push(Call::Read(path.clone()));
        Ok(tree::get(&state.root, &path).cloned())
    }

    async fn update(&self, updates: ChildUpdates) -> Result<()> {
        let updates = updates
            .into_iter()
            .map(|(path, value)| -> Result<(String, Value)> { Ok((normalize(&path)?, value)) })
            .collect::<Result<Vec<_>>>()?;
        let mut state = self.state();
        state.calls.push(Call::Update(updates.iter().map(|(path, _)| path.clone()).collect()));
        check_disjoint(updates.iter().map(|(path, _)| path.as_str()))?;
        state.check_writable(updates.iter().map(|(path, _)| path.as_str()))?;
        for (path, value) in updates {
            tree::set(&mut state.root, &path, value);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut state = self.state();
        state.calls.push(Call::Delete(path.clone()));
        state.check_writable([path.as_str()])?;
        tree::remove(&mut state.root, &path);
        Ok(())
    }

    async fn allocate_id(&self, parent: &str) -> Result<String> {
        let parent = normalize(parent)?;
        let mut state = self.state();
        state.calls.push(Call::AllocateId(parent));
        Ok(state.next_key())
    }

    async fn upload_blob(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let path = normalize(path)?;
        let mut state = self.state();
        state.calls.push(Call::UploadBlob(path.clone()));
        if state.failing_blobs {
            bail!("blob upload to `{path}` rejected");
        }
        state.check_writable([path.as_str()])?;
        state.blobs.insert(path, bytes);
        Ok(())
    }

    async fn delete_blob(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut state = self.state();
        state.calls.push(Call::DeleteBlob(path.clone()));
        state.check_writable([path.as_str()])?;
        state.blobs.remove(&path);
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryStore {
    async fn notify(&self, user_id: &str, notification: &Notification) -> Result<()> {
        let parent = normalize(&paths::notifications(user_id))?;
        let value = serde_json::to_value(notification)?;
        let mut state = self.state();
        state.calls.push(Call::Notify(user_id.to_string()));
        state.check_writable([parent.as_str()])?;
        let key = state.next_key();
        tree::set(&mut state.root, &paths::child(&parent, &key), value);
        Ok(())
    }
}
