use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use anyhow::{anyhow, ensure, Context, Result};
use rivals_common::paths::{self, check_disjoint, normalize, segments};
use rivals_common::{tree, ChildUpdates, Notification, Parsed, Score};
use serde_json::Value;
use sled::{Batch, Db, IVec, Tree};
use tracing::debug;
use uuid::Uuid;

/// The document tree, flattened into one sled key per leaf, plus blob storage.
#[derive(Clone)]
pub struct Store {
    db: Db,
    docs: Tree,
    blobs: Tree,
    writes: Arc<Mutex<()>>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::from_db(sled::open(path).with_context(|| format!("opening {}", path.display()))?)
    }

    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            docs: db.open_tree("docs")?,
            blobs: db.open_tree("blobs")?,
            db,
            writes: Arc::new(Mutex::new(())),
        })
    }

    pub fn read(&self, path: &str) -> Result<Option<Value>> {
        let path = normalize(path)?;
        if let Some(leaf) = self.docs.get(&path)? {
            return Ok(Some(serde_json::from_slice(&leaf)?));
        }
        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        let mut leaves: Vec<(String, Value)> = Vec::new();
        for item in self.docs.scan_prefix(&prefix) {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec())?;
            leaves.push((key[prefix.len()..].to_string(), serde_json::from_slice(&value)?));
        }
        if leaves.is_empty() {
            return Ok(None);
        }
        Ok(Some(tree::unflatten(leaves)))
    }

    /// Replaces every listed subtree in one sled batch.
    pub fn update(&self, updates: ChildUpdates) -> Result<()> {
        let mut normalized = Vec::with_capacity(updates.len());
        for (path, value) in updates {
            let path = normalize(&path)?;
            ensure!(!path.is_empty() || value.is_object() || value.is_null(), "the root must be a map");
            normalized.push((path, value));
        }
        check_disjoint(normalized.iter().map(|(path, _)| path.as_str()))?;

        let _guard = self.writes.lock().map_err(|_| anyhow!("write lock poisoned"))?;
        let mut batch = Batch::default();
        for (path, value) in &normalized {
            for key in self.covered_keys(path)? {
                batch.remove(key);
            }
            for (key, leaf) in tree::flatten(path, value) {
                batch.insert(key.as_bytes(), serde_json::to_vec(&leaf)?);
            }
        }
        self.docs.apply_batch(batch)?;
        debug!(paths = normalized.len(), "applied update");
        Ok(())
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.update(ChildUpdates::from([(path.to_string(), Value::Null)]))
    }

    /// Keys a write at `path` replaces: leaves at or below it, and leaves sitting on its ancestors.
    fn covered_keys(&self, path: &str) -> Result<Vec<IVec>> {
        let mut keys = Vec::new();
        let segments = segments(path);
        for end in 1..segments.len() {
            let ancestor = segments[..end].join("/");
            if self.docs.contains_key(&ancestor)? {
                keys.push(IVec::from(ancestor.as_bytes()));
            }
        }
        if path.is_empty() {
            for item in self.docs.iter() {
                keys.push(item?.0);
            }
            return Ok(keys);
        }
        if self.docs.contains_key(path)? {
            keys.push(IVec::from(path.as_bytes()));
        }
        for item in self.docs.scan_prefix(format!("{path}/")) {
            keys.push(item?.0);
        }
        Ok(keys)
    }

    /// A new child key under `parent`. Nothing is written.
    pub fn allocate_id(&self, parent: &str) -> Result<String> {
        let parent = normalize(parent)?;
        loop {
            let key = Uuid::new_v4().simple().to_string();
            if self.read(&paths::child(&parent, &key))?.is_none() {
                return Ok(key);
            }
        }
    }

    pub fn scores(&self, ids: &[String]) -> Result<HashMap<String, Score>> {
        let mut scores = HashMap::new();
        for id in ids {
            let Ok(path) = normalize(&paths::user_score(id)) else { continue };
            if let Some(value) = self.read(&path)? {
                if let Parsed::Record(score) = Parsed::<Score>::from_value(value) {
                    scores.insert(id.clone(), score);
                }
            }
        }
        Ok(scores)
    }

    pub fn notify(&self, user_id: &str, notification: &Notification) -> Result<String> {
        let parent = paths::notifications(user_id);
        let key = self.allocate_id(&parent)?;
        self.update(ChildUpdates::from([(paths::child(&parent, &key), serde_json::to_value(notification)?)]))?;
        Ok(key)
    }

    pub fn put_blob(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.insert(normalize(path)?.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn blob(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(normalize(path)?.as_bytes())?.map(|bytes| bytes.to_vec()))
    }

    pub fn delete_blob(&self, path: &str) -> Result<()> {
        self.blobs.remove(normalize(path)?.as_bytes())?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    fn store() -> Store {
        Store::temporary().unwrap()
    }

    #[test]
    fn update_writes_every_path() {
        let store = store();
        store
            .update(ChildUpdates::from([
                ("/groups/g1".to_string(), json!({"uid": "u1", "name": "Chess", "members": {"u1": {"name": "Ann", "state": "own"}}})),
                ("/users/u1/groups/g1".to_string(), json!({"name": "Chess", "state": "own"})),
            ]))
            .unwrap();
        assert_eq!(store.read("groups/g1/members/u1").unwrap(), Some(json!({"name": "Ann", "state": "own"})));
        assert_eq!(store.read("users/u1/groups/g1/state").unwrap(), Some(json!("own")));
        assert_eq!(store.read("groups/g2").unwrap(), None);
    }

    #[test]
    fn update_replaces_the_subtree() {
        let store = store();
        store.update(ChildUpdates::from([("a".to_string(), json!({"x": 1, "y": {"z": 2}}))])).unwrap();
        store.update(ChildUpdates::from([("a".to_string(), json!({"x": 3}))])).unwrap();
        assert_eq!(store.read("a").unwrap(), Some(json!({"x": 3})));
    }

    #[test]
    fn writing_below_a_leaf_replaces_the_leaf() {
        let store = store();
        store.update(ChildUpdates::from([("a/b".to_string(), json!(1))])).unwrap();
        store.update(ChildUpdates::from([("a/b/c".to_string(), json!(2))])).unwrap();
        assert_eq!(store.read("a").unwrap(), Some(json!({"b": {"c": 2}})));
    }

    #[test]
    fn delete_removes_subtree_only() {
        let store = store();
        store
            .update(ChildUpdates::from([
                ("groups/g1".to_string(), json!({"name": "Chess"})),
                ("groups/g10".to_string(), json!({"name": "Go"})),
            ]))
            .unwrap();
        store.delete("groups/g1").unwrap();
        assert_eq!(store.read("groups/g1").unwrap(), None);
        assert_eq!(store.read("groups/g10/name").unwrap(), Some(json!("Go")));
    }

    #[test]
    fn overlapping_paths_are_rejected_without_writing() {
        let store = store();
        let result = store.update(ChildUpdates::from([
            ("groups/g1".to_string(), json!({"name": "Chess"})),
            ("groups/g1/name".to_string(), json!("Go")),
        ]));
        assert!(result.unwrap_err().downcast_ref::<paths::PathError>().is_some());
        assert_eq!(store.read("groups").unwrap(), None);
    }

    #[test]
    fn scores_skip_missing_and_malformed() {
        let store = store();
        store
            .update(ChildUpdates::from([
                ("users/u1/score".to_string(), json!({"wins": 3, "losses": 1})),
                ("users/u2/score".to_string(), json!("n/a")),
            ]))
            .unwrap();
        let scores = store.scores(&["u1".to_string(), "u2".to_string(), "u3".to_string()]).unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["u1"], Score { wins: 3, losses: 1 });
    }

    #[test]
    fn notifications_are_appended() {
        let store = store();
        let note = Notification::GroupInvite {
            group_id: "g1".into(),
            group_name: "Chess".into(),
            from: "u1".into(),
            from_name: "Ann".into(),
        };
        let first = store.notify("u2", &note).unwrap();
        let second = store.notify("u2", &note).unwrap();
        assert_ne!(first, second);
        let Some(Value::Object(inbox)) = store.read("notifications/u2").unwrap() else { panic!("no inbox") };
        assert_eq!(inbox.len(), 2);
    }

    #[test]
    fn blobs_round_trip() {
        let store = store();
        store.put_blob("groups/g1", &[1, 2, 3]).unwrap();
        assert_eq!(store.blob("/groups/g1").unwrap(), Some(vec![1, 2, 3]));
        store.delete_blob("groups/g1").unwrap();
        store.delete_blob("groups/g1").unwrap();
        assert_eq!(store.blob("groups/g1").unwrap(), None);
    }
}
