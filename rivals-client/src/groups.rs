use std::collections::BTreeMap;
use anyhow::Context;
use futures::future::join_all;
use rivals_common::paths;
use rivals_common::{
    ChildUpdates, Friend, Group, GroupIndexEntry, GroupMember, GroupRecord, GroupState, MemberRecord, Notification,
    Parsed,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use crate::reconcile::{FriendReconciler, RawMember};
use crate::session::Session;
use crate::store::{Notifier, RemoteStore};
use crate::{Result, SyncError};

/// Per-item results of a fanned-out write. A failed item never fails the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub items: Vec<(String, anyhow::Result<()>)>,
}
impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|(_, result)| result.is_ok())
    }
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter(|(_, r)| r.is_ok()).map(|(id, _)| id.as_str())
    }
    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter(|(_, r)| r.is_err()).map(|(id, _)| id.as_str())
    }
}

#[derive(Debug)]
pub enum GroupRemoval {
    /// The owner deleted the group; one item per member index entry removed.
    Deleted(BatchOutcome),
    /// A guest left; the group itself is untouched.
    Left,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupDetails {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub member_count: usize,
}

#[derive(Deserialize)]
struct GroupHeader {
    uid: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    members: Map<String, Value>,
}

/// Turns group membership intents into writes against the remote tree.
pub struct GroupSyncService<S, N> {
    store: S,
    notifier: N,
}

impl<S: RemoteStore, N: Notifier> GroupSyncService<S, N> {
    pub fn new(store: S, notifier: N) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// The groups indexed under `user_id`. Nothing stored means no groups.
    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<Group>> {
        let Some(index) = self.store.read(&paths::user_groups(user_id)).await? else {
            return Ok(Vec::new());
        };
        let Value::Object(entries) = index else {
            warn!(user = user_id, "group index is not a map");
            return Ok(Vec::new());
        };
        let mut groups = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            match Parsed::<GroupIndexEntry>::from_value(entry) {
                Parsed::Record(entry) => groups.push(Group::new(id, entry.name, entry.state)),
                Parsed::Malformed(reason) => warn!(user = user_id, group = %id, %reason, "skipping group index entry"),
            }
        }
        debug!(user = user_id, groups = groups.len(), "listed groups");
        Ok(groups)
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Option<GroupDetails>> {
        let Some(value) = self.store.read(&paths::group(group_id)).await? else {
            return Ok(None);
        };
        match Parsed::<GroupHeader>::from_value(value) {
            Parsed::Record(header) => Ok(Some(GroupDetails {
                id: group_id.to_string(),
                owner: header.uid,
                name: header.name,
                description: header.description,
                member_count: header.members.len(),
            })),
            Parsed::Malformed(reason) => {
                warn!(group = group_id, %reason, "skipping malformed group");
                Ok(None)
            }
        }
    }

    /// Every key of the member map, parseable or not.
    async fn member_ids(&self, group_id: &str) -> Result<Vec<String>> {
        match self.store.read(&paths::group_members(group_id)).await? {
            Some(Value::Object(entries)) => Ok(entries.into_iter().map(|(id, _)| id).collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn raw_members(&self, group_id: &str) -> Result<Vec<RawMember>> {
        let Some(value) = self.store.read(&paths::group_members(group_id)).await? else {
            return Ok(Vec::new());
        };
        let Value::Object(entries) = value else {
            warn!(group = group_id, "member map is not a map");
            return Ok(Vec::new());
        };
        Ok(entries
            .into_iter()
            .filter_map(|(id, entry)| match Parsed::<MemberRecord>::from_value(entry) {
                Parsed::Record(record) => Some(RawMember::new(id, record.name, record.state)),
                Parsed::Malformed(reason) => {
                    warn!(group = group_id, member = %id, %reason, "skipping member");
                    None
                }
            })
            .collect())
    }

    /// Members of `group`, scored from the roster or one batched lookup.
    /// Order follows the stored map and is not stable across calls.
    pub async fn get_members(&self, session: &Session, group: &Group) -> Result<Vec<GroupMember>> {
        let raw = self.raw_members(&group.id).await?;
        Ok(FriendReconciler::new(&session.roster).reconcile(raw, &self.store).await?)
    }

    /// Creates a group owned by the session user. The image upload is best
    /// effort: if it fails the group still exists.
    pub async fn create_group(
        &self,
        session: &mut Session,
        name: &str,
        description: &str,
        image: Option<Vec<u8>>,
    ) -> Result<Group> {
        let key = self.store.allocate_id(paths::GROUPS).await?;
        let user = &session.user;
        let record = GroupRecord {
            uid: user.uid.clone(),
            name: name.to_string(),
            description: description.to_string(),
            members: BTreeMap::from([(user.uid.clone(), MemberRecord { name: user.name.clone(), state: GroupState::Own })]),
        };
        let entry = GroupIndexEntry { name: name.to_string(), state: GroupState::Own };

        let mut updates = ChildUpdates::new();
        updates.insert(paths::group(&key), encode(&record)?);
        updates.insert(paths::user_group(&user.uid, &key), encode(&entry)?);
        self.store.update(updates).await.with_context(|| format!("creating group {key}"))?;
        info!(group = %key, owner = %user.uid, "created group");

        if let Some(image) = image {
            session.images.insert(key.clone(), image.clone());
            if let Err(err) = self.store.upload_blob(&paths::group_image(&key), image).await {
                warn!(group = %key, "image upload failed: {err:#}");
            }
        }

        Ok(Group { id: key, name: name.to_string(), description: description.to_string(), state: GroupState::Own })
    }

    /// Invites every friend with an independent write, notifying each invitee whose write landed.
    pub async fn invite_members(&self, session: &Session, friends: &[Friend], group: &Group) -> BatchOutcome {
        let results = join_all(friends.iter().map(|friend| self.invite(session, friend, group))).await;
        let outcome = BatchOutcome { items: friends.iter().map(|f| f.id.clone()).zip(results).collect() };
        for id in outcome.failed() {
            warn!(group = %group.id, invitee = id, "invite failed");
        }
        outcome
    }

    async fn invite(&self, session: &Session, friend: &Friend, group: &Group) -> anyhow::Result<()> {
        let mut updates = ChildUpdates::new();
        updates.insert(
            paths::group_member(&group.id, &friend.id),
            encode(&MemberRecord { name: friend.name.clone(), state: GroupState::Invited })?,
        );
        updates.insert(
            paths::user_group(&friend.id, &group.id),
            encode(&GroupIndexEntry { name: group.name.clone(), state: GroupState::Invited })?,
        );
        self.store.update(updates).await?;
        info!(group = %group.id, invitee = %friend.id, "invited member");

        let notification = Notification::GroupInvite {
            group_id: group.id.clone(),
            group_name: group.name.clone(),
            from: session.user.uid.clone(),
            from_name: session.user.name.clone(),
        };
        if let Err(err) = self.notifier.notify(&friend.id, &notification).await {
            warn!(invitee = %friend.id, "notification not delivered: {err:#}");
        }
        Ok(())
    }

    /// Owner only. Fails without touching the store for anyone else.
    pub async fn remove_member(&self, member: &GroupMember, group: &Group) -> Result<()> {
        if !group.is_owned() {
            return Err(SyncError::PermissionDenied);
        }
        self.store.update(removal(&group.id, &member.id)).await?;
        info!(group = %group.id, member = %member.id, "removed member");
        Ok(())
    }

    pub async fn accept_invitation(&self, session: &Session, group: &Group) -> Result<()> {
        if group.state != GroupState::Invited {
            return Err(SyncError::InvalidState(group.state));
        }
        let uid = &session.user.uid;
        // the invitation may have been revoked since `group` was fetched
        let current = self.store.read(&paths::group_member(&group.id, uid)).await?;
        match current.map(Parsed::<MemberRecord>::from_value) {
            Some(Parsed::Record(record)) if record.state == GroupState::Invited => {}
            Some(Parsed::Record(record)) => return Err(SyncError::InvalidState(record.state)),
            _ => {
                warn!(group = %group.id, member = %uid, "no pending invitation");
                return Err(SyncError::InvalidState(group.state));
            }
        }
        let member = Value::from(GroupState::Member.as_str());
        let mut updates = ChildUpdates::new();
        updates.insert(paths::child(&paths::group_member(&group.id, uid), "state"), member.clone());
        updates.insert(paths::child(&paths::user_group(uid, &group.id), "state"), member);
        self.store.update(updates).await?;
        info!(group = %group.id, member = %uid, "accepted invitation");
        Ok(())
    }

    /// The owner deletes the group for everyone; anyone else only leaves it.
    pub async fn delete_group(&self, session: &mut Session, group: &Group) -> Result<GroupRemoval> {
        let uid = session.user.uid.clone();
        if !group.is_owned() {
            self.store.update(removal(&group.id, &uid)).await?;
            info!(group = %group.id, member = %uid, "left group");
            return Ok(GroupRemoval::Left);
        }

        let mut ids = self.member_ids(&group.id).await?;
        if !ids.contains(&uid) {
            ids.push(uid);
        }
        let index_paths: Vec<String> = ids.iter().map(|id| paths::user_group(id, &group.id)).collect();
        let results = join_all(index_paths.iter().map(|path| self.store.delete(path))).await;
        let outcome = BatchOutcome { items: ids.into_iter().zip(results).collect() };
        for id in outcome.failed() {
            warn!(group = %group.id, member = id, "group index entry not removed");
        }

        self.store
            .delete(&paths::group(&group.id))
            .await
            .with_context(|| format!("deleting group {}", group.id))?;
        if let Err(err) = self.store.delete_blob(&paths::group_image(&group.id)).await {
            warn!(group = %group.id, "image not removed: {err:#}");
        }
        session.images.remove(&group.id);
        info!(group = %group.id, "deleted group");
        Ok(GroupRemoval::Deleted(outcome))
    }
}

/// Both sides of one membership, removed in a single atomic update.
fn removal(group_id: &str, member_id: &str) -> ChildUpdates {
    ChildUpdates::from([
        (paths::group_member(group_id, member_id), Value::Null),
        (paths::user_group(member_id, group_id), Value::Null),
    ])
}

fn encode<T: Serialize>(value: &T) -> anyhow::Result<Value> {
    serde_json::to_value(value).context("encoding record")
}
