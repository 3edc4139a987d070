pub mod friend;
pub mod paths;
pub mod tree;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use friend::Friend;

/// Score fields hold this until the real value has been loaded.
pub const UNKNOWN_SCORE: i64 = -1;

/// Multi-location update: every key is a path, every value replaces the subtree at that path.
/// A `null` value deletes the subtree.
pub type ChildUpdates = BTreeMap<String, Value>;

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct Url(pub String);
impl Url {
    pub fn join(&self, route: impl AsRef<str>) -> String {
        String::from(self.0.trim_end_matches('/')) + "/" + route.as_ref().trim_start_matches('/')
    }
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    Own,
    Invited,
    Member,
}
impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Own => "own",
            GroupState::Invited => "invited",
            GroupState::Member => "member",
        }
    }
}
impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for GroupState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "own" => Ok(GroupState::Own),
            "invited" => Ok(GroupState::Invited),
            "member" => Ok(GroupState::Member),
            other => Err(format!("unknown group state `{other}`")),
        }
    }
}

/// Stored under `groups/{group}/members/{member}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct MemberRecord {
    pub name: String,
    pub state: GroupState,
}

/// Stored under `users/{user}/groups/{group}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct GroupIndexEntry {
    pub name: String,
    pub state: GroupState,
}

/// Stored under `groups/{group}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct GroupRecord {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: BTreeMap<String, MemberRecord>,
}

/// Overall record of a player, stored under `users/{user}/score`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct Score {
    pub wins: i64,
    pub losses: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    GroupInvite {
        group_id: String,
        group_name: String,
        from: String,
        from_name: String,
    },
}

/// Outcome of decoding one dynamic value fetched from the remote tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Parsed<T> {
    Record(T),
    Malformed(String),
}
impl<T: DeserializeOwned> Parsed<T> {
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value(value) {
            Ok(record) => Parsed::Record(record),
            Err(err) => Parsed::Malformed(err.to_string()),
        }
    }
}
impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Record(record) => Some(record),
            Parsed::Malformed(_) => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: String,
    pub state: GroupState,
}
impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: GroupState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            state,
        }
    }
    /// Only the owner may remove other members or delete the group.
    pub fn is_owned(&self) -> bool {
        self.state == GroupState::Own
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupMember {
    pub id: String,
    pub name: String,
    pub state: GroupState,
    pub wins: i64,
    pub loses: i64,
    /// Head-to-head wins of the session user against this member.
    pub h_wins: i64,
    pub h_loses: i64,
}
impl GroupMember {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: GroupState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
            wins: UNKNOWN_SCORE,
            loses: UNKNOWN_SCORE,
            h_wins: UNKNOWN_SCORE,
            h_loses: UNKNOWN_SCORE,
        }
    }
    pub fn has_score(&self) -> bool {
        self.wins != UNKNOWN_SCORE && self.loses != UNKNOWN_SCORE
    }
}
