use std::hash::{Hash, Hasher};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::{Parsed, UNKNOWN_SCORE};

/// A player in the session user's roster. Identity is the id alone.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "FriendRecord")]
pub struct Friend {
    pub id: String,
    pub name: String,
    pub accepted: bool,
    /// Games this friend won against the session user.
    pub wins_against: i64,
    pub losses_against: i64,
    pub wins: i64,
    pub loses: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FriendRecord {
    friend_id: String,
    name: String,
    #[serde(default)]
    accepted: Option<Flag>,
    #[serde(default)]
    wins_against: i64,
    #[serde(default)]
    losses_against: i64,
}

/// `accepted` is written as a bool by this crate and as 0/1 by older clients.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl From<FriendRecord> for Friend {
    fn from(record: FriendRecord) -> Self {
        let accepted = match record.accepted {
            None => true,
            Some(Flag::Bool(b)) => b,
            Some(Flag::Int(i)) => i != 0,
        };
        Friend {
            id: record.friend_id,
            name: record.name,
            accepted,
            wins_against: record.wins_against,
            losses_against: record.losses_against,
            wins: UNKNOWN_SCORE,
            loses: UNKNOWN_SCORE,
        }
    }
}

impl Friend {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Friend {
            id: id.into(),
            name: name.into(),
            accepted: true,
            wins_against: 0,
            losses_against: 0,
            wins: UNKNOWN_SCORE,
            loses: UNKNOWN_SCORE,
        }
    }

    /// Not-found sentinel handed out by lookups instead of an error.
    pub fn empty() -> Self {
        Friend {
            accepted: false,
            ..Friend::new("", "")
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty() && self.name.is_empty()
    }

    pub fn decode(value: Value) -> Parsed<Friend> {
        Parsed::from_value(value)
    }

    /// The subset of fields written back to the remote tree.
    pub fn simplify(&self) -> Value {
        json!({
            "friendId": self.id,
            "name": self.name,
            "accepted": self.accepted,
        })
    }

    /// `W: 3` / `L: 1`, or an empty string while the score is unknown.
    pub fn score_label(&self, overall: bool) -> String {
        let (index, score) = if overall { ("W", self.wins) } else { ("L", self.loses) };
        if score == UNKNOWN_SCORE {
            String::new()
        } else {
            format!("{index}: {score}")
        }
    }
}

impl PartialEq for Friend {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Friend {}
impl Hash for Friend {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}
