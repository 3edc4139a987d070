use std::collections::{HashMap, HashSet};
use anyhow::Result;
use rivals_common::{GroupMember, GroupState, Score};
use tracing::debug;
use crate::session::Roster;
use crate::store::ScoreSource;

/// One decoded entry of a group's member map.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawMember {
    pub id: String,
    pub name: String,
    pub state: GroupState,
}
impl RawMember {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: GroupState) -> Self {
        Self { id: id.into(), name: name.into(), state }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Partition {
    pub members: Vec<GroupMember>,
    /// Ids absent from the roster, each listed once.
    pub unknown: Vec<String>,
}

/// Enriches group members with scores, from the roster where possible and
/// from a single batched lookup for everyone else.
pub struct FriendReconciler<'a> {
    roster: &'a Roster,
}

impl<'a> FriendReconciler<'a> {
    pub fn new(roster: &'a Roster) -> Self {
        Self { roster }
    }

    pub fn partition(&self, raw: impl IntoIterator<Item = RawMember>) -> Partition {
        let mut partition = Partition::default();
        let mut seen = HashSet::new();
        for raw in raw {
            if !seen.insert(raw.id.clone()) {
                continue;
            }
            let mut member = GroupMember::new(raw.id, raw.name, raw.state);
            match self.roster.get(&member.id) {
                Some(friend) => {
                    member.wins = friend.wins;
                    member.loses = friend.loses;
                    // the friend record is kept from the friend's side
                    member.h_wins = friend.losses_against;
                    member.h_loses = friend.wins_against;
                }
                None => partition.unknown.push(member.id.clone()),
            }
            partition.members.push(member);
        }
        partition
    }

    pub async fn reconcile<S>(&self, raw: impl IntoIterator<Item = RawMember>, source: &S) -> Result<Vec<GroupMember>>
    where
        S: ScoreSource + ?Sized,
    {
        let Partition { mut members, unknown } = self.partition(raw);
        debug!(members = members.len(), unknown = unknown.len(), "partitioned members");
        if unknown.is_empty() {
            return Ok(members);
        }
        let scores = source.scores(&unknown).await?;
        merge_scores(&mut members, &unknown, &scores);
        Ok(members)
    }
}

/// Copies looked-up scores onto the members whose ids were looked up.
pub fn merge_scores(members: &mut [GroupMember], looked_up: &[String], scores: &HashMap<String, Score>) {
    let looked_up: HashSet<&str> = looked_up.iter().map(String::as_str).collect();
    for member in members.iter_mut().filter(|m| looked_up.contains(m.id.as_str())) {
        if let Some(score) = scores.get(&member.id) {
            member.wins = score.wins;
            member.loses = score.losses;
        }
    }
}

#[cfg(test)]
mod tests {
    use rivals_common::{Friend, Score, UNKNOWN_SCORE};
    use serde_json::json;
    use crate::memory::MemoryStore;
    use super::*;

    fn roster() -> Roster {
        let mut bob = Friend::new("u2", "Bob");
        bob.wins = 7;
        bob.loses = 2;
        bob.wins_against = 3;
        bob.losses_against = 5;
        [bob].into_iter().collect()
    }

    fn member<'a>(members: &'a [GroupMember], id: &str) -> &'a GroupMember {
        members.iter().find(|m| m.id == id).unwrap()
    }

    #[test]
    fn head_to_head_is_inverted() {
        let roster = roster();
        let partition = FriendReconciler::new(&roster).partition([RawMember::new("u2", "Bob", GroupState::Member)]);
        let bob = &partition.members[0];
        assert_eq!((bob.wins, bob.loses), (7, 2));
        assert_eq!(bob.h_wins, 5);
        assert_eq!(bob.h_loses, 3);
        assert!(partition.unknown.is_empty());
    }

    #[test]
    fn strangers_are_listed_once() {
        let roster = roster();
        let partition = FriendReconciler::new(&roster).partition([
            RawMember::new("u3", "Cleo", GroupState::Invited),
            RawMember::new("u2", "Bob", GroupState::Member),
            RawMember::new("u3", "Cleo", GroupState::Invited),
        ]);
        assert_eq!(partition.members.len(), 2);
        assert_eq!(partition.unknown, vec!["u3".to_string()]);
    }

    #[tokio::test]
    async fn known_members_skip_the_lookup() {
        let store = MemoryStore::new();
        let roster = roster();
        let members = FriendReconciler::new(&roster)
            .reconcile([RawMember::new("u2", "Bob", GroupState::Member)], &store)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
        assert!(store.score_lookups().is_empty());
    }

    #[tokio::test]
    async fn strangers_share_one_lookup() {
        let store = MemoryStore::new();
        store.seed("users/u3/score", json!({"wins": 4, "losses": 1}));
        let roster = roster();
        let members = FriendReconciler::new(&roster)
            .reconcile(
                [
                    RawMember::new("u2", "Bob", GroupState::Member),
                    RawMember::new("u3", "Cleo", GroupState::Member),
                    RawMember::new("u4", "Dan", GroupState::Invited),
                ],
                &store,
            )
            .await
            .unwrap();

        let lookups = store.score_lookups();
        assert_eq!(lookups.len(), 1);
        let mut ids = lookups[0].clone();
        ids.sort();
        assert_eq!(ids, vec!["u3".to_string(), "u4".to_string()]);

        let cleo = member(&members, "u3");
        assert_eq!((cleo.wins, cleo.loses), (4, 1));
        assert_eq!(cleo.h_wins, UNKNOWN_SCORE);
        let dan = member(&members, "u4");
        assert!(!dan.has_score());
    }

    #[test]
    fn merge_ignores_ids_that_were_not_requested() {
        let mut members = vec![GroupMember::new("u2", "Bob", GroupState::Member), GroupMember::new("u3", "Cleo", GroupState::Member)];
        let scores = HashMap::from([
            ("u2".to_string(), Score { wins: 9, losses: 9 }),
            ("u3".to_string(), Score { wins: 1, losses: 0 }),
        ]);
        merge_scores(&mut members, &["u3".to_string()], &scores);
        assert!(!members[0].has_score());
        assert_eq!(members[1].wins, 1);
    }
}
