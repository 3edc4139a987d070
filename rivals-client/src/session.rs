use std::collections::HashMap;
use rivals_common::Friend;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CurrentUser {
    pub uid: String,
    pub name: String,
}
impl CurrentUser {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self { uid: uid.into(), name: name.into() }
    }
    pub fn as_friend(&self) -> Friend {
        Friend::new(self.uid.clone(), self.name.clone())
    }
}

/// Known friends of the session user, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    friends: HashMap<String, Friend>,
}
impl Roster {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, friend: Friend) -> Option<Friend> {
        self.friends.insert(friend.id.clone(), friend)
    }
    pub fn remove(&mut self, id: &str) -> Option<Friend> {
        self.friends.remove(id)
    }
    pub fn get(&self, id: &str) -> Option<&Friend> {
        self.friends.get(id)
    }
    pub fn contains(&self, id: &str) -> bool {
        self.friends.contains_key(id)
    }
    pub fn len(&self) -> usize {
        self.friends.len()
    }
    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Friend> {
        self.friends.values()
    }
}
impl FromIterator<Friend> for Roster {
    fn from_iter<I: IntoIterator<Item = Friend>>(iter: I) -> Self {
        let mut roster = Roster::new();
        for friend in iter {
            roster.insert(friend);
        }
        roster
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImageCache {
    images: HashMap<String, Vec<u8>>,
}
impl ImageCache {
    pub fn insert(&mut self, id: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(id.into(), bytes);
    }
    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.images.get(id).map(Vec::as_slice)
    }
    pub fn remove(&mut self, id: &str) -> Option<Vec<u8>> {
        self.images.remove(id)
    }
}

/// Everything an operation may know about the signed-in user.
///
/// Operations read the roster but never change it; folding fetched data back
/// into the roster is left to whoever owns the session.
#[derive(Clone, Debug)]
pub struct Session {
    pub user: CurrentUser,
    pub roster: Roster,
    pub images: ImageCache,
}
impl Session {
    pub fn new(user: CurrentUser) -> Self {
        Self { user, roster: Roster::new(), images: ImageCache::default() }
    }
    pub fn with_roster(user: CurrentUser, roster: Roster) -> Self {
        Self { roster, ..Self::new(user) }
    }

    /// The session user for their own id, the cached friend, or [`Friend::empty`].
    pub fn friend(&self, id: &str) -> Friend {
        if id == self.user.uid {
            return self.user.as_friend();
        }
        self.roster.get(id).cloned().unwrap_or_else(Friend::empty)
    }

    pub fn avatar(&self, friend: &Friend) -> Option<&[u8]> {
        self.images.get(&friend.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let roster = [Friend::new("u2", "Bob")].into_iter().collect();
        Session::with_roster(CurrentUser::new("u1", "Ann"), roster)
    }

    #[test]
    fn friend_lookup_prefers_session_user() {
        let session = session();
        assert_eq!(session.friend("u1").name, "Ann");
        assert_eq!(session.friend("u2").name, "Bob");
        assert!(session.friend("u9").is_empty());
    }

    #[test]
    fn avatar_comes_from_image_cache() {
        let mut session = session();
        let bob = session.friend("u2");
        assert_eq!(session.avatar(&bob), None);
        session.images.insert("u2", vec![1, 2, 3]);
        assert_eq!(session.avatar(&bob), Some(&[1u8, 2, 3][..]));
    }
}
