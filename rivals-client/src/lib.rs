pub mod groups;
pub mod http;
pub mod memory;
pub mod reconcile;
pub mod session;
pub mod store;

use std::env;
use rivals_common::{GroupState, Url};
use thiserror::Error;

pub use groups::{BatchOutcome, GroupDetails, GroupRemoval, GroupSyncService};
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use reconcile::{FriendReconciler, RawMember};
pub use session::{CurrentUser, ImageCache, Roster, Session};
pub use store::{Notifier, RemoteStore, ScoreSource};

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("only the group owner may do this")]
    PermissionDenied,

    #[error("group is `{0}`, expected an invitation")]
    InvalidState(GroupState),

    #[error("remote store failed: {0:#}")]
    Remote(#[from] anyhow::Error),
}

pub const SERVER_URL_VAR: &str = "RIVALS_SERVER_URL";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub server_url: Url,
}
impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self { server_url: Url(server_url.into()) }
    }
    pub fn from_env() -> Self {
        env::var(SERVER_URL_VAR).map(Self::new).unwrap_or_default()
    }
}
impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8000")
    }
}
