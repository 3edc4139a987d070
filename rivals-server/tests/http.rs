use std::collections::HashSet;
use std::net::TcpListener;
use rivals_client::{CurrentUser, GroupRemoval, GroupSyncService, HttpStore, RemoteStore, Roster, Session, ClientConfig};
use rivals_common::{ChildUpdates, Friend, GroupState, Notification};
use rivals_server::{router, State};
use serde_json::json;

fn serve() -> HttpStore {
    HttpStore::new(&ClientConfig::new(serve_url()))
}

fn service(store: &HttpStore) -> GroupSyncService<HttpStore, HttpStore> {
    GroupSyncService::new(store.clone(), store.clone())
}

#[tokio::test]
async fn group_lifecycle_over_http() {
    let store = serve();
    let groups = service(&store);

    let mut ann = Session::new(CurrentUser::new("u1", "Ann"));
    let mut bob = Session::with_roster(CurrentUser::new("u2", "Bob"), Roster::new());

    let group = groups.create_group(&mut ann, "Chess", "Tuesdays", Some(vec![1, 2, 3])).await.unwrap();
    assert_eq!(store.download_blob(&format!("groups/{}", group.id)).await.unwrap(), Some(vec![1, 2, 3]));
    let details = groups.get_group(&group.id).await.unwrap().unwrap();
    assert_eq!((details.owner.as_str(), details.member_count), ("u1", 1));

    let outcome = groups.invite_members(&ann, &[Friend::new("u2", "Bob")], &group).await;
    assert!(outcome.is_complete());
    let Some(inbox) = store.read("notifications/u2").await.unwrap() else { panic!("no notification") };
    let note: Notification = serde_json::from_value(inbox.as_object().unwrap().values().next().unwrap().clone()).unwrap();
    assert!(matches!(note, Notification::GroupInvite { ref from, .. } if from == "u1"));

    let bob_groups = groups.list_groups("u2").await.unwrap();
    assert_eq!(bob_groups.len(), 1);
    assert_eq!(bob_groups[0].state, GroupState::Invited);
    groups.accept_invitation(&bob, &bob_groups[0]).await.unwrap();
    assert_eq!(store.read(&format!("users/u2/groups/{}/state", group.id)).await.unwrap(), Some(json!("member")));

    store
        .update(ChildUpdates::from([("users/u2/score".to_string(), json!({"wins": 5, "losses": 2}))]))
        .await
        .unwrap();
    let members = groups.get_members(&ann, &group).await.unwrap();
    let ids: HashSet<&str> = members.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["u1", "u2"]));
    let scored = members.iter().find(|m| m.id == "u2").unwrap();
    assert_eq!((scored.wins, scored.loses), (5, 2));

    let mut as_member = bob_groups[0].clone();
    as_member.state = GroupState::Member;
    assert!(matches!(groups.delete_group(&mut bob, &as_member).await.unwrap(), GroupRemoval::Left));
    assert_eq!(store.read(&format!("users/u2/groups/{}", group.id)).await.unwrap(), None);
    assert!(store.read(&format!("groups/{}", group.id)).await.unwrap().is_some());

    assert!(matches!(groups.delete_group(&mut ann, &group).await.unwrap(), GroupRemoval::Deleted(_)));
    assert_eq!(store.read(&format!("groups/{}", group.id)).await.unwrap(), None);
    assert_eq!(store.read("users/u1/groups").await.unwrap(), None);
    assert_eq!(store.download_blob(&format!("groups/{}", group.id)).await.unwrap(), None);
}

#[tokio::test]
async fn overlapping_update_is_a_client_error() {
    let store = serve();
    let result = store
        .update(ChildUpdates::from([
            ("groups/g1".to_string(), json!({"name": "Chess"})),
            ("groups/g1/name".to_string(), json!("Go")),
        ]))
        .await;
    let err = result.unwrap_err();
    let status = err.downcast_ref::<reqwest::Error>().and_then(|e| e.status());
    assert_eq!(status, Some(reqwest::StatusCode::BAD_REQUEST));
}

#[tokio::test]
async fn absent_paths_read_as_none() {
    let store = serve();
    assert_eq!(store.read("groups/nope").await.unwrap(), None);
}

/// Serves a fresh temporary database on an ephemeral port.
fn serve_url() -> String {
    let state = State::temporary().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(axum::Server::from_tcp(listener).unwrap().serve(router(state).into_make_service()));
    format!("http://{addr}")
}
