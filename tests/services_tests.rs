//! Admin services, the OTP sign-up flow and the cache-backed query.

mod common;

use std::sync::atomic::Ordering;

use serde_json::json;
use tempfile::tempdir;

use common::{Harness, MockState};
use panel_client::api::auth::CompleteRegistrationRequest;
use panel_client::api::roles::{Role, RoleRequest};
use panel_client::api::users::UserDto;
use panel_client::api::{AuthService, CachedQuery, Mutation, MutationPhase, PermissionService, RoleService, UserService};
use panel_client::client::{NoticeLevel, RequestConfig};
use panel_client::storage::{FileStorage, KvStorage};

async fn logged_in(state: &std::sync::Arc<MockState>) -> Harness {
    let base = common::spawn(state.clone()).await;
    let h = Harness::new(&base);
    AuthService::new(h.client.clone()).login("09121234567", "secret").await.unwrap();
    h
}

#[tokio::test]
async fn role_crud_round() {
    let state = MockState::new();
    let h = logged_in(&state).await;
    let roles = RoleService::new(h.client.clone());

    let listed = roles.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Admin");

    let created = roles
        .create(&RoleRequest { name: "Operator".into(), description: Some("desk staff".into()) })
        .await
        .unwrap();
    assert_eq!(created.id, "r2");
    assert_eq!(created.description.as_deref(), Some("desk staff"));

    let ids = vec!["p1".to_string(), "p2".to_string()];
    roles.assign_permissions(&created.id, &ids).await.unwrap();
    assert_eq!(state.assigned.lock()[0], json!({ "role": "r2", "body": ["p1", "p2"] }));

    roles.delete(&created.id).await.unwrap();
    assert_eq!(roles.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_role_keeps_conflict_details() {
    let state = MockState::new();
    let mut h = logged_in(&state).await;
    let roles = RoleService::new(h.client.clone());

    let err = roles.create(&RoleRequest { name: "Admin".into(), description: None }).await.unwrap_err();
    assert_eq!(err.message(), "role already exists");
    assert_eq!(err.http_status(), Some(409));
    let notices = h.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn names_in_paths_are_percent_encoded() {
    let state = MockState::new();
    let h = logged_in(&state).await;
    let p = PermissionService::new(h.client.clone()).by_name("read users/all").await.unwrap();
    assert_eq!(p.name, "read users/all");
}

#[tokio::test]
async fn otp_signup_flow() {
    let state = MockState::new();
    let base = common::spawn(state.clone()).await;
    let h = Harness::new(&base);
    let auth = AuthService::new(h.client.clone());

    auth.send_otp("09121234567").await.unwrap();
    let session = auth.otp().current().unwrap();
    assert_eq!(session.phone, "09121234567");
    assert!(!session.verified);

    let err = auth.verify_otp("09121234567", "0000").await.unwrap_err();
    assert_eq!(err.message(), "invalid code");
    assert!(!auth.otp().current().unwrap().verified);

    assert!(auth.verify_otp("09121234567", "1234").await.unwrap());
    assert!(auth.otp().current().unwrap().verified);

    let bad = CompleteRegistrationRequest {
        phone_number: "09121234567".into(),
        password: "a".into(),
        confirm_password: "b".into(),
        ..Default::default()
    };
    let err = auth.complete_registration(&bad).await.unwrap_err();
    assert_eq!(err.message(), "passwords do not match");
    assert!(auth.otp().current().is_some());

    let good = CompleteRegistrationRequest { confirm_password: "a".into(), ..bad };
    auth.complete_registration(&good).await.unwrap();
    assert!(auth.otp().current().is_none());
}

#[tokio::test]
async fn cached_query_serves_stale_data_across_restarts() {
    let state = MockState::new();
    let base = common::spawn(state.clone()).await;
    let dir = tempdir().unwrap();
    let path = dir.path().join("panel-store.json");

    {
        let h = Harness::with_storage(common::test_config(&base), FileStorage::shared(&path).unwrap());
        let query = UserService::new(h.client.clone()).list_query();
        assert!(query.state().is_loading);
        assert!(query.refetch().await);
        let s = query.state();
        assert!(!s.is_loading);
        assert_eq!(s.data.as_ref().map(Vec::len), Some(2));
        assert!(h.storage.get("api-cache-Home/UsersList").is_some());
    }

    // a fresh client on the same file sees the cached list before any request
    state.users_fail.store(true, Ordering::SeqCst);
    let mut h = Harness::with_storage(common::test_config(&base), FileStorage::shared(&path).unwrap());
    let query: CachedQuery<Vec<UserDto>> = CachedQuery::new(&h.client, "/Home/UsersList");
    let s = query.state();
    assert!(!s.is_loading);
    assert_eq!(s.data.as_ref().unwrap()[1].full_name, "Operator");

    query.spawn_refetch().await.unwrap();
    let s = query.state();
    assert_eq!(s.data.as_ref().map(Vec::len), Some(2));
    assert_eq!(s.error.as_deref(), Some("Internal Server Error"));
    let notices = h.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert!(!query.is_empty());
}

#[tokio::test]
async fn mutation_rolls_back_a_failed_create() {
    let state = MockState::new();
    let h = logged_in(&state).await;
    let roles = RoleService::new(h.client.clone());

    let before = roles.list().await.unwrap();
    let mut names = Mutation::new(Some(before.iter().map(|r| r.name.clone()).collect::<Vec<_>>()));
    let mut optimistic = names.data().cloned().unwrap_or_default();
    optimistic.push("Admin".into());

    let out = names
        .run(Some(optimistic), async {
            roles
                .create(&RoleRequest { name: "Admin".into(), description: None })
                .await
                .map(|r| vec![r.name])
        })
        .await;
    assert!(out.is_err());
    assert_eq!(names.phase(), MutationPhase::RolledBack);
    assert_eq!(names.data(), Some(&vec!["Admin".to_string()]));
    assert_eq!(names.error(), Some("role already exists"));
}

#[tokio::test]
async fn announced_mutation_shows_the_server_message() {
    let state = MockState::new();
    let mut h = logged_in(&state).await;
    h.drain_notices();

    let mut created: Mutation<Role> = Mutation::new(None);
    let request = RoleRequest { name: "Auditor".into(), description: None };
    let role = created
        .run_announced(&h.client, None, h.client.post("admin/roles", &request, &RequestConfig::default()))
        .await
        .unwrap();
    assert_eq!(role.name, "Auditor");
    assert_eq!(created.phase(), MutationPhase::Committed);

    let notices = h.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Success);
    assert_eq!(notices[0].message, "created");
}
