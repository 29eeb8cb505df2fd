mod common;

use axum::http::StatusCode;
use common::{error_code, TestApp};
use serde_json::json;
use warden_service::models::DataScope;

const MONITOR_PERMS: &[&str] = &["monitor:session:list", "monitor:session:kick"];

/// Department tree: 10 -> 11 -> 12, with 20 as an unrelated branch.
fn seed_departments(app: &TestApp) {
    app.seed_department(10, 0, "");
    app.seed_department(11, 10, "10");
    app.seed_department(12, 11, "10,11");
    app.seed_department(20, 0, "");
}

#[tokio::test]
async fn dept_and_child_scope_covers_descendants_only() {
    let app = TestApp::new();
    seed_departments(&app);
    app.seed_grant("manager", DataScope::DeptAndChild, &[], MONITOR_PERMS);

    app.seed_user_full(
        "mgr",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &["manager"],
        Some(10),
    );
    let inside = app.seed_user_full(
        "inside",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(12),
    );
    let outside = app.seed_user_full(
        "outside",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(20),
    );

    app.login("inside", "hunter2").await;
    app.login("outside", "hunter2").await;
    let (access, _) = app.login("mgr", "hunter2").await;

    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", inside), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", outside), &access)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "permission_denied");

    // Kick follows the same boundary.
    let (status, _) = app
        .delete_auth(&format!("/users/{}/sessions", inside), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .delete_auth(&format!("/users/{}/sessions", outside), &access)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dept_scope_excludes_children() {
    let app = TestApp::new();
    seed_departments(&app);
    app.seed_grant("lead", DataScope::Dept, &[], MONITOR_PERMS);

    app.seed_user_full(
        "lead",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &["lead"],
        Some(10),
    );
    let peer = app.seed_user_full(
        "peer",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(10),
    );
    let child = app.seed_user_full(
        "child",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(11),
    );

    app.login("peer", "hunter2").await;
    app.login("child", "hunter2").await;
    let (access, _) = app.login("lead", "hunter2").await;

    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", peer), &access)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", child), &access)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn custom_scope_is_the_union_of_custom_roles() {
    let app = TestApp::new();
    seed_departments(&app);
    app.seed_grant("cust-a", DataScope::Custom, &[11], &["monitor:session:list"]);
    app.seed_grant("cust-b", DataScope::Custom, &[20], &["monitor:session:list"]);

    app.seed_user("auditor", "hunter2", &["cust-a", "cust-b"]);
    let in_11 = app.seed_user_full(
        "u11",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(11),
    );
    let in_12 = app.seed_user_full(
        "u12",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(12),
    );

    app.login("u11", "hunter2").await;
    app.login("u12", "hunter2").await;
    let (access, _) = app.login("auditor", "hunter2").await;

    // 11 and 20 are in scope; 12 is a child of 11 but custom sets do not expand.
    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", in_11), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", in_12), &access)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = app.get_auth("/users/me/permissions", &access).await;
    assert_eq!(body["data_scope"]["scope"], "custom");
    assert_eq!(body["data_scope"]["dept_ids"], json!([11, 20]));
}

#[tokio::test]
async fn self_only_scope_still_sees_own_sessions() {
    let app = TestApp::new();
    app.seed_grant("watch", DataScope::SelfOnly, &[], MONITOR_PERMS);
    let me = app.seed_user("alice", "hunter2", &["watch"]);
    let other = app.seed_user("bob", "hunter2", &[]);

    app.login("bob", "hunter2").await;
    let (access, _) = app.login("alice", "hunter2").await;

    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", me), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", other), &access)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn strongest_scope_wins_across_roles() {
    let app = TestApp::new();
    seed_departments(&app);
    app.seed_grant("narrow", DataScope::SelfOnly, &[], &["monitor:session:list"]);
    app.seed_grant("wide", DataScope::All, &[], &[]);

    app.seed_user("alice", "hunter2", &["narrow", "wide"]);
    let other = app.seed_user_full(
        "bob",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(20),
    );
    app.login("bob", "hunter2").await;

    let (access, _) = app.login("alice", "hunter2").await;
    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", other), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let app = TestApp::new();
    app.seed_grant("watch", DataScope::All, &[], &["monitor:session:list"]);
    app.seed_user("alice", "hunter2", &["watch"]);
    let (access, _) = app.login("alice", "hunter2").await;

    // Scope All never consults the target, so a missing principal simply has
    // no sessions; a scoped caller gets 404 instead.
    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", uuid::Uuid::new_v4()), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["sessions"].as_array().unwrap().is_empty());

    let app = TestApp::new();
    app.seed_grant("watch", DataScope::Dept, &[], &["monitor:session:list"]);
    app.seed_user_full(
        "alice",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &["watch"],
        Some(10),
    );
    let (access, _) = app.login("alice", "hunter2").await;
    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", uuid::Uuid::new_v4()), &access)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "not_found");
}

#[tokio::test]
async fn scope_outage_degrades_to_self_only() {
    let app = TestApp::new();
    seed_departments(&app);
    app.seed_grant("manager", DataScope::DeptAndChild, &[], MONITOR_PERMS);
    let mgr = app.seed_user_full(
        "mgr",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &["manager"],
        Some(10),
    );
    let target = app.seed_user_full(
        "alice",
        "hunter2",
        warden_service::models::PrincipalStatus::Active,
        &[],
        Some(12),
    );
    app.login("alice", "hunter2").await;

    let (access, _) = app.login("mgr", "hunter2").await;
    // Warm the permission cache so the outage hits scope resolution, not the
    // permission check.
    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", target), &access)
        .await;
    assert_eq!(status, StatusCode::OK);

    // During the outage the scope falls closed to self-only: cross-user reads
    // are denied rather than erroring, and the caller's own sessions stay
    // reachable.
    app.directory.set_failing(true);
    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", target), &access)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "permission_denied");

    let (status, _) = app
        .get_auth(&format!("/users/{}/sessions", mgr), &access)
        .await;
    assert_eq!(status, StatusCode::OK);
}
