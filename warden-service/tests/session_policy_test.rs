mod common;

use axum::http::StatusCode;
use common::{error_code, TestApp};
use serde_json::json;
use uuid::Uuid;
use warden_service::models::DataScope;

#[tokio::test]
async fn single_login_evicts_previous_session() {
    let app = TestApp::with_policy(true, 0);
    app.seed_user("alice", "hunter2", &[]);

    let (_, first_refresh) = app.login("alice", "hunter2").await;
    let (_, second_refresh) = app.login("alice", "hunter2").await;

    let (status, body) = app
        .post_json("/auth/refresh", json!({ "refresh_token": first_refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "session_revoked");

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": second_refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn max_sessions_evicts_oldest_first() {
    let app = TestApp::with_policy(false, 2);
    app.seed_user("alice", "hunter2", &[]);

    let (_, r1) = app.login("alice", "hunter2").await;
    let (_, r2) = app.login("alice", "hunter2").await;
    let (_, r3) = app.login("alice", "hunter2").await;

    let (status, body) = app
        .post_json("/auth/refresh", json!({ "refresh_token": r1 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "session_revoked");

    for token in [r2, r3] {
        let (status, _) = app
            .post_json("/auth/refresh", json!({ "refresh_token": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn sessions_are_independent_across_principals() {
    let app = TestApp::with_policy(true, 0);
    app.seed_user("alice", "hunter2", &[]);
    app.seed_user("bob", "hunter2", &[]);

    let (_, alice_refresh) = app.login("alice", "hunter2").await;
    let (_, _bob_refresh) = app.login("bob", "hunter2").await;

    // Bob's login must not evict Alice.
    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": alice_refresh }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_can_kick_a_session_by_id() {
    let app = TestApp::new();
    app.seed_user("root", "hunter2", &["admin"]);
    let target_id = app.seed_user("alice", "hunter2", &[]);

    let (admin_access, _) = app.login("root", "hunter2").await;
    let (_, alice_refresh) = app.login("alice", "hunter2").await;

    let (status, body) = app
        .get_auth(&format!("/users/{}/sessions", target_id), &admin_access)
        .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessions"][0]["session_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .delete_auth(&format!("/sessions/{}", session_id), &admin_access)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Kicking again is a no-op success.
    let (status, _) = app
        .delete_auth(&format!("/sessions/{}", session_id), &admin_access)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .post_json("/auth/refresh", json!({ "refresh_token": alice_refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "session_revoked");
}

#[tokio::test]
async fn kicking_unknown_session_is_not_found() {
    let app = TestApp::new();
    app.seed_user("root", "hunter2", &["admin"]);
    let (admin_access, _) = app.login("root", "hunter2").await;

    let (status, body) = app
        .delete_auth(&format!("/sessions/{}", Uuid::new_v4()), &admin_access)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "not_found");
}

#[tokio::test]
async fn kick_all_reports_revoked_count() {
    let app = TestApp::new();
    app.seed_user("root", "hunter2", &["admin"]);
    let target_id = app.seed_user("alice", "hunter2", &[]);

    let (admin_access, _) = app.login("root", "hunter2").await;
    app.login("alice", "hunter2").await;
    app.login("alice", "hunter2").await;

    let (status, body) = app
        .delete_auth(&format!("/users/{}/sessions", target_id), &admin_access)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 2);

    // All gone: a second pass revokes nothing.
    let (status, body) = app
        .delete_auth(&format!("/users/{}/sessions", target_id), &admin_access)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 0);
}

#[tokio::test]
async fn session_page_lists_active_sessions() {
    let app = TestApp::new();
    app.seed_user("ops", "hunter2", &["watch"]);
    app.seed_grant(
        "watch",
        DataScope::All,
        &[],
        &["monitor:session:list", "monitor:session:kick"],
    );
    app.seed_user("alice", "hunter2", &[]);
    app.seed_user("bob", "hunter2", &[]);

    let (ops_access, _) = app.login("ops", "hunter2").await;
    app.login("alice", "hunter2").await;
    app.login("bob", "hunter2").await;

    let (status, body) = app.get_auth("/sessions?limit=2", &ops_access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["sessions"].as_array().unwrap().len(), 2);
    // Tokens never appear in monitor output.
    assert!(body["sessions"][0].get("token").is_none());
}

#[tokio::test]
async fn sweep_deletes_long_expired_rows() {
    let app = TestApp::new();
    app.seed_user("alice", "hunter2", &[]);
    let (_, refresh) = app.login("alice", "hunter2").await;

    // Nothing has expired yet.
    let cutoff = chrono::Utc::now();
    let deleted = app.state.registry.sweep_expired(cutoff).await.unwrap();
    assert_eq!(deleted, 0);

    // A cutoff past the refresh TTL removes the row entirely.
    let cutoff = chrono::Utc::now() + chrono::Duration::days(8);
    let deleted = app.state.registry.sweep_expired(cutoff).await.unwrap();
    assert_eq!(deleted, 1);

    let (status, body) = app
        .post_json("/auth/refresh", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "token_invalid");
}
