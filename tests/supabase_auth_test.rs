//! Supabase session store against a `wiremock` auth service
//!
//! Covers the PKCE code exchange, refresh of an expired session, sign-out,
//! and mirroring of the current session into the session file.

use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookmark_manager::model::Session;
use bookmark_manager::session::SessionStore;
use bookmark_manager::session_file::SessionFile;
use bookmark_manager::supabase::auth::SupabaseSessionStore;
use bookmark_manager::supabase::SupabaseClient;
use bookmark_manager::BookmarkError;

const USER: &str = "6f1c2b2a-9b0e-4d35-8f55-0f8f6d0f2f01";

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer",
        "expires_in": 3600,
        "user": { "id": USER, "email": "me@example.com" }
    })
}

fn make_store(server: &MockServer, file: Option<SessionFile>) -> SupabaseSessionStore {
    let client = SupabaseClient::new(&server.uri(), "anon-key").expect("valid url");
    SupabaseSessionStore::new(client, file)
}

fn temp_session_file() -> (TempDir, SessionFile) {
    let dir = TempDir::new().expect("failed to create tempdir");
    let file = SessionFile::new(dir.path().join("session.json"));
    (dir, file)
}

fn saved_session(expires_at: chrono::DateTime<Utc>) -> Session {
    Session {
        user_id: Uuid::parse_str(USER).unwrap(),
        email: "me@example.com".to_string(),
        access_token: "stale".to_string(),
        refresh_token: "r-old".to_string(),
        expires_at: Some(expires_at),
    }
}

#[tokio::test]
async fn test_exchange_code_establishes_and_persists_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "pkce"))
        .and(header("apikey", "anon-key"))
        .and(body_json(json!({ "auth_code": "abc", "code_verifier": "verifier" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t1", "r1")))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, file) = temp_session_file();
    let store = make_store(&server, Some(file.clone()));
    let changes = store.auth_state_changes();

    let session = store
        .exchange_code_for_session("abc", Some("verifier".to_string()))
        .await
        .unwrap();

    assert_eq!(session.access_token, "t1");
    assert_eq!(session.refresh_token, "r1");
    assert_eq!(session.user_id.to_string(), USER);
    assert_eq!(changes.borrow().as_ref(), Some(&session));
    assert_eq!(file.load().unwrap(), Some(session));
}

#[tokio::test]
async fn test_rejected_exchange_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "pkce"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "invalid flow state, no valid flow state found"
        })))
        .mount(&server)
        .await;

    let store = make_store(&server, None);
    let err = store
        .exchange_code_for_session("used", Some("verifier".to_string()))
        .await
        .unwrap_err();

    assert_eq!(BookmarkError::exchange_status(&err), Some(400));
    assert!(err.to_string().contains("invalid flow state"));
    assert!(store.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_session_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({ "refresh_token": "r-old" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("t2", "r2")))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, file) = temp_session_file();
    file.save(&saved_session(Utc::now() - Duration::minutes(5)))
        .unwrap();
    let store = make_store(&server, Some(file.clone()));

    let session = store.current_session().await.unwrap().unwrap();
    assert_eq!(session.access_token, "t2");
    assert!(!session.is_expired());

    // Second read uses the refreshed session without another request.
    let again = store.current_session().await.unwrap().unwrap();
    assert_eq!(again.access_token, "t2");
    assert_eq!(file.load().unwrap().unwrap().refresh_token, "r2");
}

#[tokio::test]
async fn test_failed_refresh_signs_out_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_description": "Invalid Refresh Token"
        })))
        .mount(&server)
        .await;

    let (_dir, file) = temp_session_file();
    file.save(&saved_session(Utc::now() - Duration::minutes(5)))
        .unwrap();
    let store = make_store(&server, Some(file.clone()));

    let err = store.current_session().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BookmarkError>(),
        Some(BookmarkError::Auth(_))
    ));
    assert!(store.current_session().await.unwrap().is_none());
    assert!(file.load().unwrap().is_none());
}

#[tokio::test]
async fn test_sign_out_calls_logout_and_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, file) = temp_session_file();
    file.save(&saved_session(Utc::now() + Duration::hours(1)))
        .unwrap();
    let store = make_store(&server, Some(file.clone()));

    store.sign_out().await.unwrap();
    assert!(store.current_session().await.unwrap().is_none());
    assert!(file.load().unwrap().is_none());
}

#[tokio::test]
async fn test_failed_logout_still_clears_local_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, file) = temp_session_file();
    file.save(&saved_session(Utc::now() + Duration::hours(1)))
        .unwrap();
    let store = make_store(&server, Some(file));
    let changes = store.auth_state_changes();

    assert!(store.sign_out().await.is_err());
    assert!(changes.borrow().is_none());
}

#[tokio::test]
async fn test_sign_out_without_session_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let store = make_store(&server, None);
    store.sign_out().await.unwrap();
}
