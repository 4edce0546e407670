//! Supabase bookmark store against `wiremock` and a local websocket server
//!
//! Verifies the PostgREST requests (owner filters, ordering, headers) and
//! the realtime channel protocol against a local websocket server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookmark_manager::model::{NewBookmark, Session};
use bookmark_manager::store::{BookmarkStore, ChangeEvent, Subscription};
use bookmark_manager::supabase::rest::SupabaseBookmarkStore;
use bookmark_manager::supabase::SupabaseClient;
use bookmark_manager::BookmarkError;

const OWNER: &str = "6f1c2b2a-9b0e-4d35-8f55-0f8f6d0f2f01";
const ROW_ID: &str = "0b6d7c3e-2f59-4f55-9c3c-2a3e8a0c5b11";

fn session() -> Session {
    Session {
        user_id: Uuid::parse_str(OWNER).unwrap(),
        email: "me@example.com".to_string(),
        access_token: "t1".to_string(),
        refresh_token: "r1".to_string(),
        expires_at: None,
    }
}

fn make_store(base_url: &str) -> SupabaseBookmarkStore {
    let client = SupabaseClient::new(base_url, "anon-key").expect("valid url");
    SupabaseBookmarkStore::new(client, "bookmarks", "/realtime/v1/websocket")
}

fn row(id: &str, title: &str, created_at: &str) -> serde_json::Value {
    json!({
        "id": id,
        "url": format!("https://{title}.example"),
        "title": title,
        "user_id": OWNER,
        "created_at": created_at
    })
}

#[tokio::test]
async fn test_select_filters_by_owner_and_orders_newest_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("user_id", format!("eq.{OWNER}")))
        .and(query_param("order", "created_at.desc"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            row(ROW_ID, "new", "2024-05-02T00:00:00Z"),
            row("1d1c2b2a-9b0e-4d35-8f55-0f8f6d0f2f02", "old", "2024-05-01T00:00:00Z"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = make_store(&server.uri()).select(&session()).await.unwrap();
    let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["new", "old"]);
}

#[tokio::test]
async fn test_insert_posts_single_row_array() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .and(header("prefer", "return=minimal"))
        .and(body_json(json!([{
            "url": "https://www.rust-lang.org",
            "title": "Rust",
            "user_id": OWNER
        }])))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let store = make_store(&server.uri());
    store
        .insert(
            &session(),
            NewBookmark {
                url: "https://www.rust-lang.org".to_string(),
                title: "Rust".to_string(),
                user_id: Uuid::parse_str(OWNER).unwrap(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_is_scoped_to_owner() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/bookmarks"))
        .and(query_param("id", format!("eq.{ROW_ID}")))
        .and(query_param("user_id", format!("eq.{OWNER}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    make_store(&server.uri())
        .delete(&session(), Uuid::parse_str(ROW_ID).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rejected_insert_is_a_store_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookmarks"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "new row violates row-level security policy"
        })))
        .mount(&server)
        .await;

    let err = make_store(&server.uri())
        .insert(
            &session(),
            NewBookmark {
                url: "https://a.example".to_string(),
                title: "A".to_string(),
                user_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();

    match err.downcast_ref::<BookmarkError>() {
        Some(BookmarkError::Store(message)) => {
            assert!(message.contains("403"));
            assert!(message.contains("row-level security"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
}

/// Local stand-in for the realtime websocket.
///
/// Frames the client sends arrive on `inbound`; frames pushed to
/// `outbound` are sent to the client.
struct FakeRealtime {
    base_url: String,
    request_uri: oneshot::Receiver<String>,
    inbound: mpsc::UnboundedReceiver<Value>,
    outbound: mpsc::UnboundedSender<Value>,
}

impl FakeRealtime {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (uri_tx, request_uri) = oneshot::channel();
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback =
                |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(request.uri().to_string());
                    Ok(response)
                };
            let socket = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            let (mut sink, mut source) = socket.split();
            loop {
                tokio::select! {
                    frame = out_rx.recv() => match frame {
                        Some(frame) => {
                            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    message = source.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(serde_json::from_str(&text).unwrap());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            request_uri,
            inbound,
            outbound,
        }
    }

    async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.inbound.recv())
            .await
            .expect("client frame")
            .expect("socket open")
    }

    fn reply(&self, join: &Value, status: &str, response: Value) {
        self.outbound
            .send(json!({
                "topic": join["topic"],
                "event": "phx_reply",
                "payload": { "status": status, "response": response },
                "ref": join["ref"],
                "join_ref": join["join_ref"]
            }))
            .unwrap();
    }

    fn push_change(&self, topic: &Value, data: Value) {
        self.outbound
            .send(json!({
                "topic": topic,
                "event": "postgres_changes",
                "payload": { "data": data, "ids": [1] },
                "ref": null
            }))
            .unwrap();
    }
}

async fn next_event(subscription: &mut Subscription) -> Option<ChangeEvent> {
    tokio::time::timeout(Duration::from_secs(2), subscription.events.recv())
        .await
        .expect("change event")
}

#[tokio::test]
async fn test_subscribe_joins_owner_channel_and_decodes_changes() {
    let mut realtime = FakeRealtime::start().await;
    let store = make_store(&realtime.base_url);

    let owner = session();
    let (subscription, join) = tokio::join!(store.subscribe(&owner), async {
        let join = realtime.next_frame().await;
        realtime.reply(&join, "ok", json!({ "postgres_changes": [{ "id": 1 }] }));
        join
    });
    let mut subscription = subscription.unwrap();

    let uri = (&mut realtime.request_uri).await.unwrap();
    assert_eq!(uri, "/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0");
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["topic"], format!("realtime:bookmarks:{OWNER}"));
    assert_eq!(join["payload"]["access_token"], "t1");
    let change = &join["payload"]["config"]["postgres_changes"][0];
    assert_eq!(change["table"], "bookmarks");
    assert_eq!(change["filter"], format!("user_id=eq.{OWNER}"));

    let topic = join["topic"].clone();
    realtime.push_change(
        &topic,
        json!({
            "type": "INSERT",
            "table": "bookmarks",
            "record": row(ROW_ID, "Café", "2024-05-03T00:00:00+00:00"),
            "old_record": null,
            "errors": null
        }),
    );
    realtime.push_change(
        &topic,
        json!({
            "type": "DELETE",
            "table": "bookmarks",
            "record": {},
            "old_record": { "id": ROW_ID },
            "errors": null
        }),
    );

    let first = next_event(&mut subscription).await.unwrap();
    assert!(matches!(&first, ChangeEvent::Insert(row) if row.title == "Café"));
    assert_eq!(
        next_event(&mut subscription).await.unwrap(),
        ChangeEvent::Delete {
            id: Uuid::parse_str(ROW_ID).unwrap()
        }
    );

    store.unsubscribe(subscription.handle).await.unwrap();
    let leave = realtime.next_frame().await;
    assert_eq!(leave["event"], "phx_leave");
    assert_eq!(leave["topic"], topic);
    assert_eq!(leave["join_ref"], join["join_ref"]);
}

#[tokio::test]
async fn test_feed_sends_heartbeats() {
    let mut realtime = FakeRealtime::start().await;
    let store = make_store(&realtime.base_url).with_heartbeat_interval(Duration::from_millis(50));

    let owner = session();
    let (subscription, _) = tokio::join!(store.subscribe(&owner), async {
        let join = realtime.next_frame().await;
        realtime.reply(&join, "ok", json!({}));
    });
    let subscription = subscription.unwrap();

    let heartbeat = realtime.next_frame().await;
    assert_eq!(heartbeat["topic"], "phoenix");
    assert_eq!(heartbeat["event"], "heartbeat");
    assert!(heartbeat["ref"].is_string());

    store.unsubscribe(subscription.handle).await.unwrap();
}

#[tokio::test]
async fn test_channel_error_ends_the_feed() {
    let mut realtime = FakeRealtime::start().await;
    let store = make_store(&realtime.base_url);

    let owner = session();
    let (subscription, join) = tokio::join!(store.subscribe(&owner), async {
        let join = realtime.next_frame().await;
        realtime.reply(&join, "ok", json!({}));
        join
    });
    let mut subscription = subscription.unwrap();

    realtime
        .outbound
        .send(json!({
            "topic": join["topic"],
            "event": "phx_error",
            "payload": {},
            "ref": join["join_ref"]
        }))
        .unwrap();
    assert_eq!(next_event(&mut subscription).await, None);
}

#[tokio::test]
async fn test_rejected_join_is_a_realtime_error() {
    let mut realtime = FakeRealtime::start().await;
    let store = make_store(&realtime.base_url);

    let owner = session();
    let (result, _) = tokio::join!(store.subscribe(&owner), async {
        let join = realtime.next_frame().await;
        realtime.reply(&join, "error", json!({ "reason": "Invalid JWT" }));
    });

    let err = result.unwrap_err();
    match err.downcast_ref::<BookmarkError>() {
        Some(BookmarkError::Realtime(message)) => assert!(message.contains("Invalid JWT")),
        other => panic!("expected realtime error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_realtime_is_a_realtime_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = make_store(&format!("http://{addr}"))
        .subscribe(&session())
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BookmarkError>(),
        Some(BookmarkError::Realtime(_))
    ));
}
