//! Realtime change feed over the Phoenix channel websocket
//!
//! The realtime service speaks the Phoenix channel protocol: one JSON object
//! per text frame (serializer `vsn=1.0.0`) with `topic`, `event`, `payload`,
//! `ref` and `join_ref`. A subscription
//!
//! 1. connects to `<project>/realtime/v1/websocket?apikey=...&vsn=1.0.0`,
//! 2. sends `phx_join` on its own topic with a `postgres_changes` config
//!    filtered to `user_id=eq.<owner>` and the session's access token,
//! 3. waits for the matching `phx_reply`, failing on `status: error`,
//! 4. then heartbeats on the `phoenix` topic and forwards every
//!    `postgres_changes` message as a [`ChangeEvent`] until it is closed, at
//!    which point it sends `phx_leave` and a close frame.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::SupabaseClient;
use crate::error::{BookmarkError, Result};
use crate::model::Session;
use crate::store::{parse_change_event, ChangeEvent, Subscription, SubscriptionHandle};

/// Phoenix serializer version of the frames below.
pub const PHOENIX_VSN: &str = "1.0.0";

/// Interval between heartbeats unless configured otherwise.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);
const LEAVE_TIMEOUT: Duration = Duration::from_secs(2);
const HEARTBEAT_TOPIC: &str = "phoenix";

type FeedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One Phoenix channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixFrame {
    fn new(
        topic: &str,
        event: &str,
        payload: serde_json::Value,
        reference: String,
        join_ref: Option<&str>,
    ) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
            join_ref: join_ref.map(str::to_string),
        }
    }
}

/// Where and how to open the change feed.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Websocket endpoint path, e.g. `/realtime/v1/websocket`
    pub path: String,
    /// Table whose changes are delivered
    pub table: String,
    pub heartbeat_interval: Duration,
}

/// Message refs for one socket.
#[derive(Debug, Default)]
struct Refs(u64);

impl Refs {
    fn next(&mut self) -> String {
        self.0 += 1;
        self.0.to_string()
    }
}

/// Websocket URL for `path`, carrying the API key and serializer version.
///
/// # Examples
///
/// ```
/// use bookmark_manager::supabase::{realtime, SupabaseClient};
///
/// let client = SupabaseClient::new("https://abcd.supabase.co", "anon-key").unwrap();
/// let url = realtime::websocket_url(&client, "/realtime/v1/websocket").unwrap();
/// assert_eq!(
///     url.as_str(),
///     "wss://abcd.supabase.co/realtime/v1/websocket?apikey=anon-key&vsn=1.0.0"
/// );
/// ```
pub fn websocket_url(client: &SupabaseClient, path: &str) -> Result<Url> {
    let mut url = client.endpoint(path)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(BookmarkError::Realtime(format!(
                "unsupported scheme for change feed: {other}"
            ))
            .into())
        }
    };
    if url.set_scheme(scheme).is_err() {
        return Err(
            BookmarkError::Realtime(format!("cannot switch change feed URL to {scheme}")).into(),
        );
    }
    url.query_pairs_mut()
        .append_pair("apikey", client.anon_key())
        .append_pair("vsn", PHOENIX_VSN);
    Ok(url)
}

/// Channel topic for the owner's feed on `table`.
pub fn channel_topic(table: &str, session: &Session) -> String {
    format!("realtime:{table}:{}", session.user_id)
}

fn join_payload(table: &str, session: &Session) -> serde_json::Value {
    json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": "*",
                "schema": "public",
                "table": table,
                "filter": format!("user_id=eq.{}", session.user_id),
            }],
            "private": false
        },
        "access_token": session.access_token,
    })
}

/// Joins the owner-filtered change channel for `settings.table`.
///
/// Returns once the join is acknowledged. The returned handle owns the
/// socket task; closing it leaves the channel, dropping it aborts the task.
pub async fn open_feed(
    client: &SupabaseClient,
    settings: &FeedSettings,
    session: &Session,
) -> Result<Subscription> {
    let url = websocket_url(client, &settings.path)?;
    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| BookmarkError::Realtime(format!("change feed connection failed: {e}")))?;

    let topic = channel_topic(&settings.table, session);
    let mut refs = Refs::default();
    let join_ref = refs.next();
    let join = PhoenixFrame::new(
        &topic,
        "phx_join",
        join_payload(&settings.table, session),
        join_ref.clone(),
        Some(&join_ref),
    );
    send_frame(&mut socket, &join).await?;

    match tokio::time::timeout(JOIN_TIMEOUT, await_reply(&mut socket, &topic, &join_ref)).await {
        Ok(reply) => reply?,
        Err(_) => {
            return Err(
                BookmarkError::Realtime("timed out joining change feed channel".to_string()).into(),
            )
        }
    }

    let (tx, events) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let channel = Channel {
        socket,
        topic,
        join_ref,
        refs,
    };
    let owner = session.user_id;
    let heartbeat = settings.heartbeat_interval;
    let task = tokio::spawn(async move {
        channel.run(heartbeat, tx, stop_rx).await;
        tracing::debug!(%owner, "change feed task ended");
    });

    tracing::info!(%owner, table = %settings.table, "change feed joined");
    Ok(Subscription {
        handle: SubscriptionHandle::new(owner, Some(task)).with_stop(stop_tx),
        events,
    })
}

async fn send_frame(socket: &mut FeedSocket, frame: &PhoenixFrame) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| BookmarkError::Realtime(format!("change feed send failed: {e}")))?;
    Ok(())
}

fn frame_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

/// Reads until the `phx_reply` for `expected_ref` on `topic` arrives.
async fn await_reply(socket: &mut FeedSocket, topic: &str, expected_ref: &str) -> Result<()> {
    while let Some(message) = socket.next().await {
        let message = message
            .map_err(|e| BookmarkError::Realtime(format!("change feed receive failed: {e}")))?;
        if matches!(message, Message::Close(_)) {
            break;
        }
        let Some(frame) =
            frame_text(message).and_then(|t| serde_json::from_str::<PhoenixFrame>(&t).ok())
        else {
            continue;
        };
        if frame.topic == topic
            && frame.event == "phx_reply"
            && frame.reference.as_deref() == Some(expected_ref)
        {
            return reply_status(&frame.payload);
        }
    }
    Err(BookmarkError::Realtime("change feed closed while joining".to_string()).into())
}

/// Maps a `phx_reply` payload to `Ok` or the rejection reason.
fn reply_status(payload: &serde_json::Value) -> Result<()> {
    let status = payload
        .get("status")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("error");
    if status == "ok" {
        return Ok(());
    }
    let reason = payload
        .get("response")
        .and_then(|r| r.get("reason").or_else(|| r.get("message")))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("no reason given");
    Err(BookmarkError::Realtime(format!("change feed join rejected: {reason}")).into())
}

/// Forwards the change carried by `frame`, if any.
///
/// Returns `false` once the feed should stop: the channel errored or
/// closed, or the receiver is gone.
fn dispatch(frame: PhoenixFrame, topic: &str, tx: &mpsc::UnboundedSender<ChangeEvent>) -> bool {
    if frame.topic != topic {
        return true;
    }
    match frame.event.as_str() {
        "postgres_changes" => {
            let Some(data) = frame.payload.get("data") else {
                tracing::warn!("postgres_changes message without data");
                return true;
            };
            match parse_change_event(data) {
                Ok(Some(event)) => tx.send(event).is_ok(),
                Ok(None) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed change payload");
                    true
                }
            }
        }
        "system" => {
            let status = frame.payload.get("status").and_then(serde_json::Value::as_str);
            if status == Some("error") {
                tracing::warn!(payload = %frame.payload, "realtime reported a channel error");
            }
            true
        }
        "phx_error" | "phx_close" => {
            tracing::warn!(event = %frame.event, "change feed channel ended");
            false
        }
        _ => true,
    }
}

/// A joined channel on an open socket.
struct Channel {
    socket: FeedSocket,
    topic: String,
    join_ref: String,
    refs: Refs,
}

impl Channel {
    async fn run(
        self,
        heartbeat: Duration,
        tx: mpsc::UnboundedSender<ChangeEvent>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let Channel {
            mut socket,
            topic,
            join_ref,
            mut refs,
        } = self;
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);

        loop {
            tokio::select! {
                signal = &mut stop => {
                    if signal.is_ok() {
                        leave(&mut socket, &topic, &join_ref, &mut refs).await;
                    }
                    return;
                }
                _ = tx.closed() => return,
                _ = ticker.tick() => {
                    let frame = PhoenixFrame::new(
                        HEARTBEAT_TOPIC,
                        "heartbeat",
                        json!({}),
                        refs.next(),
                        None,
                    );
                    if let Err(e) = send_frame(&mut socket, &frame).await {
                        tracing::warn!(error = %e, "change feed heartbeat failed");
                        return;
                    }
                }
                message = socket.next() => match message {
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!(%topic, "change feed socket closed");
                        return;
                    }
                    Some(Ok(message)) => {
                        let Some(text) = frame_text(message) else {
                            continue;
                        };
                        match serde_json::from_str::<PhoenixFrame>(&text) {
                            Ok(frame) => {
                                if !dispatch(frame, &topic, &tx) {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "discarding malformed realtime frame");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "change feed transport error");
                        return;
                    }
                },
            }
        }
    }
}

/// Sends `phx_leave` and closes the socket, giving up after a short wait.
async fn leave(socket: &mut FeedSocket, topic: &str, join_ref: &str, refs: &mut Refs) {
    let frame = PhoenixFrame::new(topic, "phx_leave", json!({}), refs.next(), Some(join_ref));
    let result = tokio::time::timeout(LEAVE_TIMEOUT, async {
        send_frame(socket, &frame).await?;
        socket
            .send(Message::Close(None))
            .await
            .map_err(|e| BookmarkError::Realtime(format!("change feed close failed: {e}")))?;
        Ok::<(), anyhow::Error>(())
    })
    .await;
    match result {
        Ok(Ok(())) => tracing::debug!(%topic, "left change feed channel"),
        Ok(Err(e)) => tracing::debug!(%topic, error = %e, "leaving change feed channel failed"),
        Err(_) => tracing::debug!(%topic, "timed out leaving change feed channel"),
    }
}
