use crate::feed::config::RuntimeConfig;
use crate::feed::error_handler::{ReconnectBackoff, RetriesExhausted};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{interval, sleep_until, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const RECORD_SEPARATOR: char = '\u{1e}';

type FeedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub enum ClientError {
    Connection(String),
    WebSocket(tungstenite::Error),
    PingTimeout(Duration),
    RetriesExhausted(u32),
}

impl From<RetriesExhausted> for ClientError {
    fn from(err: RetriesExhausted) -> Self {
        ClientError::RetriesExhausted(err.attempts)
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::WebSocket(err)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ClientError::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            ClientError::PingTimeout(after) => {
                write!(f, "No traffic for {}s after keepalive ping", after.as_secs())
            }
            ClientError::RetriesExhausted(attempts) => {
                write!(f, "Gave up after {} reconnect attempts", attempts)
            }
        }
    }
}

impl std::error::Error for ClientError {}

/// Receiver of everything the feed connection produces.
///
/// Frames are delivered in arrival order. Returning `Break` from `on_frame`
/// ends the feed without reconnecting.
#[async_trait]
pub trait FeedHandler: Send {
    async fn on_connect(&mut self);

    async fn on_frame(&mut self, frame: Vec<u8>, received_at: DateTime<Utc>) -> ControlFlow<()>;

    async fn on_disconnect(&mut self, reason: &str);

    async fn on_error(&mut self, err: &ClientError);
}

/// How a connected session ended without a transport error
#[derive(Debug, PartialEq)]
enum SessionEnd {
    Closed(String),
    Stopped,
}

/// SignalR JSON protocol negotiation
pub fn handshake_frame() -> String {
    format!(
        "{}{}",
        serde_json::json!({"protocol": "json", "version": 1}),
        RECORD_SEPARATOR
    )
}

/// Guest hub invocation that subscribes to the game events
pub fn guest_frame(activity: u32, currency: u32) -> String {
    let invocation = serde_json::json!({
        "arguments": [{"activity": activity, "currency": currency}],
        "invocationId": "0",
        "target": "Guest",
        "type": 1,
    });
    format!("{}{}", invocation, RECORD_SEPARATOR)
}

async fn connect(config: &RuntimeConfig) -> Result<FeedSocket, ClientError> {
    let (mut ws, _response) = timeout(CONNECT_TIMEOUT, connect_async(config.feed_url.as_str()))
        .await
        .map_err(|_| {
            ClientError::Connection(format!("timed out after {}s", CONNECT_TIMEOUT.as_secs()))
        })??;

    ws.send(Message::Text(handshake_frame())).await?;
    ws.send(Message::Text(guest_frame(config.activity, config.currency)))
        .await?;

    Ok(ws)
}

/// Pump one connected socket until it closes, fails, or the handler stops
async fn pump<H: FeedHandler + ?Sized>(
    mut ws: FeedSocket,
    config: &RuntimeConfig,
    handler: &mut H,
) -> Result<SessionEnd, ClientError> {
    let mut ping_timer = interval(config.ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping_timer.tick().await;

    let mut pong_deadline: Option<Instant> = None;
    let mut frames = 0u64;

    loop {
        tokio::select! {
            msg = ws.next() => {
                pong_deadline = None;

                let payload = match msg {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("code={}, msg={}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return Ok(SessionEnd::Closed(reason));
                    }
                    Some(Ok(_)) => continue, // ping / pong, answered by tungstenite
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(SessionEnd::Closed("stream ended".to_string())),
                };

                frames += 1;
                if frames == 1 {
                    log::info!("📥 First frame received ({} bytes)", payload.len());
                }

                if handler.on_frame(payload, Utc::now()).await.is_break() {
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Stopped);
                }
            }

            _ = ping_timer.tick() => {
                ws.send(Message::Ping(Vec::new())).await?;
                pong_deadline.get_or_insert_with(|| Instant::now() + config.ping_timeout);
            }

            _ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                return Err(ClientError::PingTimeout(config.ping_timeout));
            }
        }
    }
}

/// Connect, pump, and reconnect with exponential backoff.
///
/// Returns `Ok` once the handler stops the feed, or `RetriesExhausted` after too
/// many consecutive failed attempts. Backoff resets on every successful
/// connect.
pub async fn run_with_reconnect<H: FeedHandler + ?Sized>(
    config: &RuntimeConfig,
    handler: &mut H,
) -> Result<(), ClientError> {
    let mut backoff = ReconnectBackoff::from_config(config);

    loop {
        log::info!("🔌 Connecting to feed: {}", config.feed_url);

        match connect(config).await {
            Ok(ws) => {
                log::info!("✅ Connected to feed, subscribed as guest");
                backoff.reset();
                handler.on_connect().await;

                match pump(ws, config, handler).await {
                    Ok(SessionEnd::Stopped) => {
                        log::info!("✅ Feed stopped by consumer");
                        return Ok(());
                    }
                    Ok(SessionEnd::Closed(reason)) => {
                        log::warn!("### closed ### {}", reason);
                        handler.on_disconnect(&reason).await;
                    }
                    Err(e) => {
                        log::error!("❌ Feed error: {}", e);
                        handler.on_error(&e).await;
                        handler.on_disconnect(&e.to_string()).await;
                    }
                }
            }
            Err(e) => {
                log::error!("❌ Connection failed: {}", e);
                handler.on_error(&e).await;
            }
        }

        backoff.wait().await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_frames() {
        let handshake = handshake_frame();
        assert!(handshake.ends_with('\u{1e}'));

        let value: serde_json::Value =
            serde_json::from_str(handshake.trim_end_matches('\u{1e}')).unwrap();
        assert_eq!(value["protocol"], "json");
        assert_eq!(value["version"], 1);

        let guest = guest_frame(30, 87);
        let value: serde_json::Value =
            serde_json::from_str(guest.trim_end_matches('\u{1e}')).unwrap();
        assert_eq!(value["target"], "Guest");
        assert_eq!(value["type"], 1);
        assert_eq!(value["invocationId"], "0");
        assert_eq!(value["arguments"][0]["activity"], 30);
        assert_eq!(value["arguments"][0]["currency"], 87);
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(
            ClientError::PingTimeout(Duration::from_secs(5)).to_string(),
            "No traffic for 5s after keepalive ping"
        );
        assert_eq!(
            ClientError::from(RetriesExhausted { attempts: 10 }).to_string(),
            "Gave up after 10 reconnect attempts"
        );
    }
}
