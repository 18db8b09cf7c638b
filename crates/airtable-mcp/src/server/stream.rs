//! Server-sent event channel for `GET /mcp`.
//!
//! A keep-alive stream: one `connection` event, then a `ping` every
//! heartbeat interval. Nothing else pushes into it. Events carry a
//! strictly increasing numeric id; history is not retained, so a
//! `Last-Event-ID` reconnect gets a fresh stream under the same session.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::Event;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};

/// Payloads carried by the channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelEvent {
    Connection {
        session_id: String,
        timestamp: String,
    },
    Ping { timestamp: String },
}

impl ChannelEvent {
    /// SSE `event:` name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Ping { .. } => "ping",
        }
    }
}

/// One encoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: u64,
    pub event: &'static str,
    pub data: String,
}

impl Frame {
    fn encode(id: u64, event: &ChannelEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id,
            event: event.name(),
            data: serde_json::to_string(event)?,
        })
    }

    fn error(id: u64, message: &str) -> Self {
        let data = serde_json::json!({"error": "Stream error", "message": message});
        Self {
            id,
            event: "error",
            data: data.to_string(),
        }
    }

    /// Convert to an axum SSE event.
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        Event::default()
            .id(self.id.to_string())
            .event(self.event)
            .data(&self.data)
    }
}

/// Logs when the stream is dropped, which is how client disconnects surface.
struct CloseGuard {
    session_id: String,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        tracing::debug!(session_id = %self.session_id, "Event stream closed");
    }
}

/// A per-connection event stream.
#[derive(Debug, Clone)]
pub struct StreamChannel {
    session_id: String,
    heartbeat: Duration,
}

impl StreamChannel {
    /// Open a channel, reusing `session_id` when the caller supplied one.
    #[must_use]
    pub fn open(session_id: Option<String>, heartbeat: Duration) -> Self {
        let session_id = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            session_id,
            heartbeat: heartbeat.max(Duration::from_millis(1)),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The event sequence. Ends only on an encoding fault, after an `error` frame.
    pub fn frames(self) -> impl Stream<Item = Frame> + Send + 'static {
        let Self {
            session_id,
            heartbeat,
        } = self;

        async_stream::stream! {
            let _guard = CloseGuard {
                session_id: session_id.clone(),
            };
            let mut next_id: u64 = 0;

            let connection = ChannelEvent::Connection {
                session_id: session_id.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            };
            match Frame::encode(next_id, &connection) {
                Ok(frame) => yield frame,
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %e,
                        "Event stream failed"
                    );
                    yield Frame::error(next_id, &e.to_string());
                    return;
                }
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                next_id += 1;
                let ping = ChannelEvent::Ping {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                match Frame::encode(next_id, &ping) {
                    Ok(frame) => yield frame,
                    Err(e) => {
                        tracing::error!(
                            session_id = %session_id,
                            error = %e,
                            "Event stream failed"
                        );
                        yield Frame::error(next_id, &e.to_string());
                        return;
                    }
                }
            }
        }
    }

    /// The event sequence as axum SSE events.
    pub fn into_sse(self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        self.frames().map(|frame| Ok(frame.to_sse_event()))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl LogBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs() -> (LogBuf, tracing::subscriber::DefaultGuard) {
        let logs = LogBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_then_heartbeats() {
        let channel = StreamChannel::open(None, Duration::from_secs(30));
        let session_id = channel.session_id().to_string();
        let frames: Vec<Frame> = channel.frames().take(3).collect().await;

        assert_eq!(frames.iter().map(|f| f.id).collect::<Vec<_>>(), [0, 1, 2]);
        assert_eq!(frames[0].event, "connection");
        assert_eq!(frames[1].event, "ping");
        assert_eq!(frames[2].event, "ping");

        let data: serde_json::Value = serde_json::from_str(&frames[0].data).unwrap();
        assert_eq!(data["type"], "connection");
        assert_eq!(data["session_id"], session_id.as_str());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_waits_for_interval() {
        let start = Instant::now();
        let mut frames = Box::pin(StreamChannel::open(None, Duration::from_secs(30)).frames());
        frames.next().await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
        frames.next().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_between_heartbeats() {
        let mut frames = tokio_test::task::spawn(Box::pin(
            StreamChannel::open(None, Duration::from_secs(10)).frames(),
        ));
        let first = tokio_test::assert_ready!(frames.poll_next());
        assert_eq!(first.map(|f| f.event), Some("connection"));
        tokio_test::assert_pending!(frames.poll_next());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(frames.is_woken());
        let ping = tokio_test::assert_ready!(frames.poll_next());
        assert_eq!(ping.map(|f| f.id), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_pending_closes_cleanly() {
        let (logs, _default) = capture_logs();
        let channel = StreamChannel::open(Some("sess-drop".into()), Duration::from_secs(10));
        let mut frames = tokio_test::task::spawn(Box::pin(channel.frames()));

        let first = tokio_test::assert_ready!(frames.poll_next());
        assert_eq!(first.map(|f| f.event), Some("connection"));
        tokio_test::assert_pending!(frames.poll_next());
        assert!(!logs.contents().contains("Event stream closed"));

        drop(frames);

        let out = logs.contents();
        assert!(out.contains("Event stream closed"));
        assert!(out.contains("sess-drop"));
        assert!(!out.contains("Event stream failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_before_first_poll_is_silent() {
        let (logs, _default) = capture_logs();
        let frames = StreamChannel::open(None, Duration::from_secs(10)).frames();
        drop(frames);
        assert!(logs.contents().is_empty());
    }

    #[test]
    fn test_reuses_supplied_session() {
        let channel = StreamChannel::open(Some("abc-123".into()), Duration::from_secs(1));
        assert_eq!(channel.session_id(), "abc-123");

        let minted = StreamChannel::open(Some("  ".into()), Duration::from_secs(1));
        assert_eq!(minted.session_id().len(), 36);
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = Frame::error(4, "boom");
        let data: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(frame.event, "error");
        assert_eq!(data["message"], "boom");
    }
}
