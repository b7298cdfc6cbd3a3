//! Pluggable event sink, standing in for the out-of-scope "dblogger"
//! engine the original honeypot supports. Selected by `[database].engine`
//! in the config.

use std::{
    fs::OpenOptions,
    io::Write,
    sync::Mutex,
};

use async_trait::async_trait;
use serde_derive::Serialize;
use tracing::warn;

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event_kind", rename_all = "kebab-case")]
pub enum Event {
    Connection {
        timestamp: String,
        session_id: String,
        peer_addr: String,
    },
    AuthAttempt {
        timestamp: String,
        session_id: String,
        username: String,
        password: String,
        accepted: bool,
    },
    AuthSuccess {
        timestamp: String,
        session_id: String,
        username: String,
    },
    Command {
        timestamp: String,
        session_id: String,
        line: String,
    },
    ChannelClose {
        timestamp: String,
        session_id: String,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// Discards every event. The default when no `[database]` engine is
/// configured.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: Event) {}
}

/// Appends one JSON object per line to a configured path.
pub struct JsonlSink {
    path: Mutex<std::path::PathBuf>,
}

impl JsonlSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        JsonlSink { path: Mutex::new(path.into()) }
    }
}

#[async_trait]
impl EventSink for JsonlSink {
    async fn emit(&self, event: Event) {
        let path = self.path.lock().expect("jsonl sink path lock poisoned").clone();
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize event: {:?}", e);
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            warn!("failed to append event to {}: {:?}", path.display(), e);
        }
    }
}

/// Builds the configured sink: `"jsonl"` with a path selects
/// `JsonlSink`, anything else (including absence) selects `NullSink`.
pub fn build_sink(engine: Option<&str>, path: Option<&str>) -> Box<dyn EventSink> {
    match engine {
        Some("jsonl") => {
            let path = path.unwrap_or("./log/events.jsonl");
            Box::new(JsonlSink::new(path))
        }
        _ => Box::new(NullSink),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn jsonl_sink_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let sink = JsonlSink::new(&path);

        sink.emit(Event::Connection {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            session_id: "abc".to_string(),
            peer_addr: "1.2.3.4:1234".to_string(),
        })
        .await;
        sink.emit(Event::ChannelClose {
            timestamp: "2026-01-01T00:00:05Z".to_string(),
            session_id: "abc".to_string(),
        })
        .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"connection\""));
        assert!(contents.contains("\"channel-close\""));
    }

    #[tokio::test]
    async fn null_sink_does_nothing() {
        let sink = NullSink;
        sink.emit(Event::ChannelClose {
            timestamp: "t".to_string(),
            session_id: "s".to_string(),
        })
        .await;
    }

    #[test]
    fn build_sink_picks_null_for_unrecognized_engine() {
        let sink = build_sink(Some("sqlite"), None);
        let _: &dyn EventSink = sink.as_ref();
    }
}
