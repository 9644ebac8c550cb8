use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub type EventPayload = Map<String, Value>;

const OMITTED: &str = "<omitted>";
const REDACTED: &str = "<redacted>";

/// Lifecycle points of one preview request, in the order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationEvent {
    Started,
    TierDelayApplied,
    RequestDispatched,
    Succeeded,
    Failed,
}

impl GenerationEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "generation_started",
            Self::TierDelayApplied => "tier_delay_applied",
            Self::RequestDispatched => "request_dispatched",
            Self::Succeeded => "generation_succeeded",
            Self::Failed => "generation_failed",
        }
    }
}

/// Append-only JSONL log of preview sessions.
///
/// Each line carries `type`, `session_id` and `ts`, then the caller's payload
/// with inline image data and credentials redacted.
#[derive(Debug, Clone)]
pub struct EventLog {
    inner: Arc<SessionSink>,
}

#[derive(Debug)]
struct SessionSink {
    path: PathBuf,
    session_id: String,
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionSink {
                path: path.into(),
                session_id: session_id.into(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Opens a log under a fresh random session id.
    pub fn with_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, format!("session-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn emit(&self, event: GenerationEvent, payload: EventPayload) -> anyhow::Result<Value> {
        let mut row = Map::new();
        row.insert("type".to_string(), json!(event.as_str()));
        row.insert("session_id".to_string(), json!(self.inner.session_id));
        row.insert("ts".to_string(), json!(now_utc_iso()));
        row.extend(
            payload
                .into_iter()
                .map(|(key, value)| (key, redact_payload(&value))),
        );
        let row = Value::Object(row);
        self.append_line(&row)?;
        Ok(row)
    }

    fn append_line(&self, row: &Value) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');

        let sink = &self.inner;
        let _guard = sink
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        if let Some(parent) = sink.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&sink.path)?
            .write_all(&line)?;
        Ok(())
    }
}

/// Strips base64 image payloads and credentials from a JSON tree.
pub fn redact_payload(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(redact_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                match lowered.as_str() {
                    "data" | "b64_json" | "image_bytes" if row.is_string() => {
                        out.insert(key.clone(), Value::String(OMITTED.to_string()));
                    }
                    "key" | "api_key" | "gemini_api_key" => {
                        out.insert(key.clone(), Value::String(REDACTED.to_string()));
                    }
                    _ => {
                        out.insert(key.clone(), redact_payload(row));
                    }
                }
            }
            Value::Object(out)
        }
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
