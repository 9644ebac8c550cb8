use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::{now_utc_iso, redact_payload};
use crate::tier::EntitlementTier;

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

/// One image as it was uploaded, after preprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub role: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub byte_len: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
    pub request_id: String,
    pub tier: EntitlementTier,
    pub style_text: String,
    pub model: String,
    #[serde(default)]
    pub uploads: Vec<UploadSummary>,
}

impl RequestSummary {
    pub fn has_reference(&self) -> bool {
        self.uploads.iter().any(|upload| upload.role == "reference")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptOutcome {
    Ok {
        width: u32,
        height: u32,
        mime_type: Option<String>,
    },
    Failed {
        kind: String,
        message: String,
    },
}

impl ReceiptOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

pub fn build_receipt(
    request: &RequestSummary,
    provider_request: &Value,
    outcome: &ReceiptOutcome,
    latency_s: f64,
    artifacts: &Map<String, Value>,
) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert("ts".to_string(), Value::String(now_utc_iso()));
    root.insert(
        "request".to_string(),
        serde_json::to_value(request).unwrap_or(Value::Null),
    );
    root.insert(
        "has_reference".to_string(),
        Value::Bool(request.has_reference()),
    );
    root.insert(
        "provider_request".to_string(),
        redact_payload(provider_request),
    );
    root.insert(
        "outcome".to_string(),
        serde_json::to_value(outcome).unwrap_or(Value::Null),
    );
    root.insert(
        "latency_s".to_string(),
        serde_json::Number::from_f64(latency_s)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts.clone()));
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}
