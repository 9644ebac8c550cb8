use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nailtry_contracts::tier::{
    EntitlementTier, ELEVATED_MAX_DIMENSION, STANDARD_MAX_DIMENSION, STANDARD_TIER_DELAY,
};
use serde_json::{Map, Value};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const REFERENCE_MAX_DIMENSION: u32 = 768;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Engine settings. Resolved once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base: String,
    pub model: String,
    pub api_key: String,
    pub request_timeout: Duration,
    pub standard_delay: Duration,
    pub jpeg_quality: u8,
    pub standard_max_dimension: u32,
    pub elevated_max_dimension: u32,
    pub reference_max_dimension: u32,
}

impl EngineConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            api_key: api_key.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            standard_delay: STANDARD_TIER_DELAY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            standard_max_dimension: STANDARD_MAX_DIMENSION,
            elevated_max_dimension: ELEVATED_MAX_DIMENSION,
            reference_max_dimension: REFERENCE_MAX_DIMENSION,
        }
    }

    /// Resolves defaults, then the environment, then an optional JSON secrets
    /// file. A missing API key is a startup error.
    pub fn load(secrets_path: Option<&Path>) -> Result<Self> {
        let secrets = match secrets_path {
            Some(path) => read_secrets(path)?,
            None => Map::new(),
        };
        let api_key = API_KEY_VARS
            .iter()
            .find_map(|key| secret_value(&secrets, key))
            .or_else(|| API_KEY_VARS.iter().find_map(|key| non_empty_env(key)));
        let Some(api_key) = api_key else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set (environment or secrets file)");
        };

        let mut config = Self::new(api_key);
        if let Some(base) = secret_value(&secrets, "GEMINI_API_BASE")
            .or_else(|| non_empty_env("GEMINI_API_BASE"))
        {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = secret_value(&secrets, "NAILTRY_IMAGE_MODEL")
            .or_else(|| non_empty_env("NAILTRY_IMAGE_MODEL"))
        {
            config.model = model;
        }
        if let Some(raw) = secret_value(&secrets, "NAILTRY_REQUEST_TIMEOUT")
            .or_else(|| non_empty_env("NAILTRY_REQUEST_TIMEOUT"))
        {
            let seconds: f64 = raw
                .parse()
                .with_context(|| format!("invalid NAILTRY_REQUEST_TIMEOUT {raw:?}"))?;
            if !seconds.is_finite() {
                bail!("invalid NAILTRY_REQUEST_TIMEOUT {raw:?}");
            }
            config.request_timeout = Duration::from_secs_f64(seconds.clamp(5.0, 600.0));
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim().trim_end_matches('/').to_string();
        self
    }

    pub fn with_standard_delay(mut self, delay: Duration) -> Self {
        self.standard_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn max_dimension_for(&self, tier: EntitlementTier) -> u32 {
        match tier {
            EntitlementTier::Standard => self.standard_max_dimension,
            EntitlementTier::Elevated => self.elevated_max_dimension,
        }
    }

    pub fn delay_for(&self, tier: EntitlementTier) -> Duration {
        match tier {
            EntitlementTier::Standard => self.standard_delay,
            EntitlementTier::Elevated => Duration::ZERO,
        }
    }

    pub fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }
}

fn read_secrets(path: &Path) -> Result<Map<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading secrets file {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("secrets file {} is not valid JSON", path.display()))?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => bail!("secrets file {} must hold a JSON object", path.display()),
    }
}

fn secret_value(secrets: &Map<String, Value>, key: &str) -> Option<String> {
    secrets
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
