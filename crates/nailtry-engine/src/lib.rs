pub mod config;
pub mod error;
pub mod preprocess;
pub mod request;
pub mod response;
pub mod transport;

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::DynamicImage;
use nailtry_contracts::events::{redact_payload, EventLog, EventPayload, GenerationEvent};
use nailtry_contracts::receipts::{ReceiptOutcome, RequestSummary};
use nailtry_contracts::tier::EntitlementTier;
use serde_json::{json, Map, Value};

pub use config::EngineConfig;
pub use error::{ErrorCategory, GenerationError};
pub use preprocess::EncodedImage;
pub use response::GeneratedImage;
pub use transport::{GeminiClient, HttpTransport, RawResponse, Transport};

/// Inputs for one preview: the hand photo, the style to apply, an optional
/// reference image to copy the style from, and the caller's tier.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub source: DynamicImage,
    pub style_text: String,
    pub reference: Option<DynamicImage>,
    pub tier: EntitlementTier,
}

impl GenerationRequest {
    pub fn new(source: DynamicImage, style_text: impl Into<String>, tier: EntitlementTier) -> Self {
        Self {
            source,
            style_text: style_text.into(),
            reference: None,
            tier,
        }
    }

    pub fn with_reference(mut self, reference: DynamicImage) -> Self {
        self.reference = Some(reference);
        self
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub request_id: String,
    pub image: GeneratedImage,
    pub elapsed: Duration,
}

/// Everything known about one `generate` call, success or not.
#[derive(Debug)]
pub struct GenerationTrace {
    pub summary: RequestSummary,
    /// Endpoint and request body with image data and credentials removed.
    pub provider_request: Value,
    pub elapsed: Duration,
    pub result: Result<GeneratedImage, GenerationError>,
}

impl GenerationTrace {
    pub fn receipt_outcome(&self) -> ReceiptOutcome {
        match &self.result {
            Ok(image) => ReceiptOutcome::Ok {
                width: image.width(),
                height: image.height(),
                mime_type: image.mime_type.clone(),
            },
            Err(err) => ReceiptOutcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }

    pub fn into_outcome(self) -> Result<GenerationOutcome, GenerationError> {
        let image = self.result?;
        Ok(GenerationOutcome {
            request_id: self.summary.request_id,
            image,
            elapsed: self.elapsed,
        })
    }
}

/// Stateless between calls: holds configuration, the transport handle and an
/// optional event log, all supplied by the caller.
#[derive(Clone)]
pub struct PreviewEngine {
    client: GeminiClient,
    events: Option<EventLog>,
}

impl PreviewEngine {
    pub fn new(client: GeminiClient, events: Option<EventLog>) -> Self {
        Self { client, events }
    }

    pub fn over_http(config: EngineConfig, events: Option<EventLog>) -> Self {
        Self::new(GeminiClient::over_http(Arc::new(config)), events)
    }

    pub fn config(&self) -> &EngineConfig {
        self.client.config()
    }

    pub fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.generate_traced(request).into_outcome()
    }

    pub fn generate_traced(&self, request: &GenerationRequest) -> GenerationTrace {
        let started = Instant::now();
        let config = self.client.config();
        let mut summary = RequestSummary {
            request_id: format!("req-{}", uuid::Uuid::new_v4().simple()),
            tier: request.tier,
            style_text: request.style_text.clone(),
            model: config.model.clone(),
            uploads: Vec::new(),
        };
        let mut provider_request = Value::Null;

        self.emit(
            GenerationEvent::Started,
            json!({
                "request_id": summary.request_id,
                "tier": request.tier,
                "style_text": request.style_text,
                "has_reference": request.reference.is_some(),
                "model": config.model,
            }),
        );

        let result = self.run(request, &mut summary, &mut provider_request);
        let elapsed = started.elapsed();

        match &result {
            Ok(image) => self.emit(
                GenerationEvent::Succeeded,
                json!({
                    "request_id": summary.request_id,
                    "width": image.width(),
                    "height": image.height(),
                    "mime_type": image.mime_type,
                    "elapsed_s": elapsed.as_secs_f64(),
                }),
            ),
            Err(err) => self.emit(
                GenerationEvent::Failed,
                json!({
                    "request_id": summary.request_id,
                    "kind": err.kind(),
                    "message": err.to_string(),
                    "elapsed_s": elapsed.as_secs_f64(),
                }),
            ),
        }

        GenerationTrace {
            summary,
            provider_request,
            elapsed,
            result,
        }
    }

    fn run(
        &self,
        request: &GenerationRequest,
        summary: &mut RequestSummary,
        provider_request: &mut Value,
    ) -> Result<GeneratedImage, GenerationError> {
        let config = self.client.config();
        let primary = preprocess::encode_for_upload(
            &request.source,
            config.max_dimension_for(request.tier),
            config.jpeg_quality,
        )?;
        summary.uploads.push(primary.summary("hand"));

        let reference = request
            .reference
            .as_ref()
            .map(|image| {
                preprocess::encode_for_upload(
                    image,
                    config.reference_max_dimension,
                    config.jpeg_quality,
                )
            })
            .transpose()?;
        if let Some(reference) = reference.as_ref() {
            summary.uploads.push(reference.summary("reference"));
        }

        let payload = request::build_request(&primary, reference.as_ref(), &request.style_text)?;
        let endpoint = config.endpoint();
        *provider_request = json!({
            "endpoint": endpoint,
            "payload": redact_payload(&payload),
        });

        let delay = config.delay_for(request.tier);
        if !delay.is_zero() {
            self.emit(
                GenerationEvent::TierDelayApplied,
                json!({
                    "request_id": summary.request_id,
                    "delay_ms": delay.as_millis() as u64,
                }),
            );
        }
        self.emit(
            GenerationEvent::RequestDispatched,
            json!({
                "request_id": summary.request_id,
                "endpoint": endpoint,
                "upload_bytes": summary.uploads.iter().map(|upload| upload.byte_len).sum::<usize>(),
            }),
        );

        let body = self.client.dispatch(&payload, request.tier)?;
        response::parse_generation_response(&body)
    }

    fn emit(&self, event: GenerationEvent, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        // A failed log write never fails the generation.
        let _ = events.emit(event, payload);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use image::{DynamicImage, Rgb, RgbImage};
    use nailtry_contracts::events::EventLog;
    use nailtry_contracts::tier::EntitlementTier;
    use serde_json::{json, Value};

    use super::{
        EngineConfig, GeminiClient, GenerationError, GenerationRequest, PreviewEngine,
        RawResponse, Transport,
    };

    struct Fixed(RawResponse);

    impl Transport for Fixed {
        fn post_json(
            &self,
            _endpoint: &str,
            _api_key: &str,
            _payload: &Value,
        ) -> Result<RawResponse, GenerationError> {
            Ok(self.0.clone())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn post_json(
            &self,
            _endpoint: &str,
            _api_key: &str,
            _payload: &Value,
        ) -> Result<RawResponse, GenerationError> {
            panic!("no request should be sent");
        }
    }

    fn engine(transport: Arc<dyn Transport>, events: Option<EventLog>) -> PreviewEngine {
        let config = EngineConfig::new("k").with_standard_delay(Duration::from_millis(10));
        PreviewEngine::new(GeminiClient::new(Arc::new(config), transport), events)
    }

    fn hand() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([210, 170, 150])))
    }

    #[test]
    fn failures_are_traced_and_logged() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log_path = temp.path().join("events.jsonl");
        let body = json!({"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}});
        let engine = engine(
            Arc::new(Fixed(RawResponse::new(200, body.to_string()))),
            Some(EventLog::new(&log_path, "s-1")),
        );

        let request =
            GenerationRequest::new(hand(), "glossy red nail polish", EntitlementTier::Standard);
        let trace = engine.generate_traced(&request);
        assert!(matches!(
            trace.result,
            Err(GenerationError::ContentPolicy { ref reason }) if reason == "SAFETY"
        ));
        assert_eq!(trace.summary.uploads.len(), 1);
        assert_eq!(trace.summary.uploads[0].width, 512);
        assert_eq!(
            trace.provider_request["payload"]["contents"][0]["parts"][1]["inlineData"]["data"],
            json!("<omitted>")
        );
        assert!(!trace.receipt_outcome().is_ok());

        let types: Vec<String> = std::fs::read_to_string(&log_path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "generation_started",
                "tier_delay_applied",
                "request_dispatched",
                "generation_failed"
            ]
        );
        Ok(())
    }

    #[test]
    fn zero_sized_source_fails_before_any_request() {
        let engine = engine(Arc::new(Unreachable), None);
        let request = GenerationRequest::new(
            DynamicImage::ImageRgb8(RgbImage::new(0, 0)),
            "red",
            EntitlementTier::Elevated,
        );
        assert!(matches!(
            engine.generate(&request),
            Err(GenerationError::ImageProcessing(_))
        ));
    }

    #[test]
    fn reference_image_is_bounded_independently_of_tier() {
        let engine = engine(Arc::new(Fixed(RawResponse::new(200, "{}"))), None);
        let reference = DynamicImage::ImageRgb8(RgbImage::from_pixel(2000, 1000, Rgb([1, 2, 3])));
        let request = GenerationRequest::new(hand(), "chrome", EntitlementTier::Elevated)
            .with_reference(reference);
        let trace = engine.generate_traced(&request);
        assert!(matches!(trace.result, Err(GenerationError::NoCandidate)));
        assert!(trace.summary.has_reference());
        assert_eq!(trace.summary.uploads[0].width, 1024);
        assert_eq!(
            (trace.summary.uploads[1].width, trace.summary.uploads[1].height),
            (768, 384)
        );
    }
}
