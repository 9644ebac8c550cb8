use std::sync::Arc;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use nailtry_contracts::tier::EntitlementTier;
use nailtry_engine::{
    EngineConfig, GeminiClient, GenerationError, GenerationRequest, PreviewEngine, RawResponse,
    Transport,
};
use serde_json::{json, Value};

/// Answers with the hand image it was sent, spelled the snake_case way.
struct EchoTransport;

impl Transport for EchoTransport {
    fn post_json(
        &self,
        _endpoint: &str,
        _api_key: &str,
        payload: &Value,
    ) -> Result<RawResponse, GenerationError> {
        let inline = &payload["contents"][0]["parts"][1]["inlineData"];
        let body = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here you go."},
                    {"inline_data": {
                        "mime_type": inline["mimeType"],
                        "data": inline["data"],
                    }}
                ]},
                "finishReason": "STOP"
            }]
        });
        Ok(RawResponse::new(200, body.to_string()))
    }
}

fn engine(delay: Duration) -> PreviewEngine {
    let config = EngineConfig::new("test-key").with_standard_delay(delay);
    PreviewEngine::new(
        GeminiClient::new(Arc::new(config), Arc::new(EchoTransport)),
        None,
    )
}

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width) as u8,
            (y * 255 / height) as u8,
            ((x + y) * 127 / (width + height)) as u8,
        ])
    }))
}

fn mean_abs_diff(left: &RgbImage, right: &RgbImage) -> f64 {
    let total: u64 = left
        .as_raw()
        .iter()
        .zip(right.as_raw())
        .map(|(a, b)| u64::from(a.abs_diff(*b)))
        .sum();
    total as f64 / left.as_raw().len() as f64
}

#[test]
fn echoed_upload_round_trips_within_compression_tolerance() -> anyhow::Result<()> {
    let source = gradient(1600, 1200);
    let request = GenerationRequest::new(
        source.clone(),
        "glossy red nail polish",
        EntitlementTier::Elevated,
    );

    let outcome = engine(Duration::ZERO).generate(&request)?;
    let generated = outcome.image;
    assert_eq!((generated.width(), generated.height()), (1024, 768));
    assert_eq!(generated.mime_type.as_deref(), Some("image/jpeg"));
    assert_eq!(generated.text.as_deref(), Some("Here you go."));
    assert!(outcome.request_id.starts_with("req-"));

    let expected = source.resize_exact(1024, 768, FilterType::Triangle).to_rgb8();
    let diff = mean_abs_diff(&expected, &generated.image.to_rgb8());
    assert!(diff < 6.0, "mean abs diff {diff}");
    Ok(())
}

#[test]
fn standard_tier_never_finishes_before_the_delay() -> anyhow::Result<()> {
    let delay = Duration::from_millis(200);
    let engine = engine(delay);

    let started = Instant::now();
    let outcome = engine.generate(&GenerationRequest::new(
        gradient(300, 400),
        "gold glitter ombre nail polish",
        EntitlementTier::Standard,
    ))?;
    assert!(started.elapsed() >= delay);
    assert!(outcome.elapsed >= delay);
    assert_eq!((outcome.image.width(), outcome.image.height()), (384, 512));
    Ok(())
}

#[test]
fn elevated_tier_skips_the_delay() -> anyhow::Result<()> {
    let engine = engine(Duration::from_secs(30));
    let started = Instant::now();
    engine.generate(&GenerationRequest::new(
        gradient(64, 64),
        "matte black",
        EntitlementTier::Elevated,
    ))?;
    assert!(started.elapsed() < Duration::from_secs(30));
    Ok(())
}
