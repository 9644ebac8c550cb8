//! Extraction of the generated image from a `generateContent` response.
//!
//! The upstream schema is not pinned: the same field shows up in camelCase
//! or snake_case depending on the serving path. Field lookups go through the
//! ordered name lists below, first match wins. New spellings belong here;
//! a real schema change should get its own versioned parser instead.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use serde_json::{Map, Value};

use crate::error::GenerationError;

pub const INLINE_DATA_KEYS: &[&str] = &["inlineData", "inline_data"];
pub const MIME_TYPE_KEYS: &[&str] = &["mimeType", "mime_type"];
pub const PROMPT_FEEDBACK_KEYS: &[&str] = &["promptFeedback", "prompt_feedback"];
pub const BLOCK_REASON_KEYS: &[&str] = &["blockReason", "block_reason"];
pub const FINISH_REASON_KEYS: &[&str] = &["finishReason", "finish_reason"];

/// A decoded image plus what the model said alongside it.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: DynamicImage,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub text: Option<String>,
}

impl GeneratedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub fn parse_generation_response(body: &[u8]) -> Result<GeneratedImage, GenerationError> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|err| GenerationError::MalformedResponse(format!("invalid JSON: {err}")))?;
    let Value::Object(root) = parsed else {
        return Err(GenerationError::MalformedResponse(
            "top-level JSON is not an object".to_string(),
        ));
    };

    let Some(candidate) = root
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
    else {
        return Err(no_candidate_error(&root));
    };

    let parts = candidate
        .get("content")
        .and_then(Value::as_object)
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut text_fragments = Vec::new();
    for (index, part) in parts.iter().enumerate() {
        push_text(part, &mut text_fragments);
        let Some(inline) = part
            .as_object()
            .and_then(|map| lookup_object(map, INLINE_DATA_KEYS))
        else {
            continue;
        };
        let Some(data) = inline.get("data").and_then(Value::as_str) else {
            continue;
        };
        let mime_type = lookup_in(inline, MIME_TYPE_KEYS)
            .and_then(Value::as_str)
            .map(str::to_string);
        let bytes = BASE64
            .decode(data.trim().as_bytes())
            .map_err(|err| GenerationError::Decode(format!("base64: {err}")))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|err| GenerationError::Decode(format!("image: {err}")))?;
        // Text parts after the image still belong to the caption.
        for rest in &parts[index + 1..] {
            push_text(rest, &mut text_fragments);
        }
        return Ok(GeneratedImage {
            image,
            bytes,
            mime_type,
            text: join_text(text_fragments),
        });
    }

    Err(GenerationError::NoImageReturned {
        finish_reason: lookup(candidate, FINISH_REASON_KEYS)
            .and_then(Value::as_str)
            .map(str::to_string),
        text: join_text(text_fragments),
    })
}

fn no_candidate_error(root: &Map<String, Value>) -> GenerationError {
    let reason = lookup_in(root, PROMPT_FEEDBACK_KEYS)
        .and_then(|feedback| lookup(feedback, BLOCK_REASON_KEYS))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|reason| !reason.is_empty());
    match reason {
        Some(reason) => GenerationError::ContentPolicy {
            reason: reason.to_string(),
        },
        None => GenerationError::NoCandidate,
    }
}

fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    value.as_object().and_then(|map| lookup_in(map, keys))
}

fn lookup_in<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| map.get(*key).filter(|value| !value.is_null()))
}

fn lookup_object<'a>(
    map: &'a Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Map<String, Value>> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_object))
}

fn push_text(part: &Value, fragments: &mut Vec<String>) {
    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            fragments.push(text.trim().to_string());
        }
    }
}

fn join_text(fragments: Vec<String>) -> Option<String> {
    if fragments.is_empty() {
        None
    } else {
        Some(fragments.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use base64::Engine as _;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::{json, Value};

    use super::{parse_generation_response, BASE64};
    use crate::error::GenerationError;

    fn png_base64() -> anyhow::Result<String> {
        let image = RgbImage::from_fn(6, 4, |x, y| Rgb([(x * 40) as u8, (y * 60) as u8, 90]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(BASE64.encode(bytes))
    }

    fn parse(value: Value) -> Result<super::GeneratedImage, GenerationError> {
        parse_generation_response(value.to_string().as_bytes())
    }

    #[test]
    fn non_object_bodies_are_malformed() {
        for body in [&b"not json"[..], &b"[1,2,3]"[..], &b"\"text\""[..]] {
            assert!(matches!(
                parse_generation_response(body),
                Err(GenerationError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn block_reason_wins_over_no_candidate() {
        let result = parse(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        }));
        match result {
            Err(GenerationError::ContentPolicy { reason }) => assert_eq!(reason, "SAFETY"),
            other => panic!("unexpected result: {other:?}"),
        }

        let snake = parse(json!({"prompt_feedback": {"block_reason": "OTHER"}}));
        assert!(matches!(snake, Err(GenerationError::ContentPolicy { reason }) if reason == "OTHER"));
    }

    #[test]
    fn missing_candidates_without_reason_is_no_candidate() {
        assert!(matches!(parse(json!({})), Err(GenerationError::NoCandidate)));
        assert!(matches!(
            parse(json!({"candidates": [], "promptFeedback": {}})),
            Err(GenerationError::NoCandidate)
        ));
    }

    #[test]
    fn text_only_candidate_is_no_image_returned() {
        let result = parse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "I can describe the nails instead."}]},
                "finishReason": "STOP"
            }]
        }));
        match result {
            Err(GenerationError::NoImageReturned {
                finish_reason,
                text,
            }) => {
                assert_eq!(finish_reason.as_deref(), Some("STOP"));
                assert_eq!(text.as_deref(), Some("I can describe the nails instead."));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        assert!(matches!(
            parse(json!({"candidates": [{}]})),
            Err(GenerationError::NoImageReturned { .. })
        ));
    }

    #[test]
    fn camel_and_snake_inline_data_decode_identically() -> anyhow::Result<()> {
        let data = png_base64()?;
        let camel = parse(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": data}}
            ]}}]
        }))?;
        let snake = parse(json!({
            "candidates": [{"content": {"parts": [
                {"inline_data": {"mime_type": "image/png", "data": data}}
            ]}}]
        }))?;
        assert_eq!(camel.bytes, snake.bytes);
        assert_eq!(camel.image.to_rgb8(), snake.image.to_rgb8());
        assert_eq!(camel.mime_type.as_deref(), Some("image/png"));
        assert_eq!(snake.mime_type.as_deref(), Some("image/png"));
        assert_eq!((camel.width(), camel.height()), (6, 4));
        Ok(())
    }

    #[test]
    fn null_camel_case_inline_data_falls_through_to_snake_case() -> anyhow::Result<()> {
        let data = png_base64()?;
        let generated = parse(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": null, "inline_data": {"mime_type": "image/png", "data": data}}
            ]}}]
        }))?;
        assert_eq!((generated.width(), generated.height()), (6, 4));
        assert_eq!(generated.mime_type.as_deref(), Some("image/png"));
        Ok(())
    }

    #[test]
    fn text_before_a_skipped_inline_part_is_not_repeated() -> anyhow::Result<()> {
        let data = png_base64()?;
        let generated = parse(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png"}},
                {"text": "A"},
                {"inlineData": {"mimeType": "image/png", "data": data}},
                {"text": "B"}
            ]}}]
        }))?;
        assert_eq!(generated.text.as_deref(), Some("A\nB"));
        Ok(())
    }

    #[test]
    fn first_inline_part_wins_and_text_is_kept() -> anyhow::Result<()> {
        let data = png_base64()?;
        let generated = parse(json!({
            "candidates": [{"content": {"parts": [
                {"text": "Here is your manicure."},
                {"inlineData": {"mimeType": "image/png", "data": data}},
                {"inlineData": {"mimeType": "image/png", "data": "!!!"}},
                {"text": "Enjoy."}
            ]}}]
        }))?;
        assert_eq!(generated.width(), 6);
        assert_eq!(
            generated.text.as_deref(),
            Some("Here is your manicure.\nEnjoy.")
        );
        Ok(())
    }

    #[test]
    fn undecodable_payloads_are_decode_errors() {
        let bad_base64 = parse(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "%%% not base64 %%%"}}
            ]}}]
        }));
        assert!(matches!(bad_base64, Err(GenerationError::Decode(_))));

        let not_an_image = parse(json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(b"plain text")}}
            ]}}]
        }));
        assert!(matches!(not_an_image, Err(GenerationError::Decode(_))));
    }
}
