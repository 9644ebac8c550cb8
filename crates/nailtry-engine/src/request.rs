use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::GenerationError;
use crate::preprocess::EncodedImage;

pub const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Default filtering flags ordinary hand photos, so every category only
/// blocks high-probability content.
pub const SAFETY_THRESHOLD: &str = "BLOCK_ONLY_HIGH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Hand photo only; the style comes from text.
    ApplyStyle,
    /// Hand photo plus a reference image to copy the style from.
    TransferReference,
}

impl Directive {
    pub fn for_reference(has_reference: bool) -> Self {
        if has_reference {
            Self::TransferReference
        } else {
            Self::ApplyStyle
        }
    }
}

pub fn instruction_text(directive: Directive, style_text: &str) -> String {
    let style = style_text.trim();
    match directive {
        Directive::ApplyStyle => format!(
            "Technical demonstration: apply a virtual nail polish design.\n\
             Input: a photo of a hand.\n\
             Task: change the nail polish to: {style}.\n\
             Requirements: keep the image photorealistic. Preserve the hand geometry, \
             pose, skin and lighting exactly; alter only the nail surface."
        ),
        Directive::TransferReference => format!(
            "Technical demonstration: transfer a nail design between two photos.\n\
             Input 1: the target photo of a hand.\n\
             Input 2: a reference image showing a nail design.\n\
             Task: extract the nail style from the reference image and apply it to the \
             nails in the target image. Style notes: {style}.\n\
             Requirements: keep the image photorealistic. Preserve the target's lighting, \
             skin and hand structure; alter only the nail surface."
        ),
    }
}

pub fn inline_image_part(image: &EncodedImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": BASE64.encode(&image.bytes),
        }
    })
}

pub fn default_safety_settings() -> Vec<Value> {
    SAFETY_CATEGORIES
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": SAFETY_THRESHOLD,
            })
        })
        .collect()
}

/// Builds the `generateContent` body: instruction text, hand image, then the
/// optional reference image.
pub fn build_request(
    primary: &EncodedImage,
    secondary: Option<&EncodedImage>,
    style_text: &str,
) -> Result<Value, GenerationError> {
    if primary.bytes.is_empty() {
        return Err(GenerationError::InvalidRequest(
            "hand image payload is empty".to_string(),
        ));
    }
    if secondary.is_some_and(|image| image.bytes.is_empty()) {
        return Err(GenerationError::InvalidRequest(
            "reference image payload is empty".to_string(),
        ));
    }

    let directive = Directive::for_reference(secondary.is_some());
    let mut parts = vec![
        json!({ "text": instruction_text(directive, style_text) }),
        inline_image_part(primary),
    ];
    if let Some(reference) = secondary {
        parts.push(inline_image_part(reference));
    }

    Ok(json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
        },
        "safetySettings": default_safety_settings(),
    }))
}
