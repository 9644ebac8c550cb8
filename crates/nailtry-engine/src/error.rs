use thiserror::Error;

/// Everything that can end a generation request. All variants are terminal;
/// the engine never retries.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("could not reach the generation service: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("generation service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("generation service returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("request blocked by content policy: {reason}")]
    ContentPolicy { reason: String },

    #[error("generation service returned no candidates")]
    NoCandidate,

    #[error("generation finished without an image{}", describe_finish(.finish_reason.as_deref()))]
    NoImageReturned {
        finish_reason: Option<String>,
        text: Option<String>,
    },

    #[error("generated image could not be decoded: {0}")]
    Decode(String),
}

/// Coarse grouping that drives what the user is told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local input problem; nothing was sent.
    Local,
    Unreachable,
    Service,
    Anomaly,
    PolicyBlocked,
    /// The call succeeded but produced nothing usable; usually transient.
    NoResult,
}

impl GenerationError {
    /// Stable label for events and receipts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ImageProcessing(_) => "image_processing",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Transport(_) => "transport",
            Self::Service { .. } => "service",
            Self::MalformedResponse(_) => "malformed_response",
            Self::ContentPolicy { .. } => "content_policy",
            Self::NoCandidate => "no_candidate",
            Self::NoImageReturned { .. } => "no_image_returned",
            Self::Decode(_) => "decode",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ImageProcessing(_) | Self::InvalidRequest(_) => ErrorCategory::Local,
            Self::Transport(_) => ErrorCategory::Unreachable,
            Self::Service { .. } => ErrorCategory::Service,
            Self::MalformedResponse(_) => ErrorCategory::Anomaly,
            Self::ContentPolicy { .. } => ErrorCategory::PolicyBlocked,
            Self::NoCandidate | Self::NoImageReturned { .. } | Self::Decode(_) => {
                ErrorCategory::NoResult
            }
        }
    }

    /// Message suitable for showing to the person who triggered the request.
    pub fn user_message(&self) -> String {
        match self {
            Self::Service { message, .. } => message.clone(),
            Self::ContentPolicy { reason } => {
                format!("Your photo or design was flagged by the content filter ({reason}).")
            }
            _ => match self.category() {
                ErrorCategory::Local => "We couldn't prepare your photo. Try another one.".to_string(),
                ErrorCategory::Unreachable => {
                    "Couldn't reach the preview service. Check your connection and retry."
                        .to_string()
                }
                ErrorCategory::Anomaly => {
                    "The preview service sent an unexpected reply. Please try again.".to_string()
                }
                _ => "Generation produced no result. Please try again.".to_string(),
            },
        }
    }
}

fn describe_finish(reason: Option<&str>) -> String {
    reason
        .map(|value| format!(" (finish reason {value})"))
        .unwrap_or_default()
}
