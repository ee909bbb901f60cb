//! Generative capability boundary
//!
//! The pipeline only talks to the model provider through [`GenerativeBackend`].
//! Timeouts and retries, if any, belong to implementations of this trait.

pub mod gemini;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::addon::GroundedContext;

pub use gemini::GeminiBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited - retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn grounded_context(&self, prompt: &str) -> Result<GroundedContext, BackendError>;

    async fn structured(&self, prompt: &str, schema: &Value) -> Result<StructuredReply, BackendError>;

    async fn synthesize_image(&self, prompt: &str) -> Result<ImageResponse, BackendError>;

    async fn critique(&self, image_png: &[u8], prompt: &str) -> Result<String, BackendError>;
}

/// A structured completion: either already-parsed JSON or text that should
/// contain it.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredReply {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePart {
    Text(String),
    Inline { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCandidate {
    pub parts: Vec<ImagePart>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageResponse {
    pub candidates: Vec<ImageCandidate>,
}

impl ImageResponse {
    /// First inline payload, depth-first: first candidate, first part.
    pub fn first_inline(&self) -> Option<&[u8]> {
        self.first_inline_typed().map(|(_, data)| data)
    }

    /// Same as [`first_inline`](Self::first_inline), with the declared MIME type.
    pub fn first_inline_typed(&self) -> Option<(&str, &[u8])> {
        self.candidates
            .iter()
            .flat_map(|c| c.parts.iter())
            .find_map(|part| match part {
                ImagePart::Inline { mime_type, data } => Some((mime_type.as_str(), data.as_slice())),
                ImagePart::Text(_) => None,
            })
    }
}
