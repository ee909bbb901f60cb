//! Gemini `generateContent` client.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{BackendError, GenerativeBackend, ImageCandidate, ImagePart, ImageResponse, StructuredReply};
use crate::addon::{Citation, GroundedContext};
use crate::config::BackendConfig;

pub struct GeminiBackend {
    http: reqwest::Client,
    config: BackendConfig,
}

impl GeminiBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        if !config.is_configured() {
            return Err(BackendError::NotConfigured(
                "set backend.api_key or ADDONSMITH_BACKEND__API_KEY".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("addonsmith/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    async fn generate(&self, model: &str, body: Value) -> Result<GenerateResponse, BackendError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );
        tracing::debug!(model, "generateContent");

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        Ok(resp.json::<GenerateResponse>().await?)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn grounded_context(&self, prompt: &str) -> Result<GroundedContext, BackendError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "tools": [{ "googleSearch": {} }],
        });
        let response = self.generate(&self.config.text_model, body).await?;
        Ok(GroundedContext {
            summary: response.text(),
            citations: response.citations(),
        })
    }

    async fn structured(&self, prompt: &str, schema: &Value) -> Result<StructuredReply, BackendError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            },
        });
        let response = self.generate(&self.config.content_model, body).await?;
        Ok(StructuredReply::Text(response.text()))
    }

    async fn synthesize_image(&self, prompt: &str) -> Result<ImageResponse, BackendError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });
        let response = self.generate(&self.config.image_model, body).await?;
        response.into_image_response()
    }

    async fn critique(&self, image_png: &[u8], prompt: &str) -> Result<String, BackendError> {
        let data = base64::engine::general_purpose::STANDARD.encode(image_png);
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": data } },
                    { "text": prompt },
                ]
            }],
        });
        let response = self.generate(&self.config.text_model, body).await?;
        Ok(response.text())
    }
}

/// Map non-success statuses onto [`BackendError`]; 429 is reported separately.
async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(BackendError::RateLimited { retry_after_secs });
    }
    if !resp.status().is_success() {
        return Err(BackendError::Api {
            status: resp.status().as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp)
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: String,
    #[serde(default)]
    title: String,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|content| content.parts.iter())
    }

    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    fn citations(&self) -> Vec<Citation> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| {
                meta.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .map(|web| Citation { title: web.title.clone(), uri: web.uri.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn into_image_response(self) -> Result<ImageResponse, BackendError> {
        let mut candidates = Vec::with_capacity(self.candidates.len());
        for candidate in self.candidates {
            let mut parts = vec![];
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(inline) = part.inline_data {
                    let data = base64::engine::general_purpose::STANDARD
                        .decode(inline.data.as_bytes())
                        .map_err(|e| BackendError::Parse(format!("inline image data: {e}")))?;
                    parts.push(ImagePart::Inline { mime_type: inline.mime_type, data });
                } else if let Some(text) = part.text {
                    parts.push(ImagePart::Text(text));
                }
            }
            candidates.push(ImageCandidate { parts });
        }
        Ok(ImageResponse { candidates })
    }
}
