use crate::traits::*;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Gemini `generateContent` over HTTPS.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, ProviderError> {
        let model = request.model;
        let url = self.endpoint(model);

        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.system_instruction,
                }],
            },
            contents: request
                .contents
                .iter()
                .map(|turn| Content {
                    role: Some(match turn.role {
                        TurnRole::User => "user",
                        TurnRole::Model => "model",
                    }),
                    parts: vec![Part {
                        text: &turn.content,
                    }],
                })
                .collect(),
        };

        tracing::debug!("gemini url={} turns={}", url, request.contents.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_connect() || e.is_timeout() {
                    "Network connection failed".to_string()
                } else {
                    format!("HTTP request failed: {}", e)
                };
                ProviderError::new(ProviderErrorKind::Unavailable, model, message)
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_from_response(model, status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::Unavailable,
                model,
                format!("Failed to parse response: {}", e),
            )
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::new(
                ProviderErrorKind::Unavailable,
                model,
                "Response has no text content",
            ));
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        "Google Gemini"
    }
}

fn error_from_response(model: &str, status: u16, body: &str) -> ProviderError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let api_status = envelope.as_ref().and_then(|e| e.error.status.as_deref());
    let key_invalid = envelope
        .as_ref()
        .map(|e| {
            e.error
                .details
                .iter()
                .any(|d| d.reason.as_deref() == Some("API_KEY_INVALID"))
        })
        .unwrap_or(false);

    let kind = classify(status, api_status, key_invalid);
    let message = match envelope {
        Some(e) if !e.error.message.is_empty() => format!("HTTP {}: {}", status, e.error.message),
        _ => format!("HTTP {}: {}", status, body),
    };

    ProviderError::new(kind, model, message)
}

/// Map an HTTP status plus the canonical status string to a failure class.
pub(crate) fn classify(status: u16, api_status: Option<&str>, key_invalid: bool) -> ProviderErrorKind {
    if key_invalid {
        return ProviderErrorKind::Unauthorized;
    }

    match api_status {
        Some("NOT_FOUND") => return ProviderErrorKind::ModelNotFound,
        Some("RESOURCE_EXHAUSTED") => return ProviderErrorKind::QuotaExhausted,
        Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => {
            return ProviderErrorKind::Unauthorized
        }
        Some("INVALID_ARGUMENT") | Some("FAILED_PRECONDITION") => {
            return ProviderErrorKind::InvalidModel
        }
        _ => {}
    }

    match status {
        401 | 403 => ProviderErrorKind::Unauthorized,
        404 => ProviderErrorKind::ModelNotFound,
        429 => ProviderErrorKind::QuotaExhausted,
        400 | 422 => ProviderErrorKind::InvalidModel,
        _ => ProviderErrorKind::Unavailable,
    }
}
