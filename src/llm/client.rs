//! Gemini API client.
//!
//! Speaks the `generateContent` REST shape. The endpoint is configurable so
//! tests and alternative deployments can point elsewhere.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationParams, LlmError, ModelBackend};
use crate::config::LlmSettings;

/// HTTP client for the Gemini generateContent API.
pub struct GeminiClient {
    endpoint: String,
    model: String,
    api_key: String,
    client: Client,
}

/// Request body for generateContent.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

/// Response body for generateContent.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

impl GeminiClient {
    /// Create a client from settings. Fails when no API key is resolvable.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let api_key = settings.resolve_api_key().ok_or(LlmError::MissingKey)?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key,
            client,
        })
    }

    fn request_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        )
    }
}

#[async_trait]
impl ModelBackend for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                response_mime_type: "application/json",
            },
        };

        debug!("Issuing generateContent request against {}", self.model);
        let resp = self
            .client
            .post(self.request_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body.lines().take(3).collect::<Vec<_>>().join(" "),
            });
        }

        let decoded: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let text = decoded
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| LlmError::Decode("response contained no candidates".to_string()))?;

        if text.trim().is_empty() {
            return Err(LlmError::Decode("empty candidate text".to_string()));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_shape() {
        let client = GeminiClient {
            endpoint: "https://example.test".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key: "k123".to_string(),
            client: Client::new(),
        };
        assert_eq!(
            client.request_url(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent?key=k123"
        );
    }

    #[test]
    fn test_response_decoding() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"themes\":[]}"}]}}]}"#;
        let decoded: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(decoded.candidates.len(), 1);
        assert_eq!(decoded.candidates[0].content.parts[0].text, "{\"themes\":[]}");
    }

    #[test]
    fn test_missing_key_is_not_retryable() {
        assert!(!LlmError::MissingKey.is_retryable());
        assert!(LlmError::Connection("reset".to_string()).is_retryable());
        assert!(LlmError::Api {
            status: 429,
            message: "quota".to_string()
        }
        .is_retryable());
    }
}
