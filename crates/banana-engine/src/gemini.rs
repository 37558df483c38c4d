use std::time::Duration;

use async_trait::async_trait;
use banana_contracts::{ImagePayload, MimeType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::client::{
    photography_prompt_instruction, ComposeRequest, GenerationClient, PromptRequest, RemoteError,
};
use crate::config::EngineConfig;

const PROVIDER: &str = "Gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// `GenerationClient` over the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    api_base: String,
    api_key: String,
    prompt_model: String,
    image_model: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &EngineConfig) -> Result<Self, RemoteError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RemoteError::Config(
                    "GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set".to_string(),
                )
            })?;
        let timeout = Duration::try_from_secs_f64(config.request_timeout_s)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                RemoteError::Config(format!(
                    "request timeout must be a positive number of seconds, got {}",
                    config.request_timeout_s
                ))
            })?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            prompt_model: config.prompt_model.clone(),
            image_model: config.image_model.clone(),
            timeout,
            http: HttpClient::new(),
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    async fn post(&self, model: &str, payload: &Value) -> Result<Value, RemoteError> {
        let endpoint = self.endpoint_for_model(model);
        debug!(%endpoint, "posting generateContent request");
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| self.transport_error(err, "request failed"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err, "response body read failed"))?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                provider: PROVIDER.to_string(),
                code: status.as_u16(),
                body: truncate_text(&body, 512),
            });
        }
        serde_json::from_str(&body).map_err(|err| RemoteError::Malformed {
            provider: PROVIDER.to_string(),
            message: format!("invalid JSON payload: {err}"),
        })
    }

    /// Error text never carries the request URL or the key.
    fn transport_error(&self, err: reqwest::Error, context: &str) -> RemoteError {
        let message = format!("{context}: {}", err.without_url());
        RemoteError::Transport {
            provider: PROVIDER.to_string(),
            message: message.replace(&self.api_key, "[redacted]"),
        }
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn describe_and_compose_prompt(
        &self,
        request: &PromptRequest,
    ) -> Result<String, RemoteError> {
        let payload = build_prompt_payload(request);
        let response = self.post(&self.prompt_model, &payload).await?;
        let text = extract_text(&response);
        if text.trim().is_empty() {
            return Err(RemoteError::EmptyPrompt {
                provider: PROVIDER.to_string(),
            });
        }
        info!(
            model = %self.prompt_model,
            chars = text.chars().count(),
            "prompt generated"
        );
        Ok(text.trim().to_string())
    }

    async fn compose_image(&self, request: &ComposeRequest) -> Result<ImagePayload, RemoteError> {
        let payload = build_compose_payload(request);
        let response = self.post(&self.image_model, &payload).await?;
        let image = extract_first_image(&response)?;
        info!(
            model = %self.image_model,
            mime_type = %image.mime_type(),
            "image composed"
        );
        Ok(image)
    }
}

fn inline_part(image: &ImagePayload) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type().as_str(),
            "data": image.data(),
        }
    })
}

fn build_prompt_payload(request: &PromptRequest) -> Value {
    let mut parts = vec![json!({
        "text": photography_prompt_instruction(&request.settings, request.style_image.is_some()),
    })];
    if let Some(style) = request.style_image.as_ref() {
        parts.push(inline_part(style));
    }
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
    })
}

fn build_compose_payload(request: &ComposeRequest) -> Value {
    let mut parts = vec![inline_part(&request.base_image)];
    if let Some(style) = request.style_image.as_ref() {
        parts.push(inline_part(style));
    }
    parts.push(json!({ "text": request.prompt }));
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"],
        },
    })
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .flat_map(|candidate| {
            candidate
                .get("content")
                .and_then(Value::as_object)
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

fn extract_text(response: &Value) -> String {
    let first_parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    first_parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
}

fn extract_first_image(response: &Value) -> Result<ImagePayload, RemoteError> {
    for part in candidate_parts(response) {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|err| RemoteError::Malformed {
                provider: PROVIDER.to_string(),
                message: format!("image base64 decode failed: {err}"),
            })?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<MimeType>().ok())
            .unwrap_or(MimeType::Jpeg);
        return Ok(ImagePayload::from_bytes(&bytes, mime_type));
    }
    Err(RemoteError::NoImageProduced)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
