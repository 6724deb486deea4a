use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::env;
use std::time::Duration;

use crate::error::TransportError;
use crate::stitch::config::ServiceConfig;
use crate::stitch::transport::{GenerationService, RawReply, SamplingParams};

const MAX_ERROR_BODY_CHARS: usize = 512;

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub fn resolve_api_key() -> Option<String> {
    env_non_empty("GEMINI_API_KEY").or_else(|| env_non_empty("AI_API_KEY"))
}

/// Gemini `generateContent` over HTTPS.
pub struct GeminiService {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Conversation owned by one generation run.
#[derive(Debug, Clone, Default)]
pub struct GeminiChat {
    model: String,
    contents: Vec<Value>,
}

impl GeminiChat {
    #[cfg(test)]
    pub fn turns(&self) -> usize {
        self.contents.len()
    }
}

impl GeminiService {
    pub fn new(api_key: impl Into<String>, cfg: &ServiceConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.trim_start_matches("models/");
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...");
    out
}

fn user_turn(text: &str) -> Value {
    json!({"role": "user", "parts": [{"text": text}]})
}

fn model_turn(text: &str) -> Value {
    json!({"role": "model", "parts": [{"text": text}]})
}

pub(crate) fn build_payload(contents: &[Value], params: &SamplingParams) -> Value {
    json!({
        "contents": contents,
        "generationConfig": {
            "maxOutputTokens": params.max_output_tokens,
            "temperature": params.temperature,
            "topP": params.top_p,
        }
    })
}

/// Pull text and finish token out of a `generateContent` response body.
pub(crate) fn parse_reply(json: &Value) -> Result<RawReply, TransportError> {
    let candidate = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first());

    let Some(candidate) = candidate else {
        if let Some(block) = json
            .get("promptFeedback")
            .and_then(|v| v.get("blockReason"))
            .and_then(Value::as_str)
        {
            return Ok(RawReply {
                text: String::new(),
                finish_token: block.to_string(),
            });
        }
        return Err(TransportError::Malformed(
            "response has no candidates".to_string(),
        ));
    };

    let mut text = String::new();
    if let Some(parts) = candidate
        .get("content")
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(piece) = part.get("text").and_then(Value::as_str) {
                text.push_str(piece);
            }
        }
    }

    let finish_token = candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(RawReply { text, finish_token })
}

impl GenerationService for GeminiService {
    type Handle = GeminiChat;

    fn open_session(&self, model: &str) -> Result<GeminiChat, TransportError> {
        if model.trim().is_empty() {
            return Err(TransportError::Unavailable(
                "model name cannot be empty".to_string(),
            ));
        }
        Ok(GeminiChat {
            model: model.trim().to_string(),
            contents: Vec::new(),
        })
    }

    fn send(
        &self,
        chat: &mut GeminiChat,
        message: &str,
        params: &SamplingParams,
    ) -> Result<RawReply, TransportError> {
        let mut contents = chat.contents.clone();
        contents.push(user_turn(message));
        let payload = build_payload(&contents, params);

        let response = self
            .client
            .post(self.endpoint(&chat.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::QuotaExceeded(truncate_body(&body)));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Status {
                code: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let json: Value = response.json()?;
        let reply = parse_reply(&json)?;

        contents.push(model_turn(&reply.text));
        chat.contents = contents;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::{GeminiService, build_payload, parse_reply, truncate_body};
    use crate::error::TransportError;
    use crate::stitch::config::ServiceConfig;
    use crate::stitch::transport::{GenerationService, SamplingParams};
    use serde_json::json;

    #[test]
    fn parse_reply_joins_parts_and_reads_finish_reason() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "hello "}, {"text": "world"}]},
                "finishReason": "MAX_TOKENS"
            }]
        });
        let reply = parse_reply(&body).expect("reply");
        assert_eq!(reply.text, "hello world");
        assert_eq!(reply.finish_token, "MAX_TOKENS");
    }

    #[test]
    fn parse_reply_uses_block_reason_when_prompt_is_blocked() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let reply = parse_reply(&body).expect("reply");
        assert_eq!(reply.text, "");
        assert_eq!(reply.finish_token, "SAFETY");
    }

    #[test]
    fn parse_reply_rejects_empty_body() {
        let err = parse_reply(&json!({})).expect_err("malformed");
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[test]
    fn payload_carries_sampling_params_and_history() {
        let params = SamplingParams {
            max_output_tokens: 1024,
            temperature: 0.5,
            top_p: 0.9,
        };
        let contents = vec![json!({"role": "user", "parts": [{"text": "hi"}]})];
        let payload = build_payload(&contents, &params);
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(payload["generationConfig"]["topP"], 0.9);
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn endpoint_strips_models_prefix() {
        let service = GeminiService::new("k", &ServiceConfig::default()).expect("client");
        assert_eq!(
            service.endpoint("models/gemini-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn open_session_starts_with_empty_history() {
        let service = GeminiService::new("k", &ServiceConfig::default()).expect("client");
        let chat = service.open_session("gemini-2.5-flash").expect("chat");
        assert_eq!(chat.turns(), 0);
        assert!(service.open_session("  ").is_err());
    }

    #[test]
    fn truncate_body_limits_error_payloads() {
        let long = "x".repeat(2000);
        assert!(truncate_body(&long).chars().count() <= 515);
        assert_eq!(truncate_body("short"), "short");
    }
}
