use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-completion backend. `Ok(None)` means the backend answered but
/// produced no usable choice.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>>;
}

pub struct LLMClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl LLMClient {
    pub fn new(api_base: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .with_context(|| format!("Failed to build HTTP client for {}", api_base))?;

        Ok(Self {
            client,
            api_base,
            api_key,
        })
    }
}

#[async_trait]
impl ChatCompletion for LLMClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        let request_body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });

        tracing::debug!(
            "Calling LLM API: {} with model: {} ({} messages)",
            url,
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            let reason = serde_json::from_str::<serde_json::Value>(&error_text)
                .ok()
                .and_then(|v| detect_provider_error(&v))
                .unwrap_or(error_text);
            return Err(anyhow!(
                "LLM API request failed with status {}: {}",
                status,
                reason
            ));
        }

        let v: serde_json::Value = response.json().await?;

        if let Some(content) = first_choice_content(&v) {
            return Ok(Some(content));
        }

        if let Some(err_msg) = detect_provider_error(&v) {
            return Err(anyhow!(
                "LLM provider {} (model {}) returned error: {}",
                self.api_base,
                request.model,
                err_msg
            ));
        }

        tracing::debug!("LLM response had no usable choice: {}", v);
        Ok(None)
    }
}

/// Reads `choices[0].message.content`, either as a string or as an array of
/// text parts.
fn first_choice_content(value: &serde_json::Value) -> Option<String> {
    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c0| c0.get("message"))
        .and_then(|m| m.get("content"))?;

    if let Some(s) = content.as_str() {
        return Some(s.to_string());
    }

    if let Some(parts) = content.as_array() {
        let mut out = String::new();
        for p in parts {
            if let Some(s) = p.as_str() {
                out.push_str(s);
            } else if let Some(t) = p.get("text").and_then(|t| t.as_str()) {
                out.push_str(t);
            }
        }
        if !out.is_empty() {
            return Some(out);
        }
    }

    None
}

fn detect_provider_error(value: &serde_json::Value) -> Option<String> {
    if let Some(error_val) = value.get("error") {
        if let Some(obj) = error_val.as_object() {
            let message = ["message", "msg", "error_message", "detail"]
                .iter()
                .filter_map(|key| obj.get(*key))
                .filter_map(json_value_to_string)
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty());
            let code = ["code", "status", "type"]
                .iter()
                .filter_map(|key| obj.get(*key))
                .filter_map(json_value_to_string)
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty());
            return Some(match (code, message) {
                (Some(code_str), Some(msg)) => format!("{}: {}", code_str, msg),
                (None, Some(msg)) => msg,
                _ => error_val.to_string(),
            });
        } else if let Some(text) = json_value_to_string(error_val) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    for key in ["status", "code"] {
        if let Some(status_str) = value.get(key).and_then(interpret_status_like_error) {
            let message = extract_message_fields(value, &["message", "msg", "detail"]);
            return Some(match message {
                Some(msg) => format!("{} {}: {}", key, status_str, msg),
                None => format!("{} {}", key, status_str),
            });
        }
    }

    if let Some(false) = value.get("success").and_then(|v| v.as_bool()) {
        return Some(
            extract_message_fields(value, &["message", "msg", "error"])
                .unwrap_or_else(|| "success flag was false".to_string()),
        );
    }

    None
}

fn interpret_status_like_error(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .filter(|int| *int != 0 && *int != 200)
            .map(|int| int.to_string()),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return (int != 0 && int != 200).then(|| int.to_string());
            }
            let lowered = trimmed.to_ascii_lowercase();
            if lowered.contains("error")
                || lowered.contains("fail")
                || lowered.contains("invalid")
                || lowered.contains("denied")
                || lowered.contains("unauthorized")
            {
                Some(trimmed.to_string())
            } else {
                None
            }
        }
        serde_json::Value::Bool(false) => Some("false".to_string()),
        _ => None,
    }
}

fn extract_message_fields(value: &serde_json::Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|key| value.get(*key))
        .filter_map(json_value_to_string)
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

fn json_value_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(json_value_to_string)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        }
        serde_json::Value::Object(_) => {
            extract_message_fields(value, &["message", "msg", "detail", "description"])
                .or_else(|| Some(value.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![ChatMessage::system("rules"), ChatMessage::user("hola")],
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    #[test]
    fn roles_serialize_lowercase() {
        let value = serde_json::to_value(ChatMessage::system("x")).unwrap();
        assert_eq!(value, json!({"role": "system", "content": "x"}));
    }

    #[tokio::test]
    async fn sends_request_and_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "test-model",
                "max_tokens": 512,
                "stream": false,
                "messages": [
                    {"role": "system", "content": "rules"},
                    {"role": "user", "content": "hola"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Hola"}}]}"#)
            .create_async()
            .await;

        let client = LLMClient::new(format!("{}/", server.url()), "sk-test".to_string(), 5).unwrap();
        let content = client.complete(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(content.as_deref(), Some("Hola"));
    }

    #[tokio::test]
    async fn empty_choices_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = LLMClient::new(server.url(), "k".to_string(), 5).unwrap();
        assert_eq!(client.complete(&request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_success_status_is_error_with_provider_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"code":"invalid_api_key","message":"Invalid API Key"}}"#)
            .create_async()
            .await;

        let client = LLMClient::new(server.url(), "bad".to_string(), 5).unwrap();
        let err = client.complete(&request()).await.unwrap_err().to_string();
        assert!(err.contains("401"), "{}", err);
        assert!(err.contains("invalid_api_key: Invalid API Key"), "{}", err);
    }

    #[test]
    fn joins_content_parts() {
        let value = json!({
            "choices": [{"message": {"content": [{"type": "text", "text": "Ho"}, "la"]}}]
        });
        assert_eq!(first_choice_content(&value).as_deref(), Some("Hola"));
    }

    #[test]
    fn reads_openai_style_error_object() {
        let value = json!({
            "error": {
                "message": "The model `gpt-oss-99b` does not exist or you do not have access to it.",
                "type": "invalid_request_error",
                "code": "model_not_found"
            }
        });
        let err = detect_provider_error(&value).expect("expected error");
        assert!(err.starts_with("model_not_found: The model `gpt-oss-99b`"), "{}", err);
    }

    #[test]
    fn reads_plain_string_error() {
        let value = json!({"error": "  Invalid API Key  "});
        assert_eq!(detect_provider_error(&value).as_deref(), Some("Invalid API Key"));
    }

    #[test]
    fn completion_body_without_choices_is_not_an_error() {
        let value = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "openai/gpt-oss-20b",
            "choices": [],
            "usage": {"prompt_tokens": 120, "completion_tokens": 0, "total_tokens": 120}
        });
        assert!(first_choice_content(&value).is_none());
        assert!(detect_provider_error(&value).is_none());
    }

    #[tokio::test]
    async fn error_body_with_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"error":{"type":"server_error","message":"Service Unavailable"}}"#)
            .create_async()
            .await;

        let client = LLMClient::new(server.url(), "k".to_string(), 5).unwrap();
        let err = client.complete(&request()).await.unwrap_err().to_string();
        assert!(err.contains("model test-model"), "{}", err);
        assert!(err.contains("server_error: Service Unavailable"), "{}", err);
    }
}
