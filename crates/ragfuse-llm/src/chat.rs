//! Chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use ragfuse_core::{GenerationRequest, LlmConfig, RagError, Result, TextGenerator};

/// Request body for chat completions (OpenAI format).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// Response: choices[0].message.content.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for chat completions.
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        Self::with_timeout(endpoint, model, api_key, Duration::from_secs(60))
    }

    /// Build a client from the `[llm]` config section, reading the key from
    /// the configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::with_timeout(
            &config.endpoint,
            &config.model,
            config.api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn with_timeout(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    fn request_body<'a>(&'a self, request: &'a GenerationRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: &request.prompt,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// Pull the first choice's text out of a response body.
fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| RagError::generation(format!("LLM response parse error: {}", e)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RagError::generation("LLM response has no choices"))?;

    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.request_body(request);

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let res = req.send().await.map_err(|e| {
            error!("LLM request failed: {}", e);
            RagError::generation(format!("LLM request failed: {}", e))
        })?;
        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| RagError::generation(format!("Failed to read LLM response: {}", e)))?;

        if !status.is_success() {
            error!("LLM API error {}", status);
            return Err(RagError::generation(format!("LLM API error {}: {}", status, text)));
        }

        let answer = parse_response(&text)?;
        debug!("LLM returned {} chars from {}", answer.len(), self.model);
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ChatClient {
        ChatClient::new("http://127.0.0.1:1/v1/chat/completions", "test-model", None).unwrap()
    }

    #[test]
    fn test_request_body_with_system() {
        let client = client();
        let request = GenerationRequest::new("What is fusion?")
            .with_system("Answer from context.")
            .with_temperature(0.2)
            .with_max_tokens(64);

        let body = serde_json::to_value(client.request_body(&request)).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "test-model",
                "messages": [
                    {"role": "system", "content": "Answer from context."},
                    {"role": "user", "content": "What is fusion?"}
                ],
                "temperature": 0.2f32,
                "max_tokens": 64
            })
        );
    }

    #[test]
    fn test_request_body_without_system() {
        let client = client();
        let request = GenerationRequest::new("Summarize this");

        let body = serde_json::to_value(client.request_body(&request)).unwrap();

        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"Hello"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Hello");
    }

    #[test]
    fn test_parse_response_errors() {
        let err = parse_response(r#"{"choices":[]}"#).unwrap_err();
        assert_eq!(err.error_code(), "GENERATION_ERROR");

        let err = parse_response("not json").unwrap_err();
        assert_eq!(err.error_code(), "GENERATION_ERROR");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let err = client()
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "GENERATION_ERROR");
    }

    #[test]
    fn test_from_config() {
        let config = LlmConfig {
            api_key_env: "RAGFUSE_TEST_KEY_THAT_IS_UNSET".to_string(),
            ..LlmConfig::default()
        };
        let client = ChatClient::from_config(&config).unwrap();
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
        assert!(client.api_key.is_none());
    }
}
