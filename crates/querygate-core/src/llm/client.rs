//! # LLM API Client
//!
//! Sends a SQL generation prompt to Claude, OpenAI, or Azure OpenAI and
//! returns the raw completion text with the token usage the API reported.
//! The provider is picked from the environment, or forced with
//! `[llm] provider` in querygate.toml.

use crate::config::LlmConfig;
use crate::error::{QueryGateError, Result};
use crate::metrics::TokenUsage;

const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Raw model output for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Supported LLM providers.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Claude {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
    },
    Azure {
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

impl LlmProvider {
    /// Auto-detect provider from environment variables.
    ///
    /// Checks `ANTHROPIC_API_KEY`, then `OPENAI_API_KEY`, then
    /// `AZURE_OPENAI_API_KEY` with `AZURE_OPENAI_ENDPOINT`.
    pub fn from_env(model_override: Option<&str>) -> Result<Self> {
        for name in ["claude", "openai", "azure"] {
            if let Some(provider) = Self::named(name, model_override)? {
                return Ok(provider);
            }
        }

        Err(generation_error(
            "No LLM API key found. Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or AZURE_OPENAI_API_KEY with AZURE_OPENAI_ENDPOINT.",
        ))
    }

    /// Build from the `[llm]` config section. An explicit provider must have
    /// its credentials in the environment; otherwise falls back to `from_env`.
    pub fn from_config(config: &LlmConfig, model_override: Option<&str>) -> Result<Self> {
        let model = model_override.or(config.model.as_deref());
        match &config.provider {
            Some(name) => Self::named(&name.to_lowercase(), model)?.ok_or_else(|| {
                generation_error(&format!(
                    "llm.provider is '{}' but its API key is not set in the environment",
                    name
                ))
            }),
            None => Self::from_env(model),
        }
    }

    fn named(name: &str, model: Option<&str>) -> Result<Option<Self>> {
        let provider = match name {
            "claude" => env("ANTHROPIC_API_KEY").map(|api_key| LlmProvider::Claude {
                api_key,
                model: model.unwrap_or(DEFAULT_CLAUDE_MODEL).to_string(),
            }),
            "openai" => env("OPENAI_API_KEY").map(|api_key| LlmProvider::OpenAI {
                api_key,
                model: model.unwrap_or(DEFAULT_OPENAI_MODEL).to_string(),
            }),
            "azure" => match (env("AZURE_OPENAI_API_KEY"), env("AZURE_OPENAI_ENDPOINT")) {
                (Some(api_key), Some(endpoint)) => Some(LlmProvider::Azure {
                    api_key,
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    deployment: model
                        .map(str::to_string)
                        .or_else(|| env("AZURE_OPENAI_DEPLOYMENT_NAME"))
                        .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    api_version: env("AZURE_OPENAI_API_VERSION")
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                }),
                _ => None,
            },
            other => {
                return Err(generation_error(&format!(
                    "Unknown LLM provider '{}'",
                    other
                )))
            }
        };
        Ok(provider)
    }

    /// Short label for logs, e.g. "openai/gpt-4o".
    pub fn label(&self) -> String {
        match self {
            LlmProvider::Claude { model, .. } => format!("claude/{}", model),
            LlmProvider::OpenAI { model, .. } => format!("openai/{}", model),
            LlmProvider::Azure { deployment, .. } => format!("azure/{}", deployment),
        }
    }

    /// Send a prompt to the LLM and return the raw response text.
    pub async fn complete(&self, prompt: &str) -> Result<Completion> {
        tracing::debug!("Calling {} ({} prompt chars)", self.label(), prompt.len());
        match self {
            LlmProvider::Claude { api_key, model } => call_claude(api_key, model, prompt).await,
            LlmProvider::OpenAI { api_key, model } => {
                let request = build_http_client()
                    .post("https://api.openai.com/v1/chat/completions")
                    .header("Authorization", format!("Bearer {}", api_key))
                    .json(&chat_body(Some(model), prompt));
                call_chat_completions("OpenAI", request).await
            }
            LlmProvider::Azure {
                api_key,
                endpoint,
                deployment,
                api_version,
            } => {
                let request = build_http_client()
                    .post(azure_url(endpoint, deployment, api_version))
                    .header("api-key", api_key)
                    .json(&chat_body(None, prompt));
                call_chat_completions("Azure OpenAI", request).await
            }
        }
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn generation_error(message: &str) -> QueryGateError {
    QueryGateError::Generation {
        message: message.to_string(),
    }
}

/// Maximum time to wait for an LLM API response before aborting.
const API_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(45);

fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(API_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn azure_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint, deployment, api_version
    )
}

/// Chat Completions body. Azure takes the model from the deployment path.
fn chat_body(model: Option<&str>, prompt: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "messages": [
            {
                "role": "user",
                "content": prompt
            }
        ],
        "max_tokens": 1024,
        "temperature": 0
    });
    if let Some(model) = model {
        body["model"] = serde_json::Value::String(model.to_string());
    }
    body
}

/// Call the Anthropic Messages API.
async fn call_claude(api_key: &str, model: &str, prompt: &str) -> Result<Completion> {
    let body = serde_json::json!({
        "model": model,
        "max_tokens": 1024,
        "temperature": 0,
        "messages": [
            {
                "role": "user",
                "content": prompt
            }
        ]
    });

    let request = build_http_client()
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .json(&body);
    let parsed = send("Claude", request).await?;

    let text = parsed["content"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|block| block["text"].as_str())
        .map(str::to_string)
        .ok_or_else(|| generation_error("Claude API response missing content[0].text"))?;
    Ok(Completion {
        text,
        usage: claude_usage(&parsed),
    })
}

/// Anthropic reports `usage.input_tokens` / `usage.output_tokens`.
fn claude_usage(parsed: &serde_json::Value) -> TokenUsage {
    let usage = &parsed["usage"];
    TokenUsage::new(
        usage["input_tokens"].as_u64().unwrap_or(0),
        usage["output_tokens"].as_u64().unwrap_or(0),
    )
}

/// Chat Completions reports `usage.prompt_tokens` / `usage.completion_tokens`
/// and its own `total_tokens`.
fn chat_usage(parsed: &serde_json::Value) -> TokenUsage {
    let usage = &parsed["usage"];
    let mut tokens = TokenUsage::new(
        usage["prompt_tokens"].as_u64().unwrap_or(0),
        usage["completion_tokens"].as_u64().unwrap_or(0),
    );
    if let Some(total) = usage["total_tokens"].as_u64() {
        tokens.total_tokens = total;
    }
    tokens
}

/// Call an OpenAI-compatible Chat Completions endpoint.
async fn call_chat_completions(label: &str, request: reqwest::RequestBuilder) -> Result<Completion> {
    let parsed = send(label, request).await?;

    let text = parsed["choices"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            generation_error(&format!(
                "{} API response missing choices[0].message.content",
                label
            ))
        })?;
    Ok(Completion {
        text,
        usage: chat_usage(&parsed),
    })
}

async fn send(label: &str, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
    let response = request
        .header("content-type", "application/json")
        .send()
        .await
        .map_err(|e| generation_error(&format!("Failed to call {} API: {}", label, e)))?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .map_err(|e| generation_error(&format!("Failed to read {} API response: {}", label, e)))?;

    if !status.is_success() {
        return Err(generation_error(&format!(
            "{} API returned {}: {}",
            label,
            status,
            truncate(&response_text, 500),
        )));
    }

    serde_json::from_str(&response_text).map_err(|e| {
        generation_error(&format!("Failed to parse {} API response JSON: {}", label, e))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_unknown_provider() {
        let err = LlmProvider::named("bard", None).unwrap_err();
        assert!(err.to_string().contains("bard"));
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = LlmConfig {
            provider: Some("palm".to_string()),
            model: None,
        };
        assert!(LlmProvider::from_config(&config, None).is_err());
    }

    #[test]
    fn test_azure_url() {
        assert_eq!(
            azure_url("https://acme.openai.azure.com", "gpt-4o", "2024-08-01-preview"),
            "https://acme.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-08-01-preview"
        );
    }

    #[test]
    fn test_chat_body_is_deterministic() {
        let body = chat_body(Some("gpt-4o"), "hello");
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["messages"][0]["content"], "hello");

        let azure = chat_body(None, "hello");
        assert!(azure.get("model").is_none());
    }

    #[test]
    fn test_labels() {
        let claude = LlmProvider::Claude {
            api_key: "k".to_string(),
            model: "m".to_string(),
        };
        assert_eq!(claude.label(), "claude/m");
        let azure = LlmProvider::Azure {
            api_key: "k".to_string(),
            endpoint: "https://e".to_string(),
            deployment: "prod-gpt".to_string(),
            api_version: "v".to_string(),
        };
        assert_eq!(azure.label(), "azure/prod-gpt");
    }

    #[test]
    fn test_usage_parsing() {
        let claude = serde_json::json!({
            "content": [{"type": "text", "text": "SELECT 1"}],
            "usage": {"input_tokens": 812, "output_tokens": 24}
        });
        assert_eq!(claude_usage(&claude), TokenUsage::new(812, 24));

        let openai = serde_json::json!({
            "choices": [{"message": {"content": "SELECT 1"}}],
            "usage": {"prompt_tokens": 700, "completion_tokens": 30, "total_tokens": 735}
        });
        let usage = chat_usage(&openai);
        assert_eq!(usage.prompt_tokens, 700);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.total_tokens, 735);

        assert_eq!(chat_usage(&serde_json::json!({})), TokenUsage::default());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[test]
    fn test_http_client_builds() {
        let client = build_http_client();
        assert!(std::mem::size_of_val(&client) > 0);
    }
}
