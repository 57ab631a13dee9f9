//! Request, response and streaming types exchanged with completion services.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single completion request.
///
/// Built fresh for every attempt and never mutated by the pipeline once
/// handed to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// User-facing prompt text.
    pub user: String,

    /// System prompt text, empty when unused.
    #[serde(default)]
    pub system: String,

    /// Model identifier.
    pub model: String,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// Upper bound on generated tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Stop sequences.
    #[serde(default)]
    pub stop: Vec<String>,

    /// Free-form request metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CompletionRequest {
    /// Create a request for `model` with the given user text.
    pub fn new(model: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            system: String::new(),
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            stop: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the generated token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the stop sequences.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Combined byte length of system and user text.
    pub fn input_len(&self) -> usize {
        self.system.len() + self.user.len()
    }
}

/// Token accounting for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,

    /// Tokens generated.
    pub completion_tokens: u32,

    /// Sum of prompt and completion tokens.
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create usage from prompt and completion counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A completed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub content: String,

    /// Model that produced the response.
    pub model: String,

    /// Token usage.
    #[serde(default)]
    pub usage: TokenUsage,

    /// Why generation stopped, if the service reports it.
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Provider-specific metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CompletionResponse {
    /// Create a response with content and model, no usage.
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: TokenUsage::default(),
            finish_reason: None,
            metadata: HashMap::new(),
        }
    }

    /// Set token usage.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Set the finish reason.
    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }
}

/// One piece of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta.
    pub content: String,

    /// Set on the final chunk.
    pub done: bool,

    /// Usage, usually only on the final chunk.
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// A content delta.
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
            usage: None,
        }
    }

    /// The terminating chunk.
    pub fn done(usage: Option<TokenUsage>) -> Self {
        Self {
            content: String::new(),
            done: true,
            usage,
        }
    }
}

/// Capabilities of a model as reported by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,

    /// Context window in tokens.
    pub context_size: u32,

    /// Whether [`stream`](crate::CompletionService::stream) is supported.
    pub supports_streaming: bool,
}

impl ModelInfo {
    /// Create model info.
    pub fn new(id: impl Into<String>, context_size: u32, supports_streaming: bool) -> Self {
        Self {
            id: id.into(),
            context_size,
            supports_streaming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("gpt-4", "Hello")
            .with_system("Be brief")
            .with_temperature(0.3)
            .with_max_tokens(64)
            .with_stop(vec!["\n\n".to_string()])
            .with_metadata("task", serde_json::json!("greet"));

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.user, "Hello");
        assert_eq!(request.system, "Be brief");
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.stop.len(), 1);
        assert_eq!(request.metadata["task"], "greet");
        assert_eq!(request.input_len(), 13);
    }

    #[test]
    fn test_usage_total() {
        let usage = TokenUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn test_response_deserializes_with_missing_optional_fields() {
        let response: CompletionResponse =
            serde_json::from_str(r#"{"content":"hi","model":"m"}"#).unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.usage, TokenUsage::default());
        assert!(response.finish_reason.is_none());
    }
}
