use std::{collections::HashMap, fmt, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which capability a provider implements
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    ChatCompletion,
    Embedding,
    Rerank,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::ChatCompletion => "chat_completion",
            CapabilityKind::Embedding => "embedding",
            CapabilityKind::Rerank => "rerank",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-level connection settings, already decrypted by the caller
///
/// Keys other than the four typed ones are kept in `extra` so that
/// backend-specific options (`model`, `dimensions`, ...) travel with the config.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_timeout() -> u64 { 60 }
fn default_max_retries() -> u32 { 3 }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            extra: HashMap::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Build a typed config from a free-form key/value map
    pub fn from_map(map: &HashMap<String, Value>) -> anyhow::Result<Self> {
        let value = Value::Object(map.clone().into_iter().collect());
        serde_json::from_value(value).context("Invalid connection config")
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Join `path` onto the base URL, tolerating a trailing slash on either side
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(Value::as_u64)
    }
}

/// Per-call defaults for chat-completion providers
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ModelSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

impl ModelSettings {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn from_map(map: &HashMap<String, Value>) -> anyhow::Result<Self> {
        let value = Value::Object(map.clone().into_iter().collect());
        serde_json::from_value(value).context("Invalid model settings")
    }
}

/// OpenAI-format conversation message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Text of the message when its content is a plain string
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// Message content: either a plain string or a list of multimodal parts
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Multimodal content block
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: url.into(),
                detail: None,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Tool call carried on an assistant message
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// Tool definition offered to the model
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolSpec {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: Some(description.into()),
                parameters: Some(parameters),
            },
        }
    }
}

/// Result of a tool call the caller executed, replayed into the next request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: String,
}

impl ToolCallResult {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            result: result.into(),
        }
    }

    /// The assistant tool-call message followed by the tool-role result message
    pub fn to_messages(&self) -> [ChatMessage; 2] {
        let arguments = if self.args.is_null() {
            "{}".to_string()
        } else {
            self.args.to_string()
        };

        let call = ChatMessage {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: self.id.clone(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: self.name.clone(),
                    arguments,
                },
            }]),
            tool_call_id: None,
            name: None,
        };

        let result = ChatMessage {
            role: "tool".to_string(),
            content: Some(MessageContent::Text(self.result.clone())),
            tool_calls: None,
            tool_call_id: Some(self.id.clone()),
            name: None,
        };

        [call, result]
    }
}

/// Engine-level chat request
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub contexts: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub tool_call_results: Vec<ToolCallResult>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub extra_content_parts: Vec<ContentPart>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_contexts(mut self, contexts: Vec<ChatMessage>) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_call_results(mut self, results: Vec<ToolCallResult>) -> Self {
        self.tool_call_results = results;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Token accounting for one response
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_other: u32,
    pub input_cached: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_other + self.input_cached + self.output
    }
}

/// One model response; a full body for `chat`, a single chunk when streaming
///
/// `tool_call_ids`, `tool_call_names` and `tool_call_args` are parallel:
/// index `i` in all three refers to the same call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LLMResponse {
    pub id: Option<String>,
    pub role: String,
    pub content: String,
    pub delta: String,
    pub tool_call_ids: Vec<String>,
    pub tool_call_names: Vec<String>,
    pub tool_call_args: Vec<String>,
    pub usage: Option<TokenUsage>,
    pub finished: bool,
    pub reasoning_content: Option<String>,
    pub is_chunk: bool,
}

impl Default for LLMResponse {
    fn default() -> Self {
        Self {
            id: None,
            role: "assistant".to_string(),
            content: String::new(),
            delta: String::new(),
            tool_call_ids: Vec::new(),
            tool_call_names: Vec::new(),
            tool_call_args: Vec::new(),
            usage: None,
            finished: false,
            reasoning_content: None,
            is_chunk: false,
        }
    }
}

impl LLMResponse {
    /// Terminal stream marker carrying no content
    pub fn finished_marker() -> Self {
        Self {
            finished: true,
            is_chunk: true,
            ..Self::default()
        }
    }

    pub fn push_tool_call(&mut self, id: String, name: String, args: String) {
        self.tool_call_ids.push(id);
        self.tool_call_names.push(name);
        self.tool_call_args.push(args);
    }

    /// Iterate the tool calls as `(id, name, args)` triples
    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.tool_call_ids
            .iter()
            .zip(&self.tool_call_names)
            .zip(&self.tool_call_args)
            .map(|((id, name), args)| (id.as_str(), name.as_str(), args.as_str()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RerankResult {
    /// Position in the original candidate list
    pub index: usize,
    pub relevance_score: f64,
}

/// Basic metadata of a live provider instance
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProviderMeta {
    pub id: String,
    pub type_name: String,
    pub model: String,
    pub capability: CapabilityKind,
}
