use std::{collections::HashMap, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::{
    errors::{AppError, AppResult},
    providers::{
        ChatProvider, ChatStream, Provider,
        http::{ensure_success, send_for_text, send_with_retries, with_auth},
        openai::{
            model::ModelsResponse,
            protocol::{build_request_body, parse_chat_response, parse_sse_body, sse_line_stream, sse_response_stream},
        },
        types::{CapabilityKind, ChatRequest, ConnectionConfig, LLMResponse, ModelSettings, ProviderMeta},
    },
};

/// Model used by `test()` when neither the caller nor the backend names one
pub const DEFAULT_TEST_MODEL: &str = "gpt-3.5-turbo";

/// Per-request timeout of `test()` calls
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI-compatible chat completion provider
pub struct OpenAIProvider {
    connection: ConnectionConfig,
    settings: ModelSettings,
    client: Client,
}

impl OpenAIProvider {
    pub const TYPE_NAME: &'static str = "openai";

    /// Build a provider; fails on an unusable base URL or HTTP client setup
    ///
    /// `timeout` bounds connection setup here; each call applies its own
    /// request-level timeout on top.
    pub fn new(connection: ConnectionConfig, settings: ModelSettings) -> anyhow::Result<Self> {
        if !connection.base_url.starts_with("http://") && !connection.base_url.starts_with("https://") {
            anyhow::bail!("base_url must start with http:// or https://, got '{}'", connection.base_url);
        }

        let client = Client::builder()
            .connect_timeout(connection.timeout_duration())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            connection,
            settings,
            client,
        })
    }

    /// Configuration template registered for this backend
    pub fn default_config_template() -> HashMap<String, Value> {
        HashMap::from([
            ("api_key".to_string(), json!("")),
            ("base_url".to_string(), json!("https://api.openai.com/v1")),
            ("timeout".to_string(), json!(60)),
            ("max_retries".to_string(), json!(3)),
        ])
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    fn post(&self, path: &str) -> RequestBuilder {
        with_auth(self.client.post(self.connection.endpoint(path)), &self.connection.api_key)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        with_auth(self.client.get(self.connection.endpoint(path)), &self.connection.api_key)
    }

    async fn fetch_models(&self, timeout: Duration) -> AppResult<Vec<String>> {
        let body = send_with_retries(Self::TYPE_NAME, self.connection.max_retries, || {
            self.get("models").timeout(timeout)
        })
        .await?;

        let models: ModelsResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::ResponseParseError(format!("Invalid models body: {}", e)))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: Self::TYPE_NAME.to_string(),
            type_name: Self::TYPE_NAME.to_string(),
            model: self.settings.model.clone().unwrap_or_default(),
            capability: CapabilityKind::ChatCompletion,
        }
    }

    async fn test(&self, model: Option<&str>) -> AppResult<()> {
        let mut model = model.filter(|m| !m.is_empty()).map(str::to_string);
        tracing::info!(provider = Self::TYPE_NAME, model = ?model, "Testing provider connectivity");

        if model.is_none() {
            match self.fetch_models(TEST_TIMEOUT).await {
                Ok(models) => {
                    model = models.into_iter().next();
                    if let Some(first) = &model {
                        tracing::info!(model = %first, "Using first listed model for test");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Could not list models for test"),
            }
        }

        let model = model.unwrap_or_else(|| {
            tracing::warn!(model = DEFAULT_TEST_MODEL, "No model available, falling back to default test model");
            DEFAULT_TEST_MODEL.to_string()
        });

        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": "Hi"}],
            "max_tokens": 5,
        });

        send_for_text(self.post("chat/completions").timeout(TEST_TIMEOUT).json(&body))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Provider connectivity test failed"))?;

        tracing::info!(provider = Self::TYPE_NAME, %model, "Provider connectivity test succeeded");
        Ok(())
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn current_key(&self) -> &str {
        &self.connection.api_key
    }

    fn list_keys(&self) -> Vec<String> {
        if self.connection.api_key.is_empty() {
            Vec::new()
        } else {
            vec![self.connection.api_key.clone()]
        }
    }

    fn set_key(&mut self, key: String) {
        self.connection.api_key = key;
    }

    async fn list_models(&self) -> AppResult<Vec<String>> {
        self.fetch_models(self.connection.timeout_duration()).await
    }

    async fn chat(&self, request: ChatRequest) -> AppResult<LLMResponse> {
        let body = build_request_body(&request, &self.settings, false)?;
        tracing::info!(provider = Self::TYPE_NAME, model = %body.model, "Chat request");

        let timeout = self.connection.timeout_duration();
        let text = send_with_retries(Self::TYPE_NAME, self.connection.max_retries, || {
            self.post("chat/completions").timeout(timeout).json(&body)
        })
        .await?;

        parse_chat_response(&text)
    }

    async fn stream_chat_buffered(&self, request: ChatRequest) -> AppResult<Vec<LLMResponse>> {
        let body = build_request_body(&request, &self.settings, true)?;
        tracing::info!(provider = Self::TYPE_NAME, model = %body.model, "Buffered stream request");

        let text = send_for_text(
            self.post("chat/completions")
                .timeout(self.connection.timeout_duration())
                .json(&body),
        )
        .await?;

        let responses = parse_sse_body(&text);
        tracing::debug!(chunks = responses.len(), "Buffered stream parsed");
        Ok(responses)
    }

    async fn stream_chat(&self, request: ChatRequest) -> AppResult<ChatStream> {
        let body = build_request_body(&request, &self.settings, true)?;
        tracing::info!(provider = Self::TYPE_NAME, model = %body.model, "Realtime stream request");

        // Bounds connect plus time to response headers; the body is unbounded
        let timeout = self.connection.timeout_duration();
        let response = tokio::time::timeout(timeout, self.post("chat/completions").json(&body).send())
            .await
            .map_err(|_| AppError::stream_transport(format!("No response headers within {:?}", timeout)))?
            .map_err(|e| AppError::stream_transport(format!("Failed to send stream request: {}", e)))?;

        let response = ensure_success(response).await?;

        Ok(Box::pin(sse_response_stream(sse_line_stream(response))))
    }
}
