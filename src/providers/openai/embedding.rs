use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::{
    errors::{AppError, AppResult},
    providers::{
        EmbeddingProvider, Provider,
        http::{send_with_retries, with_auth},
        openai::model::{EmbeddingRequest, EmbeddingResponse},
        types::{CapabilityKind, ConnectionConfig, ProviderMeta},
    },
};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// OpenAI-compatible `/embeddings` provider
///
/// Reads `model` and `dimensions` from the connection config's extra keys.
pub struct OpenAIEmbeddingProvider {
    connection: ConnectionConfig,
    client: Client,
    model: String,
    dimensions: Option<u64>,
}

impl OpenAIEmbeddingProvider {
    pub const TYPE_NAME: &'static str = "openai_embedding";

    pub fn new(connection: ConnectionConfig) -> anyhow::Result<Self> {
        if !connection.base_url.starts_with("http://") && !connection.base_url.starts_with("https://") {
            anyhow::bail!("base_url must start with http:// or https://, got '{}'", connection.base_url);
        }

        let client = Client::builder()
            .connect_timeout(connection.timeout_duration())
            .build()
            .context("Failed to build HTTP client")?;

        let model = connection
            .extra_str("model")
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_EMBEDDING_MODEL)
            .to_string();
        let dimensions = connection.extra_u64("dimensions");

        Ok(Self {
            connection,
            client,
            model,
            dimensions,
        })
    }

    pub fn default_config_template() -> HashMap<String, Value> {
        HashMap::from([
            ("api_key".to_string(), json!("")),
            ("base_url".to_string(), json!("https://api.openai.com/v1")),
            ("timeout".to_string(), json!(60)),
            ("max_retries".to_string(), json!(3)),
            ("model".to_string(), json!(DEFAULT_EMBEDDING_MODEL)),
        ])
    }

    async fn request_embeddings(&self, model: &str, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model,
            input: texts,
            dimensions: self.dimensions,
        };
        let timeout = self.connection.timeout_duration();

        let text = send_with_retries(Self::TYPE_NAME, self.connection.max_retries, || {
            with_auth(
                self.client.post(self.connection.endpoint("embeddings")),
                &self.connection.api_key,
            )
            .timeout(timeout)
            .json(&body)
        })
        .await?;

        let mut parsed: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::ResponseParseError(format!("Invalid embeddings body: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(AppError::ResponseParseError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Provider for OpenAIEmbeddingProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: Self::TYPE_NAME.to_string(),
            type_name: Self::TYPE_NAME.to_string(),
            model: self.model.clone(),
            capability: CapabilityKind::Embedding,
        }
    }

    async fn test(&self, model: Option<&str>) -> AppResult<()> {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(self.model.as_str());
        tracing::info!(provider = Self::TYPE_NAME, model, "Testing provider connectivity");

        self.request_embeddings(model, &["test".to_string()])
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Provider connectivity test failed"))?;
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.request_embeddings(&self.model, &[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::ResponseParseError("Empty embeddings response".to_string()))
    }

    async fn embed_many(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(provider = Self::TYPE_NAME, count = texts.len(), "Embedding texts");
        self.request_embeddings(&self.model, texts).await
    }

    fn dimension(&self) -> usize {
        self.dimensions
            .map(|d| d as usize)
            .unwrap_or(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}
