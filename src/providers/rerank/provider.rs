use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::{
    errors::{AppError, AppResult},
    providers::{
        Provider, RerankProvider,
        http::{send_with_retries, with_auth},
        rerank::model::{RerankRequest, RerankResponse},
        types::{CapabilityKind, ConnectionConfig, ProviderMeta, RerankResult},
    },
};

pub const DEFAULT_RERANK_BASE_URL: &str = "https://api.jina.ai/v1";
pub const DEFAULT_RERANK_MODEL: &str = "jina-reranker-v2-base-multilingual";

/// Rerank provider for Jina/Cohere-compatible `/rerank` endpoints
pub struct RerankApiProvider {
    connection: ConnectionConfig,
    client: Client,
    model: String,
}

impl RerankApiProvider {
    pub const TYPE_NAME: &'static str = "rerank_api";

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
            .unwrap_or(DEFAULT_RERANK_MODEL)
            .to_string();

        Ok(Self {
            connection,
            client,
            model,
        })
    }

    pub fn default_config_template() -> HashMap<String, Value> {
        HashMap::from([
            ("api_key".to_string(), json!("")),
            ("base_url".to_string(), json!(DEFAULT_RERANK_BASE_URL)),
            ("timeout".to_string(), json!(30)),
            ("max_retries".to_string(), json!(3)),
            ("model".to_string(), json!(DEFAULT_RERANK_MODEL)),
        ])
    }

    async fn request_rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> AppResult<Vec<RerankResult>> {
        let body = RerankRequest {
            model,
            query,
            documents,
            top_n,
        };
        let timeout = self.connection.timeout_duration();

        let text = send_with_retries(Self::TYPE_NAME, self.connection.max_retries, || {
            with_auth(
                self.client.post(self.connection.endpoint("rerank")),
                &self.connection.api_key,
            )
            .timeout(timeout)
            .json(&body)
        })
        .await?;

        let parsed: RerankResponse = serde_json::from_str(&text)
            .map_err(|e| AppError::ResponseParseError(format!("Invalid rerank body: {}", e)))?;

        let mut results = parsed
            .results
            .into_iter()
            .map(|item| {
                if item.index >= documents.len() {
                    return Err(AppError::ResponseParseError(format!(
                        "Rerank result index {} out of range for {} documents",
                        item.index,
                        documents.len()
                    )));
                }
                Ok(RerankResult {
                    index: item.index,
                    relevance_score: item.relevance_score,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        if let Some(n) = top_n {
            results.truncate(n);
        }

        Ok(results)
    }
}

#[async_trait]
impl Provider for RerankApiProvider {
    fn meta(&self) -> ProviderMeta {
        ProviderMeta {
            id: Self::TYPE_NAME.to_string(),
            type_name: Self::TYPE_NAME.to_string(),
            model: self.model.clone(),
            capability: CapabilityKind::Rerank,
        }
    }

    async fn test(&self, model: Option<&str>) -> AppResult<()> {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(self.model.as_str());
        tracing::info!(provider = Self::TYPE_NAME, model, "Testing provider connectivity");

        self.request_rerank(model, "test", &["test".to_string()], Some(1))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Provider connectivity test failed"))?;
        Ok(())
    }
}

#[async_trait]
impl RerankProvider for RerankApiProvider {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> AppResult<Vec<RerankResult>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(provider = Self::TYPE_NAME, documents = documents.len(), ?top_n, "Rerank request");
        self.request_rerank(&self.model, query, documents, top_n).await
    }
}
