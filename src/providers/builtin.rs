//! Hand-written registration list of the backends shipped with the crate

use crate::{
    errors::AppResult,
    providers::{
        ChatProvider, EmbeddingProvider, RerankProvider,
        openai::{OpenAIEmbeddingProvider, OpenAIProvider},
        registry::{ProviderConstructor, ProviderRegistry},
        rerank::RerankApiProvider,
        types::{CapabilityKind, ConnectionConfig, ModelSettings},
    },
};

pub fn create_openai(
    connection: ConnectionConfig,
    settings: ModelSettings,
) -> anyhow::Result<Box<dyn ChatProvider>> {
    let provider: Box<dyn ChatProvider> = Box::new(OpenAIProvider::new(connection, settings)?);
    Ok(provider)
}

pub fn create_openai_embedding(connection: ConnectionConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = Box::new(OpenAIEmbeddingProvider::new(connection)?);
    Ok(provider)
}

pub fn create_rerank_api(connection: ConnectionConfig) -> anyhow::Result<Box<dyn RerankProvider>> {
    let provider: Box<dyn RerankProvider> = Box::new(RerankApiProvider::new(connection)?);
    Ok(provider)
}

/// Register every built-in backend; call once per registry
pub fn register_builtin_providers(registry: &ProviderRegistry) -> AppResult<()> {
    registry.register(
        OpenAIProvider::TYPE_NAME,
        "OpenAI and OpenAI-compatible chat completion APIs",
        CapabilityKind::ChatCompletion,
        OpenAIProvider::default_config_template(),
        "OpenAI",
        ProviderConstructor::Chat(create_openai),
    )?;

    registry.register(
        OpenAIEmbeddingProvider::TYPE_NAME,
        "OpenAI-compatible embeddings API",
        CapabilityKind::Embedding,
        OpenAIEmbeddingProvider::default_config_template(),
        "OpenAI Embedding",
        ProviderConstructor::Embedding(create_openai_embedding),
    )?;

    registry.register(
        RerankApiProvider::TYPE_NAME,
        "Jina/Cohere-compatible rerank API",
        CapabilityKind::Rerank,
        RerankApiProvider::default_config_template(),
        "Rerank API",
        ProviderConstructor::Rerank(create_rerank_api),
    )?;

    tracing::info!(count = registry.len(), "Built-in providers registered");
    Ok(())
}
