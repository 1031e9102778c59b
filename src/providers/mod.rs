pub mod batch;
pub mod builtin;
pub mod factory;
mod http;
pub mod openai;
pub mod registry;
pub mod rerank;
pub mod types;

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};

use crate::errors::{AppError, AppResult};

// Re-export the pieces most callers need
pub use builtin::register_builtin_providers;
pub use factory::ProviderFactory;
pub use registry::{ProviderConstructor, ProviderMetadata, ProviderRegistry};
pub use types::*;

/// Incremental chat responses; ends after exactly one `finished` response
pub type ChatStream = BoxStream<'static, Result<LLMResponse, AppError>>;

/// Behaviour shared by every provider regardless of capability
#[async_trait]
pub trait Provider: Send + Sync {
    /// Metadata describing this instance
    fn meta(&self) -> ProviderMeta;

    /// Issue a minimal real call against the backend
    ///
    /// When `model` is `None` or empty the backend picks one itself.
    async fn test(&self, model: Option<&str>) -> AppResult<()>;
}

/// Chat-completion backend contract
#[async_trait]
pub trait ChatProvider: Provider {
    fn current_key(&self) -> &str;

    fn list_keys(&self) -> Vec<String>;

    fn set_key(&mut self, key: String);

    /// Model ids reported by the backend's model-listing endpoint
    async fn list_models(&self) -> AppResult<Vec<String>>;

    /// Single blocking call returning the full response body
    async fn chat(&self, request: ChatRequest) -> AppResult<LLMResponse>;

    /// Streaming request whose whole SSE body is read before parsing
    async fn stream_chat_buffered(&self, request: ChatRequest) -> AppResult<Vec<LLMResponse>>;

    /// True incremental streaming as a lazy sequence of responses
    ///
    /// The next SSE line is only read from the transport when the stream is
    /// polled again. A transport failure yields a synthetic `finished`
    /// response followed by the error.
    ///
    /// The stream ends at the first `finish_reason == "stop"` chunk or the
    /// `[DONE]` sentinel. Anything the backend sends after that is not read,
    /// so a `usage` object delivered in a trailing chunk after the stop chunk
    /// is not reported; only usage carried on the terminal chunk itself is.
    async fn stream_chat(&self, request: ChatRequest) -> AppResult<ChatStream>;

    /// Callback form of [`ChatProvider::stream_chat`]
    ///
    /// `on_chunk` is called in delivery order and receives exactly one
    /// `finished == true` response per call, even when the request fails.
    async fn stream_chat_realtime(
        &self,
        request: ChatRequest,
        on_chunk: &mut (dyn FnMut(LLMResponse) + Send),
    ) -> AppResult<()> {
        match self.stream_chat(request).await {
            Ok(stream) => deliver_stream(stream, on_chunk).await,
            Err(e) => {
                tracing::error!(error = %e, "Streaming request failed before first chunk");
                on_chunk(LLMResponse::finished_marker());
                Err(e)
            }
        }
    }
}

/// Embedding backend contract
#[async_trait]
pub trait EmbeddingProvider: Provider {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// One vector per input, in input order
    async fn embed_many(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    /// Embed `texts` in fixed-size batches, retrying each batch independently
    async fn embed_batched(
        &self,
        texts: &[String],
        batch_size: usize,
        concurrency_limit: usize,
        max_retries: u32,
    ) -> AppResult<Vec<Vec<f32>>> {
        batch::embed_batched(self, texts, batch_size, concurrency_limit, max_retries).await
    }
}

/// Rerank backend contract
#[async_trait]
pub trait RerankProvider: Provider {
    /// Scores for `documents` against `query`, highest relevance first
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: Option<usize>,
    ) -> AppResult<Vec<RerankResult>>;
}

/// A constructed provider of any capability
pub enum ProviderInstance {
    Chat(Box<dyn ChatProvider>),
    Embedding(Box<dyn EmbeddingProvider>),
    Rerank(Box<dyn RerankProvider>),
}

impl ProviderInstance {
    pub fn capability(&self) -> CapabilityKind {
        match self {
            ProviderInstance::Chat(_) => CapabilityKind::ChatCompletion,
            ProviderInstance::Embedding(_) => CapabilityKind::Embedding,
            ProviderInstance::Rerank(_) => CapabilityKind::Rerank,
        }
    }

    pub fn meta(&self) -> ProviderMeta {
        match self {
            ProviderInstance::Chat(p) => p.meta(),
            ProviderInstance::Embedding(p) => p.meta(),
            ProviderInstance::Rerank(p) => p.meta(),
        }
    }

    pub fn into_chat(self) -> AppResult<Box<dyn ChatProvider>> {
        match self {
            ProviderInstance::Chat(p) => Ok(p),
            other => Err(other.mismatch(CapabilityKind::ChatCompletion)),
        }
    }

    pub fn into_embedding(self) -> AppResult<Box<dyn EmbeddingProvider>> {
        match self {
            ProviderInstance::Embedding(p) => Ok(p),
            other => Err(other.mismatch(CapabilityKind::Embedding)),
        }
    }

    pub fn into_rerank(self) -> AppResult<Box<dyn RerankProvider>> {
        match self {
            ProviderInstance::Rerank(p) => Ok(p),
            other => Err(other.mismatch(CapabilityKind::Rerank)),
        }
    }

    fn mismatch(&self, required: CapabilityKind) -> AppError {
        AppError::CapabilityMismatch {
            type_name: self.meta().type_name,
            required,
            actual: self.capability(),
        }
    }
}

/// Drive a chat stream into a callback, enforcing a single terminal response
///
/// Once a `finished` response has been delivered no further responses reach
/// `on_chunk`; an error is still returned to the caller.
pub async fn deliver_stream(
    mut stream: ChatStream,
    on_chunk: &mut (dyn FnMut(LLMResponse) + Send),
) -> AppResult<()> {
    let mut finished = false;

    while let Some(item) = stream.next().await {
        match item {
            Ok(response) => {
                if finished {
                    continue;
                }
                finished = response.finished;
                on_chunk(response);
            }
            Err(e) => {
                if !finished {
                    on_chunk(LLMResponse::finished_marker());
                }
                return Err(e);
            }
        }
    }

    if !finished {
        on_chunk(LLMResponse::finished_marker());
    }

    Ok(())
}
