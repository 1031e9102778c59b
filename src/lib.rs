pub mod config;
pub mod errors;
pub mod providers;

// Re-export commonly used types for easier access
pub use config::{Config, load_config};
pub use errors::{AppError, AppResult};
pub use providers::{
    ChatProvider, EmbeddingProvider, ProviderFactory, ProviderInstance, ProviderRegistry, RerankProvider,
};
