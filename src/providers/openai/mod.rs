pub mod embedding;
pub mod model;
pub mod protocol;
pub mod provider;

pub use embedding::OpenAIEmbeddingProvider;
pub use model::*;
pub use provider::OpenAIProvider;
