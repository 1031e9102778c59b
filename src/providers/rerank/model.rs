use serde::{Deserialize, Serialize};

// Jina/Cohere-style rerank wire structures
#[derive(Serialize, Debug)]
pub struct RerankRequest<'a> {
    pub model: &'a str,
    pub query: &'a str,
    pub documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,
}

#[derive(Deserialize, Debug)]
pub struct RerankResponse {
    #[serde(default)]
    pub results: Vec<RerankItem>,
}

#[derive(Deserialize, Debug)]
pub struct RerankItem {
    pub index: usize,
    pub relevance_score: f64,
}
