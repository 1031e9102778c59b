use std::time::Duration;

use crate::{
    errors::{AppError, AppResult},
    providers::EmbeddingProvider,
};

/// Linear backoff unit between attempts of one failed batch
pub const BATCH_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// 分批嵌入文本
///
/// ## 功能说明
/// 将 `texts` 按 `batch_size` 切分为连续批次，按顺序逐批调用 `embed_many`，
/// 输出向量顺序与输入一致
///
/// ## 内部实现逻辑
/// 1. `batch_size` 为 0 时返回 `ValidationError`
/// 2. 每个批次最多尝试 `max(max_retries, 1)` 次，第 n 次失败后等待 `n * 1s`
/// 3. 某个批次耗尽重试次数时立即返回 `BatchEmbeddingExhausted`，不返回部分结果
///
/// ## 参数说明
/// - `concurrency_limit`: 保留参数，批次目前顺序执行
pub async fn embed_batched<P>(
    provider: &P,
    texts: &[String],
    batch_size: usize,
    concurrency_limit: usize,
    max_retries: u32,
) -> AppResult<Vec<Vec<f32>>>
where
    P: EmbeddingProvider + ?Sized,
{
    if batch_size == 0 {
        return Err(AppError::validation("batch_size must be greater than 0"));
    }
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let max_attempts = max_retries.max(1);
    tracing::debug!(
        texts = texts.len(),
        batch_size,
        concurrency_limit,
        max_attempts,
        "Starting batched embedding"
    );

    let mut vectors = Vec::with_capacity(texts.len());

    for (batch_index, chunk) in texts.chunks(batch_size).enumerate() {
        let start_index = batch_index * batch_size;
        let mut attempt: u32 = 0;

        let batch_vectors = loop {
            attempt += 1;
            match provider.embed_many(chunk).await {
                Ok(batch) => break batch,
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(start_index, attempt, max_attempts, error = %e, "Embedding batch failed, retrying");
                    tokio::time::sleep(BATCH_RETRY_BACKOFF * attempt).await;
                }
                Err(e) => {
                    tracing::error!(start_index, attempts = attempt, error = %e, "Embedding batch exhausted retries");
                    return Err(AppError::BatchEmbeddingExhausted {
                        start_index,
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        };

        if batch_vectors.len() != chunk.len() {
            return Err(AppError::ResponseParseError(format!(
                "Embedding batch at {} returned {} vectors for {} inputs",
                start_index,
                batch_vectors.len(),
                chunk.len()
            )));
        }

        vectors.extend(batch_vectors);
    }

    Ok(vectors)
}
