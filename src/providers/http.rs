use std::time::Duration;

use reqwest::{RequestBuilder, Response};

use crate::errors::{AppError, AppResult};

/// Linear backoff unit between retried non-stream calls
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Attach a bearer token when one is configured
pub(crate) fn with_auth(builder: RequestBuilder, api_key: &str) -> RequestBuilder {
    if api_key.is_empty() {
        builder
    } else {
        builder.bearer_auth(api_key)
    }
}

/// Turn a non-2xx response into `ApiCallFailure`, keeping the body
pub(crate) async fn ensure_success(response: Response) -> AppResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(AppError::api_call_failure(status, body))
}

/// Send a request and read its body as text
pub(crate) async fn send_for_text(builder: RequestBuilder) -> AppResult<String> {
    let response = builder
        .send()
        .await
        .map_err(|e| AppError::transport(format!("Failed to send request: {}", e)))?;

    let response = ensure_success(response).await?;

    response
        .text()
        .await
        .map_err(|e| AppError::transport(format!("Failed to read response body: {}", e)))
}

/// Send a non-stream request, retrying transport errors, 429 and 5xx
///
/// `build` is called once per attempt since a request builder is consumed on send.
pub(crate) async fn send_with_retries<F>(
    provider: &str,
    max_retries: u32,
    mut build: F,
) -> AppResult<String>
where
    F: FnMut() -> RequestBuilder,
{
    let mut attempt: u32 = 0;

    loop {
        match send_for_text(build()).await {
            Ok(body) => return Ok(body),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    provider,
                    attempt,
                    max_retries,
                    error = %e,
                    "Retrying provider call"
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}
