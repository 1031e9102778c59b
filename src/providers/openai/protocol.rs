//! Chat-completion protocol engine
//!
//! Request construction, buffered response parsing and SSE decoding for the
//! OpenAI-compatible `chat/completions` endpoint. Nothing here performs I/O
//! except [`sse_line_stream`], which only adapts a response body into lines.

use std::fmt::Display;

use futures::{Stream, StreamExt};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::SplitStream;
use tokio_util::io::StreamReader;
use tracing::{debug, error, trace, warn};

use crate::{
    errors::{AppError, AppResult},
    providers::{
        openai::model::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, UsageBody},
        types::{ChatMessage, ChatRequest, ContentPart, LLMResponse, MessageContent, ModelSettings, TokenUsage},
    },
};

/// Prefix of every SSE line that carries a payload
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Payload signalling the end of a stream
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Build the ordered message list for a request
///
/// System prompt (if any), then the prior turns verbatim, then the user
/// prompt, then an assistant tool-call / tool-result pair per replayed result.
pub fn build_messages(request: &ChatRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(
        request.contexts.len() + 2 + request.tool_call_results.len() * 2,
    );

    if let Some(system_prompt) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        messages.push(ChatMessage::system(system_prompt));
    }

    messages.extend(request.contexts.iter().cloned());

    let mut user = ChatMessage::user(request.prompt.clone());
    if !request.extra_content_parts.is_empty() {
        let mut parts = Vec::with_capacity(request.extra_content_parts.len() + 1);
        parts.push(ContentPart::text(request.prompt.clone()));
        parts.extend(request.extra_content_parts.iter().cloned());
        user.content = Some(MessageContent::Parts(parts));
    }
    messages.push(user);

    for result in &request.tool_call_results {
        messages.extend(result.to_messages());
    }

    messages
}

/// Build the wire body, letting request values override the model settings
pub fn build_request_body(
    request: &ChatRequest,
    settings: &ModelSettings,
    stream: bool,
) -> AppResult<ChatCompletionRequest> {
    let model = request
        .model
        .as_deref()
        .or(settings.model.as_deref())
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::validation("No model specified in request or model settings"))?;

    Ok(ChatCompletionRequest {
        model: model.to_string(),
        messages: build_messages(request),
        tools: request.tools.clone(),
        temperature: request.temperature.or(settings.temperature),
        max_tokens: request.max_tokens.or(settings.max_tokens),
        top_p: request.top_p.or(settings.top_p),
        stream: stream.then_some(true),
    })
}

fn to_token_usage(usage: UsageBody) -> TokenUsage {
    TokenUsage {
        input_other: usage.prompt_tokens,
        input_cached: 0,
        output: usage.completion_tokens,
    }
}

/// Parse a complete (non-stream) `chat/completions` body
pub fn parse_chat_response(body: &str) -> AppResult<LLMResponse> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| AppError::ResponseParseError(format!("Invalid chat completion body: {}", e)))?;

    let mut response = LLMResponse {
        id: parsed.id,
        finished: true,
        ..LLMResponse::default()
    };

    if let Some(message) = parsed.choices.into_iter().next().and_then(|c| c.message) {
        if let Some(role) = message.role {
            response.role = role;
        }
        response.content = message.content.unwrap_or_default();
        response.reasoning_content = message.reasoning_content;

        for call in message.tool_calls.unwrap_or_default() {
            let Some(function) = call.function else {
                continue;
            };
            response.push_tool_call(
                call.id.unwrap_or_default(),
                function.name.unwrap_or_default(),
                function.arguments.unwrap_or_else(|| "{}".to_string()),
            );
        }
    }

    response.usage = parsed.usage.map(to_token_usage);

    Ok(response)
}

/// Lifecycle of one streamed call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Sent,
    Receiving,
    Done,
    Failed,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Done | StreamState::Failed)
    }
}

/// Line-at-a-time SSE decoder
///
/// Guarantees that at most one `finished == true` response leaves the decoder
/// and that nothing leaves it once it reached `Done` or `Failed`.
#[derive(Debug)]
pub struct SseDecoder {
    state: StreamState,
    chunks: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            chunks: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Record that the HTTP request went out
    pub fn mark_sent(&mut self) {
        if self.state == StreamState::Idle {
            self.state = StreamState::Sent;
        }
    }

    /// Decode one raw line; `None` when the line produces no response
    pub fn feed_line(&mut self, line: &str) -> Option<LLMResponse> {
        if self.is_terminal() {
            return None;
        }
        self.state = StreamState::Receiving;

        let payload = line.trim().strip_prefix(SSE_DATA_PREFIX)?;
        self.chunks += 1;
        trace!(chunk = self.chunks, payload, "SSE data line");

        if payload == SSE_DONE_SENTINEL {
            debug!(chunks = self.chunks, "Stream reached done sentinel");
            self.state = StreamState::Done;
            return Some(LLMResponse::finished_marker());
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                let err = AppError::StreamChunkParseError {
                    line: payload.to_string(),
                    message: e.to_string(),
                };
                warn!(chunk = self.chunks, error = %err, "Skipping malformed stream chunk");
                return None;
            }
        };

        let mut response = LLMResponse {
            id: chunk.id,
            is_chunk: true,
            ..LLMResponse::default()
        };

        if let Some(choice) = chunk.choices.into_iter().next() {
            if let Some(delta) = choice.delta {
                if let Some(role) = delta.role {
                    response.role = role;
                }
                if let Some(content) = delta.content {
                    response.content = content.clone();
                    response.delta = content;
                }
                response.reasoning_content = delta.reasoning_content;
            }

            if choice.finish_reason.as_deref() == Some("stop") {
                debug!(chunks = self.chunks, "Stream finished with stop reason");
                response.finished = true;
                self.state = StreamState::Done;
            }
        }

        response.usage = chunk.usage.map(to_token_usage);

        Some(response)
    }

    /// Transport failure; yields the synthetic terminal response if still owed
    pub fn fail(&mut self) -> Option<LLMResponse> {
        if self.is_terminal() {
            return None;
        }
        self.state = StreamState::Failed;
        Some(LLMResponse::finished_marker())
    }

    /// Clean end of input; yields the terminal response if still owed
    pub fn finish(&mut self) -> Option<LLMResponse> {
        if self.is_terminal() {
            return None;
        }
        debug!(chunks = self.chunks, "Stream ended without terminal chunk");
        self.state = StreamState::Done;
        Some(LLMResponse::finished_marker())
    }
}

/// Parse a whole SSE body into its ordered responses
///
/// The result always ends with exactly one `finished == true` response.
pub fn parse_sse_body(body: &str) -> Vec<LLMResponse> {
    let mut decoder = SseDecoder::new();
    decoder.mark_sent();

    let mut responses = Vec::new();
    for line in body.lines() {
        if let Some(response) = decoder.feed_line(line) {
            responses.push(response);
        }
        if decoder.is_terminal() {
            break;
        }
    }

    responses.extend(decoder.finish());
    responses
}

/// Decode a stream of SSE lines into responses
///
/// Lines are pulled one at a time, so at most one unprocessed line is held.
/// A line-level error ends the stream with a synthetic terminal response
/// followed by `StreamTransportError`.
pub fn sse_response_stream<S, E>(lines: S) -> impl Stream<Item = AppResult<LLMResponse>> + Send + 'static
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::new();
        decoder.mark_sent();

        let mut lines = Box::pin(lines);
        let mut failure = None;

        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if let Some(response) = decoder.feed_line(&line) {
                        yield Ok(response);
                    }
                    if decoder.is_terminal() {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(AppError::stream_transport(e.to_string()));
                    break;
                }
            }
        }

        match failure {
            Some(err) => {
                error!(error = %err, "Stream transport failed");
                if let Some(response) = decoder.fail() {
                    yield Ok(response);
                }
                yield Err(err);
            }
            None => {
                if let Some(response) = decoder.finish() {
                    yield Ok(response);
                }
            }
        }
    }
}

/// Split a streaming HTTP body into text lines
///
/// Lines are split on raw `\n` bytes and decoded lossily, so invalid UTF-8
/// degrades a single chunk instead of failing the transport. Trailing `\r`
/// is left for the decoder to trim.
pub fn sse_line_stream(
    response: reqwest::Response,
) -> impl Stream<Item = std::io::Result<String>> + Send + 'static {
    let bytes = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
    SplitStream::new(StreamReader::new(bytes).split(b'\n'))
        .map(|line| line.map(|raw| String::from_utf8_lossy(&raw).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed_line(": keep-alive").is_none());
        assert!(decoder.feed_line("event: message").is_none());
        assert!(decoder.feed_line("").is_none());
        assert_eq!(decoder.state(), StreamState::Receiving);
    }

    #[test]
    fn test_decoder_is_silent_after_done() {
        let mut decoder = SseDecoder::new();
        let done = decoder.feed_line("data: [DONE]").unwrap();
        assert!(done.finished);
        assert!(decoder.feed_line("data: [DONE]").is_none());
        assert!(decoder.fail().is_none());
        assert!(decoder.finish().is_none());
        assert_eq!(decoder.state(), StreamState::Done);
    }

    #[test]
    fn test_decoder_fail_emits_single_marker() {
        let mut decoder = SseDecoder::new();
        decoder.mark_sent();
        assert_eq!(decoder.state(), StreamState::Sent);
        let marker = decoder.fail().unwrap();
        assert!(marker.finished);
        assert!(decoder.fail().is_none());
        assert_eq!(decoder.state(), StreamState::Failed);
    }

    #[test]
    fn test_decoder_tolerates_crlf() {
        let mut decoder = SseDecoder::new();
        let response = decoder
            .feed_line("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\r")
            .unwrap();
        assert_eq!(response.delta, "Hi");
        assert!(!response.finished);
    }
}
