use serde_json::json;

use ai_provider_engine::{
    errors::AppError,
    providers::{
        ChatMessage, ChatRequest, ContentPart, MessageContent, ModelSettings, ToolCallResult, ToolSpec,
        openai::protocol::{build_messages, build_request_body, parse_chat_response, parse_sse_body},
    },
};

fn delta_line(content: &str) -> String {
    format!(
        "data: {}",
        json!({"id": "chunk", "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]})
    )
}

fn finished_count(responses: &[ai_provider_engine::providers::LLMResponse]) -> usize {
    responses.iter().filter(|r| r.finished).count()
}

#[test]
fn test_messages_without_system_prompt() {
    let request = ChatRequest::new("how are you").with_contexts(vec![ChatMessage::user("hi")]);

    let messages = build_messages(&request);
    let flat: Vec<(&str, Option<&str>)> = messages.iter().map(|m| (m.role.as_str(), m.text())).collect();
    assert_eq!(flat, vec![("user", Some("hi")), ("user", Some("how are you"))]);
}

#[test]
fn test_system_prompt_comes_first() {
    let request = ChatRequest::new("question")
        .with_system_prompt("be brief")
        .with_contexts(vec![ChatMessage::user("earlier"), ChatMessage::assistant("reply")]);

    let roles: Vec<String> = build_messages(&request).into_iter().map(|m| m.role).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
}

#[test]
fn test_empty_system_prompt_is_omitted() {
    let request = ChatRequest::new("question").with_system_prompt("");
    let messages = build_messages(&request);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, "user");
}

#[test]
fn test_tool_call_results_follow_user_prompt() {
    let request = ChatRequest::new("what is the answer")
        .with_tool_call_results(vec![ToolCallResult::new("c1", "lookup", json!({}), "42")]);

    let messages = build_messages(&request);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].text(), Some("what is the answer"));

    let call = &messages[1];
    assert_eq!(call.role, "assistant");
    let tool_calls = call.tool_calls.as_ref().unwrap();
    assert_eq!(tool_calls.len(), 1);
    assert_eq!(tool_calls[0].id, "c1");
    assert_eq!(tool_calls[0].function.name, "lookup");
    assert_eq!(tool_calls[0].function.arguments, "{}");

    let result = &messages[2];
    assert_eq!(result.role, "tool");
    assert_eq!(result.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(result.text(), Some("42"));
}

#[test]
fn test_tool_call_wire_format() {
    let [call, result] = ToolCallResult::new("c7", "weather", json!({"city": "Paris"}), "sunny").to_messages();

    assert_eq!(
        serde_json::to_value(&call).unwrap(),
        json!({
            "role": "assistant",
            "tool_calls": [{
                "id": "c7",
                "type": "function",
                "function": {"name": "weather", "arguments": "{\"city\":\"Paris\"}"}
            }]
        })
    );
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({"role": "tool", "content": "sunny", "tool_call_id": "c7"})
    );
}

#[test]
fn test_tools_attached_only_when_present() {
    let settings = ModelSettings::with_model("gpt-4o");

    let without = build_request_body(&ChatRequest::new("hi"), &settings, false).unwrap();
    let body = serde_json::to_value(&without).unwrap();
    assert!(body.get("tools").is_none());
    assert!(body.get("stream").is_none());

    let tool = ToolSpec::function("lookup", "Look something up", json!({"type": "object", "properties": {}}));
    let with = build_request_body(&ChatRequest::new("hi").with_tools(vec![tool]), &settings, true).unwrap();
    let body = serde_json::to_value(&with).unwrap();
    assert_eq!(body["tools"][0]["type"], json!("function"));
    assert_eq!(body["tools"][0]["function"]["name"], json!("lookup"));
    assert_eq!(body["stream"], json!(true));
}

#[test]
fn test_request_values_override_settings() {
    let settings = ModelSettings {
        model: Some("settings-model".to_string()),
        temperature: Some(0.5),
        max_tokens: Some(100),
        top_p: None,
    };
    let mut request = ChatRequest::new("hi").with_model("request-model");
    request.temperature = Some(0.0);

    let body = build_request_body(&request, &settings, false).unwrap();
    assert_eq!(body.model, "request-model");
    assert_eq!(body.temperature, Some(0.0));
    assert_eq!(body.max_tokens, Some(100));
    assert_eq!(body.top_p, None);
}

#[test]
fn test_missing_model_is_rejected() {
    let result = build_request_body(&ChatRequest::new("hi"), &ModelSettings::default(), false);
    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[test]
fn test_extra_content_parts_make_user_content_an_array() {
    let mut request = ChatRequest::new("describe this");
    request.extra_content_parts = vec![ContentPart::image_url("https://example.com/cat.png")];

    let messages = build_messages(&request);
    match &messages[0].content {
        Some(MessageContent::Parts(parts)) => {
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0], ContentPart::text("describe this"));
        }
        other => panic!("expected content parts, got {:?}", other),
    }

    assert_eq!(
        serde_json::to_value(&messages[0]).unwrap()["content"],
        json!([
            {"type": "text", "text": "describe this"},
            {"type": "image_url", "image_url": {"url": "https://example.com/cat.png"}}
        ])
    );
}

#[test]
fn test_parse_chat_response_with_tool_calls_and_usage() {
    let body = json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_a", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}},
                    {"id": "call_b", "type": "function", "function": {"name": "fetch", "arguments": "{}"}}
                ]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
    })
    .to_string();

    let response = parse_chat_response(&body).unwrap();
    assert_eq!(response.id.as_deref(), Some("chatcmpl-1"));
    assert_eq!(response.content, "");
    assert!(response.finished);
    assert_eq!(response.tool_call_ids, vec!["call_a", "call_b"]);
    assert_eq!(response.tool_call_names, vec!["lookup", "fetch"]);
    assert_eq!(response.tool_call_args, vec!["{\"q\":\"x\"}", "{}"]);

    let usage = response.usage.unwrap();
    assert_eq!(usage.input_other, 12);
    assert_eq!(usage.output, 7);
    assert_eq!(usage.total(), 19);
}

#[test]
fn test_parse_chat_response_reads_reasoning_content() {
    let body = json!({
        "choices": [{"message": {"role": "assistant", "content": "4", "reasoning_content": "2+2"}}]
    })
    .to_string();

    let response = parse_chat_response(&body).unwrap();
    assert_eq!(response.content, "4");
    assert_eq!(response.reasoning_content.as_deref(), Some("2+2"));
    assert!(response.usage.is_none());
}

#[test]
fn test_parse_chat_response_rejects_garbage() {
    assert!(matches!(
        parse_chat_response("<html>bad gateway</html>"),
        Err(AppError::ResponseParseError(_))
    ));
}

#[test]
fn test_sse_chunks_then_done() {
    let chunks = ["Hel", "lo", ", ", "world"];
    let mut body: Vec<String> = chunks.iter().map(|c| delta_line(c)).collect();
    body.push("data: [DONE]".to_string());

    let responses = parse_sse_body(&body.join("\n\n"));

    assert_eq!(responses.len(), chunks.len() + 1);
    for (response, expected) in responses.iter().zip(chunks) {
        assert!(!response.finished);
        assert!(response.is_chunk);
        assert_eq!(response.delta, expected);
        assert_eq!(response.content, expected);
    }
    assert!(responses.last().unwrap().finished);
    assert_eq!(finished_count(&responses), 1);
}

#[test]
fn test_sse_malformed_line_is_skipped() {
    let body = [
        delta_line("a"),
        "data: {not json".to_string(),
        delta_line("b"),
        "data: [DONE]".to_string(),
    ]
    .join("\n");

    let responses = parse_sse_body(&body);
    let deltas: Vec<&str> = responses.iter().filter(|r| !r.finished).map(|r| r.delta.as_str()).collect();
    assert_eq!(deltas, vec!["a", "b"]);
    assert_eq!(finished_count(&responses), 1);
}

#[test]
fn test_sse_stop_then_done_yields_one_finished() {
    let stop = format!(
        "data: {}",
        json!({"choices": [{"delta": {"content": "!"}, "finish_reason": "stop"}]})
    );
    let body = [delta_line("hi"), stop, "data: [DONE]".to_string()].join("\n");

    let responses = parse_sse_body(&body);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1].delta, "!");
    assert!(responses[1].finished);
    assert_eq!(finished_count(&responses), 1);
}

#[test]
fn test_sse_body_without_terminal_chunk() {
    let body = [delta_line("partial"), ": comment".to_string(), "event: ping".to_string()].join("\n");

    let responses = parse_sse_body(&body);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].delta, "partial");
    assert!(responses[1].finished);
}

#[test]
fn test_sse_empty_body_still_finishes() {
    let responses = parse_sse_body("");
    assert_eq!(responses.len(), 1);
    assert!(responses[0].finished);
}

#[test]
fn test_sse_chunk_usage_and_role() {
    let first = format!(
        "data: {}",
        json!({"choices": [{"delta": {"role": "assistant", "content": ""}}]})
    );
    let last = format!(
        "data: {}",
        json!({"choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 9}})
    );
    let body = [first, last, "data: [DONE]".to_string()].join("\n");

    let responses = parse_sse_body(&body);
    assert_eq!(responses[0].role, "assistant");
    let usage = responses[1].usage.unwrap();
    assert_eq!(usage.input_other, 3);
    assert_eq!(usage.output, 9);
    assert!(responses[2].finished);
}
