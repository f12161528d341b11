use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;

use super::types::{LlmMessage, LlmRequest, LlmResponse, TokenUsage, ToolCallRequest};
use super::{LlmProviderTrait, TextStream};

/// OpenAI-compatible chat completions provider.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, AppError> {
        // No overall timeout on the client: streamed answers can run for minutes.
        // Non-streaming calls set their own per-request timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::LlmError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        if config.openai_api_key.trim().is_empty() {
            return Err(AppError::LlmError("OpenAI API key is empty".to_string()));
        }
        Self::new(config.openai_api_key.clone(), config.openai_base_url.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, body: &OpenAiRequest) -> Result<reqwest::Response, AppError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(body);
        if !body.stream {
            request = request.timeout(std::time::Duration::from_secs(120));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LlmError(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<OpenAiError>(&body) {
                return Err(AppError::LlmError(format!(
                    "OpenAI API error ({}): {}",
                    status, err.error.message
                )));
            }
            return Err(AppError::LlmError(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }
        Ok(response)
    }
}

// OpenAI API request/response types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    /// JSON-encoded arguments, as text.
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    model: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

fn message_to_openai(message: &LlmMessage) -> OpenAiMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(message.tool_calls.iter().map(tool_call_to_openai).collect())
    };
    OpenAiMessage {
        role: message.role.clone(),
        content: message.content.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn tool_call_to_openai(call: &ToolCallRequest) -> OpenAiToolCall {
    // Raw (unparseable) argument text goes back exactly as the model wrote it
    let arguments = match &call.arguments {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    };
    OpenAiToolCall {
        id: call.id.clone(),
        call_type: function_type(),
        function: OpenAiFunctionCall {
            name: call.name.clone(),
            arguments,
        },
    }
}

fn tool_call_from_openai(call: OpenAiToolCall) -> ToolCallRequest {
    let raw = call.function.arguments;
    let arguments = if raw.trim().is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    };
    ToolCallRequest {
        id: call.id,
        name: call.function.name,
        arguments,
    }
}

fn build_request(request: &LlmRequest, stream: bool) -> OpenAiRequest {
    let tools: Option<Vec<OpenAiTool>> = request.tools.as_ref().map(|tool_defs| {
        tool_defs
            .iter()
            .map(|t| OpenAiTool {
                tool_type: function_type(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    });
    let tool_choice = tools.as_ref().map(|_| "auto".to_string());

    OpenAiRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(message_to_openai).collect(),
        temperature: request.temperature,
        tools,
        tool_choice,
        stream,
    }
}

#[async_trait]
impl LlmProviderTrait for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, AppError> {
        let response = self.send(&build_request(request, false)).await?;

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmError(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LlmError("Response contained no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(tool_call_from_openai)
            .collect();

        let token_usage = api_response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content: choice.message.content,
            model: api_response.model,
            token_usage,
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, AppError> {
        let response = self.send(&build_request(request, true)).await?;
        let parser = SseTextParser::new(response.bytes_stream().boxed());
        Ok(stream::unfold(parser, |mut parser| async move {
            parser.next_delta().await.map(|item| (item, parser))
        })
        .boxed())
    }
}

/// Turns an SSE byte stream of chat-completion chunks into content deltas.
struct SseTextParser {
    inner: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, AppError>>,
    done: bool,
}

impl SseTextParser {
    fn new(inner: BoxStream<'static, reqwest::Result<bytes::Bytes>>) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    async fn next_delta(&mut self) -> Option<Result<String, AppError>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            match self.inner.next().await {
                Some(Ok(bytes)) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_lines();
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(AppError::LlmError(format!("Stream interrupted: {e}"))));
                }
                None => {
                    let rest = std::mem::take(&mut self.buffer);
                    self.handle_line(&String::from_utf8_lossy(&rest));
                    self.done = true;
                }
            }
        }
    }

    /// Lines are split on raw bytes so multi-byte characters cut across chunks survive.
    fn drain_lines(&mut self) {
        while !self.done {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.handle_line(&String::from_utf8_lossy(&line));
        }
    }

    fn handle_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') || trimmed.starts_with("event:") {
            return;
        }
        let payload = trimmed
            .strip_prefix("data:")
            .map(str::trim)
            .unwrap_or(trimmed);
        if payload == "[DONE]" {
            self.done = true;
            return;
        }

        if let Ok(err) = serde_json::from_str::<OpenAiError>(payload) {
            self.pending.push_back(Err(AppError::LlmError(format!(
                "OpenAI stream error: {}",
                err.error.message
            ))));
            self.done = true;
            return;
        }

        let chunk: OpenAiStreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!("skipping unparseable stream line: {e}");
                return;
            }
        };
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.pending.push_back(Ok(content));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::llm::types::ToolDefinition;

    fn request(tools: Option<Vec<ToolDefinition>>) -> LlmRequest {
        LlmRequest {
            model: "gpt-4o".to_string(),
            messages: vec![LlmMessage::system("be brief"), LlmMessage::user("hi")],
            temperature: 0.7,
            tools,
        }
    }

    #[test]
    fn tool_call_arguments_are_parsed_or_kept_raw() {
        let parsed = tool_call_from_openai(OpenAiToolCall {
            id: "call_1".into(),
            call_type: function_type(),
            function: OpenAiFunctionCall {
                name: "getBlockMetadata".into(),
                arguments: "{\"blockId\":71}".into(),
            },
        });
        assert_eq!(parsed.arguments, json!({ "blockId": 71 }));

        let raw = tool_call_from_openai(OpenAiToolCall {
            id: "call_2".into(),
            call_type: function_type(),
            function: OpenAiFunctionCall {
                name: "getBlockMetadata".into(),
                arguments: "{blockId: 71".into(),
            },
        });
        assert_eq!(raw.arguments, json!("{blockId: 71"));
        assert_eq!(tool_call_to_openai(&raw).function.arguments, "{blockId: 71");

        let empty = tool_call_from_openai(OpenAiToolCall {
            id: "call_3".into(),
            call_type: function_type(),
            function: OpenAiFunctionCall {
                name: "getAllBlocks".into(),
                arguments: String::new(),
            },
        });
        assert_eq!(empty.arguments, json!({}));
    }

    #[test]
    fn tool_choice_is_auto_only_when_tools_are_sent() {
        let with_tools = build_request(
            &request(Some(vec![ToolDefinition {
                name: "getAllBlocks".into(),
                description: "list".into(),
                parameters: json!({ "type": "object", "properties": {}, "required": [] }),
            }])),
            false,
        );
        assert_eq!(with_tools.tool_choice.as_deref(), Some("auto"));

        let without = build_request(&request(None), true);
        assert!(without.tool_choice.is_none());
        assert!(without.tools.is_none());
        assert!(without.stream);
    }

    #[tokio::test]
    async fn complete_returns_tool_calls_in_order() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer sk-test")
                .body_contains("\"tool_choice\":\"auto\"")
                .body_contains("\"stream\":false");
            then.status(200).json_body(json!({
                "model": "gpt-4o",
                "choices": [{
                    "finish_reason": "tool_calls",
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [
                            { "id": "call_a", "type": "function",
                              "function": { "name": "getAllBlocks", "arguments": "{}" } },
                            { "id": "call_b", "type": "function",
                              "function": { "name": "getBlockMetadata", "arguments": "{\"blockId\":7}" } }
                        ]
                    }
                }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
            }));
        });

        let provider = OpenAiProvider::new("sk-test", format!("{}/v1", server.base_url())).unwrap();
        let tools = vec![ToolDefinition {
            name: "getAllBlocks".into(),
            description: "list".into(),
            parameters: json!({ "type": "object", "properties": {}, "required": [] }),
        }];
        let response = provider.complete(&request(Some(tools))).await.unwrap();

        mock.assert();
        assert_eq!(
            response
                .tool_calls
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>(),
            vec!["call_a", "call_b"]
        );
        assert_eq!(response.tool_calls[1].arguments, json!({ "blockId": 7 }));
        assert_eq!(response.token_usage.input_tokens, 12);
        assert!(response.content.is_none());
    }

    #[tokio::test]
    async fn complete_surfaces_api_error_message() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429)
                .json_body(json!({ "error": { "message": "Rate limit reached" } }));
        });

        let provider = OpenAiProvider::new("sk-test", format!("{}/v1", server.base_url())).unwrap();
        let err = provider.complete(&request(None)).await.unwrap_err();

        match err {
            AppError::LlmError(message) => assert!(message.contains("Rate limit reached")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_yields_content_deltas_until_done() {
        let server = MockServer::start();
        let body = concat!(
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\", wörld\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .body_contains("\"stream\":true");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });

        let provider = OpenAiProvider::new("sk-test", format!("{}/v1", server.base_url())).unwrap();
        let deltas: Vec<String> = provider
            .stream(&request(None))
            .await
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["Hello".to_string(), ", wörld".to_string()]);
    }

    #[tokio::test]
    async fn split_multibyte_characters_are_reassembled() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"→\"}}]}\n";
        let bytes = line.as_bytes();
        let cut = line.find('→').unwrap() + 1;
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&bytes[..cut])),
            Ok(bytes::Bytes::copy_from_slice(&bytes[cut..])),
        ];

        let mut parser = SseTextParser::new(stream::iter(chunks).boxed());
        assert_eq!(parser.next_delta().await.unwrap().unwrap(), "→");
        assert!(parser.next_delta().await.is_none());
    }
}
