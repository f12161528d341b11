use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use httpmock::MockServer;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::catalog::CatalogCache;
use crate::connect_api::{ConnectClient, Credentials};
use crate::error::AppError;
use crate::handlers::AppState;
use crate::llm::types::{LlmRequest, LlmResponse, TokenUsage, ToolCallRequest};
use crate::llm::{LlmProviderTrait, TextStream};
use crate::services::chat::{Instructions, TurnContext};
use crate::tools::types::ToolContext;
use crate::tools::ToolRegistry;

pub const ORG_ID: &str = "org-9";
pub const SESSION: &str = "SESSION=abc123";
pub const INSTRUCTIONS: &str = "You are Connect+ Copilot.";

/// In-process model: replays scripted primary responses and records every request.
pub struct ScriptedProvider {
    primary: Mutex<VecDeque<LlmResponse>>,
    answer: Vec<String>,
    stream_error: Option<String>,
    completions: Mutex<Vec<LlmRequest>>,
    streams: Mutex<Vec<LlmRequest>>,
}

impl ScriptedProvider {
    /// Primary completion requests no tools; the final stream yields `chunks`.
    pub fn answering(chunks: &[&str]) -> Self {
        Self::scripted(vec![], chunks)
    }

    /// Primary completion requests `tool_calls`; the final stream yields `chunks`.
    pub fn calling(tool_calls: Vec<ToolCallRequest>, chunks: &[&str]) -> Self {
        Self::scripted(vec![primary_response(tool_calls)], chunks)
    }

    fn scripted(primary: Vec<LlmResponse>, chunks: &[&str]) -> Self {
        Self {
            primary: Mutex::new(primary.into()),
            answer: chunks.iter().map(|c| c.to_string()).collect(),
            stream_error: None,
            completions: Mutex::new(vec![]),
            streams: Mutex::new(vec![]),
        }
    }

    /// The final stream yields the scripted chunks and then fails with `message`.
    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    pub fn completions(&self) -> Vec<LlmRequest> {
        self.completions.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<LlmRequest> {
        self.streams.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProviderTrait for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, AppError> {
        self.completions.lock().unwrap().push(request.clone());
        Ok(self
            .primary
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| primary_response(vec![])))
    }

    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, AppError> {
        self.streams.lock().unwrap().push(request.clone());
        let mut chunks: Vec<Result<String, AppError>> = self.answer.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.stream_error {
            chunks.push(Err(AppError::LlmError(message.clone())));
        }
        Ok(stream::iter(chunks).boxed())
    }
}

fn primary_response(tool_calls: Vec<ToolCallRequest>) -> LlmResponse {
    LlmResponse {
        content: None,
        model: "gpt-4o".to_string(),
        token_usage: TokenUsage::default(),
        finish_reason: Some(if tool_calls.is_empty() { "stop" } else { "tool_calls" }.to_string()),
        tool_calls,
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

pub fn connect_base(server: &MockServer) -> Url {
    Url::parse(&format!("{}/api/v3", server.base_url())).unwrap()
}

pub fn app_state(provider: Arc<ScriptedProvider>, server: &MockServer, catalog: CatalogCache) -> AppState {
    AppState {
        llm: provider,
        tool_registry: Arc::new(ToolRegistry::connect_plus()),
        catalog,
        instructions: Arc::new(Instructions::new(INSTRUCTIONS)),
        http: reqwest::Client::new(),
        connect_base_url: connect_base(server),
        model: "gpt-4o".to_string(),
        temperature: 0.7,
    }
}

pub fn turn_context(provider: Arc<ScriptedProvider>, server: &MockServer, catalog: CatalogCache) -> TurnContext {
    let credentials = Credentials::new(Some(SESSION), Some(ORG_ID)).unwrap();
    TurnContext {
        provider,
        tool_registry: Arc::new(ToolRegistry::connect_plus()),
        instructions: Arc::new(Instructions::new(INSTRUCTIONS)),
        tools: ToolContext::new(
            ConnectClient::new(reqwest::Client::new(), connect_base(server), credentials),
            catalog,
        ),
        model: "gpt-4o".to_string(),
        temperature: 0.7,
        cancel: CancellationToken::new(),
    }
}

pub async fn collect_text(text: TextStream) -> Result<String, AppError> {
    let chunks: Vec<Result<String, AppError>> = text.collect().await;
    chunks.into_iter().collect()
}
