use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::catalog::CatalogCache;
use crate::config::Config;
use crate::connect_api::dataflow::SaveDataflow;
use crate::connect_api::{build_http_client, ConnectClient, Credentials};
use crate::error::AppError;
use crate::llm::openai::OpenAiProvider;
use crate::llm::types::ToolDefinition;
use crate::llm::LlmProviderTrait;
use crate::models::{ChatRequest, ConfigureDataflowRequest};
use crate::services::chat::{self, Instructions, TurnContext};
use crate::tools::types::ToolContext;
use crate::tools::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmProviderTrait>,
    pub tool_registry: Arc<ToolRegistry>,
    pub catalog: CatalogCache,
    pub instructions: Arc<Instructions>,
    /// Connect+ 呼び出し用の共有クライアント
    pub http: reqwest::Client,
    pub connect_base_url: Url,
    pub model: String,
    pub temperature: f64,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let connect_base_url = Url::parse(&config.connect_base_url)
            .map_err(|e| AppError::Internal(format!("Invalid CONNECTPLUS_BASE_URL: {e}")))?;

        Ok(Self {
            llm: Arc::new(OpenAiProvider::from_config(config)?),
            tool_registry: Arc::new(ToolRegistry::connect_plus()),
            catalog: CatalogCache::in_memory(),
            instructions: Arc::new(Instructions::load(&config.instructions_paths)?),
            http: build_http_client()?,
            connect_base_url,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn connect_client(&self, credentials: Credentials) -> ConnectClient {
        ConnectClient::new(self.http.clone(), self.connect_base_url.clone(), credentials)
    }

    fn turn_context(&self, credentials: Credentials, cancel: CancellationToken) -> TurnContext {
        TurnContext {
            provider: self.llm.clone(),
            tool_registry: self.tool_registry.clone(),
            instructions: self.instructions.clone(),
            tools: ToolContext::new(self.connect_client(credentials), self.catalog.clone()),
            model: self.model.clone(),
            temperature: self.temperature,
            cancel,
        }
    }
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::InvalidInput(rejection.body_text()))
}

// --- Chat handlers ---

/// 1ターン分の会話。回答はプレーンテキストでストリームする
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let credentials = Credentials::from_headers(&headers)?;
    let history = chat::validate_history(json_body(body)?.messages)?;

    // 切断でハンドラーのfutureが破棄されるとトークンが発火する
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = state.turn_context(credentials, cancel);

    let text = chat::run_chat_turn(&ctx, history).await?;

    // ストリーム開始後はボディ側がガードを保持する
    let body = text.map(move |chunk| {
        let _guard = &guard;
        chunk.map(Bytes::from).map_err(|e| {
            tracing::error!(code = e.error_code(), "reply stream aborted: {e}");
            std::io::Error::other(e.to_string())
        })
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

// --- Dataflow handlers ---

pub async fn configure_dataflow_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ConfigureDataflowRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let credentials = Credentials::from_headers(&headers)?;
    let dataflow = SaveDataflow::from(json_body(body)?);

    let saved = state
        .connect_client(credentials)
        .save_dataflow(&dataflow)
        .await?;
    tracing::info!(dataflow = %dataflow.dataflow_uuid, blocks = dataflow.blocks.len(), "dataflow configured");
    Ok(Json(saved))
}

// --- Tool handlers ---

pub async fn list_tools_handler(State(state): State<AppState>) -> Json<Vec<ToolDefinition>> {
    Json(state.tool_registry.definitions())
}

// --- Catalog handlers ---

pub async fn invalidate_catalog_handler(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> StatusCode {
    state.catalog.invalidate(&org_id).await;
    tracing::info!(org = %org_id, "catalog entry invalidated");
    StatusCode::NO_CONTENT
}

/// 全組織のキャッシュを破棄する
pub async fn clear_catalog_handler(State(state): State<AppState>) -> StatusCode {
    state.catalog.clear().await;
    tracing::info!("catalog cleared");
    StatusCode::NO_CONTENT
}

pub async fn health_check() -> &'static str {
    "ok"
}
