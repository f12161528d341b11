pub mod openai;
pub mod types;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::AppError;
use types::{LlmRequest, LlmResponse};

/// Text deltas of a streamed completion, in arrival order.
pub type TextStream = BoxStream<'static, Result<String, AppError>>;

#[async_trait]
pub trait LlmProviderTrait: Send + Sync {
    fn name(&self) -> &str;

    /// Non-streaming completion. Tool-call intent is only visible here.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, AppError>;

    /// Streaming completion. Resolves once the upstream accepted the request; errors
    /// after that point arrive as stream items.
    async fn stream(&self, request: &LlmRequest) -> Result<TextStream, AppError>;
}
