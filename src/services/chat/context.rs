use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::llm::LlmProviderTrait;
use crate::tools::types::ToolContext;
use crate::tools::ToolRegistry;

use super::prompt::Instructions;

/// 1ターンの実行全体で共有する状態をまとめた構造体。
pub struct TurnContext {
    pub provider: Arc<dyn LlmProviderTrait>,
    pub tool_registry: Arc<ToolRegistry>,
    pub instructions: Arc<Instructions>,
    pub tools: ToolContext,
    pub model: String,
    pub temperature: f64,
    /// 呼び出し元が切断すると発火する
    pub cancel: CancellationToken,
}

impl TurnContext {
    /// Run `fut` unless the turn is cancelled first.
    pub(super) async fn until_cancelled<T, F>(&self, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            result = fut => result,
        }
    }
}
