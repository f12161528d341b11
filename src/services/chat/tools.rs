use crate::error::AppError;
use crate::llm::types::{ToolCallRequest, ToolResult};
use crate::tools::dispatch::dispatch_tool_call;

use super::context::TurnContext;

/// LLMレスポンスからのツール呼び出しを順番に処理する
///
/// Results come back in request order, one per call. A `SessionExpired` stops the
/// loop and the results gathered so far are dropped.
pub(super) async fn process_tool_calls(
    tool_calls: &[ToolCallRequest],
    ctx: &TurnContext,
) -> Result<Vec<ToolResult>, AppError> {
    let mut results = Vec::with_capacity(tool_calls.len());

    for call in tool_calls {
        tracing::debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        let result = ctx
            .until_cancelled(dispatch_tool_call(&ctx.tool_registry, call, &ctx.tools))
            .await?;
        results.push(result);
    }

    Ok(results)
}
