//! Tool dispatch: one `ToolCallRequest` in, exactly one `ToolResult` out.
//!
//! Only `SessionExpired` escapes as an error. Every other failure becomes an error
//! envelope the model can read and react to.

use serde_json::json;

use crate::error::AppError;
use crate::llm::types::{ToolCallRequest, ToolResult};

use super::types::ToolContext;
use super::ToolRegistry;

pub const UNKNOWN_FUNCTION: &str = "Unknown function";

pub async fn dispatch_tool_call(
    registry: &ToolRegistry,
    call: &ToolCallRequest,
    ctx: &ToolContext,
) -> Result<ToolResult, AppError> {
    let content = match registry.get(&call.name) {
        None => {
            tracing::warn!(tool = %call.name, id = %call.id, "model requested unknown tool");
            json!({ "error": UNKNOWN_FUNCTION })
        }
        Some(tool) => {
            let outcome = match tool.validate(&call.arguments) {
                Ok(()) => tool.execute(&call.arguments, ctx).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(value) => {
                    tracing::info!(tool = %call.name, id = %call.id, "tool call succeeded");
                    value
                }
                Err(e) if e.is_auth_failure() => {
                    tracing::warn!(tool = %call.name, id = %call.id, "session expired during tool call");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(tool = %call.name, id = %call.id, "tool call failed: {e}");
                    error_envelope(&e, call)
                }
            }
        }
    };

    Ok(ToolResult {
        tool_call_id: call.id.clone(),
        content: content.to_string(),
    })
}

fn error_envelope(error: &AppError, call: &ToolCallRequest) -> serde_json::Value {
    json!({
        "error": error.to_string(),
        "functionName": call.name,
        "arguments": call.arguments,
    })
}
