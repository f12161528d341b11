use async_trait::async_trait;
use serde::Deserialize;

use crate::constants::*;
use crate::error::AppError;
use crate::llm::types::ToolDefinition;

use super::types::{parse_args, ToolContext};
use super::Tool;

#[derive(Debug, Deserialize)]
struct CanvasArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataflowIdArgs {
    dataflow_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimpleDataflowArgs {
    name: String,
    block_ids: Vec<u64>,
}

fn non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("'{field}' must not be empty")));
    }
    Ok(())
}

fn parse_dataflow_id(input: &serde_json::Value) -> Result<String, AppError> {
    let args: DataflowIdArgs = parse_args(input)?;
    non_empty("dataflowId", &args.dataflow_id)?;
    Ok(args.dataflow_id)
}

fn dataflow_id_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "dataflowId": {
                "type": "string",
                "description": "The UUID of the dataflow to retrieve"
            }
        },
        "required": ["dataflowId"]
    })
}

pub struct CreateDataflowCanvasTool;

#[async_trait]
impl Tool for CreateDataflowCanvasTool {
    fn name(&self) -> &str {
        TOOL_CREATE_DATAFLOW_CANVAS
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_CREATE_DATAFLOW_CANVAS.to_string(),
            description: "Create a new empty dataflow canvas with a given name. This is the first step in creating a new dataflow.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name for the new dataflow"
                    }
                },
                "required": ["name"]
            }),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError> {
        let args: CanvasArgs = parse_args(input)?;
        non_empty("name", &args.name)
    }

    async fn execute(&self, input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError> {
        let args: CanvasArgs = parse_args(input)?;
        ctx.client.create_dataflow_canvas(&args.name).await
    }
}

pub struct GetDataflowTool;

#[async_trait]
impl Tool for GetDataflowTool {
    fn name(&self) -> &str {
        TOOL_GET_DATAFLOW
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_GET_DATAFLOW.to_string(),
            description: "Get basic details of an existing dataflow by its ID.".to_string(),
            parameters: dataflow_id_schema(),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError> {
        parse_dataflow_id(input).map(|_| ())
    }

    async fn execute(&self, input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError> {
        let dataflow_id = parse_dataflow_id(input)?;
        ctx.client.get_dataflow(&dataflow_id).await
    }
}

pub struct GetDataflowWithValuesTool;

#[async_trait]
impl Tool for GetDataflowWithValuesTool {
    fn name(&self) -> &str {
        TOOL_GET_DATAFLOW_WITH_VALUES
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_GET_DATAFLOW_WITH_VALUES.to_string(),
            description: "Get full details of an existing dataflow including all configuration values.".to_string(),
            parameters: dataflow_id_schema(),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError> {
        parse_dataflow_id(input).map(|_| ())
    }

    async fn execute(&self, input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError> {
        let dataflow_id = parse_dataflow_id(input)?;
        ctx.client.get_dataflow_with_values(&dataflow_id).await
    }
}

/// 複合ツール: キャンバス作成 → メタデータ取得 → ブロック連結 → 保存
pub struct CreateSimpleDataflowTool;

#[async_trait]
impl Tool for CreateSimpleDataflowTool {
    fn name(&self) -> &str {
        TOOL_CREATE_SIMPLE_DATAFLOW
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_CREATE_SIMPLE_DATAFLOW.to_string(),
            description: "Create and save a complete linear dataflow from a name and an ordered list of block IDs. The blocks are connected in the given order (first block feeds the second, and so on). Use this when the user has chosen the blocks for a new dataflow.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "The name for the new dataflow"
                    },
                    "blockIds": {
                        "type": "array",
                        "items": { "type": "number" },
                        "description": "Block IDs in pipeline order, source first and destination last"
                    }
                },
                "required": ["name", "blockIds"]
            }),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError> {
        let args: SimpleDataflowArgs = parse_args(input)?;
        non_empty("name", &args.name)?;
        if args.block_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "'blockIds' must contain at least one block".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError> {
        let args: SimpleDataflowArgs = parse_args(input)?;
        ctx.client
            .create_simple_dataflow(&args.name, &args.block_ids)
            .await
    }
}
