use async_trait::async_trait;
use serde::Deserialize;

use crate::constants::*;
use crate::error::AppError;
use crate::llm::types::ToolDefinition;

use super::types::{parse_args, ToolContext};
use super::Tool;

pub struct GetAllBlocksTool;

#[async_trait]
impl Tool for GetAllBlocksTool {
    fn name(&self) -> &str {
        TOOL_GET_ALL_BLOCKS
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_GET_ALL_BLOCKS.to_string(),
            description: "Get a list of all available blocks in Connect+. Use this to see what data source/destination types and transformation blocks are available.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError> {
        parse_args::<serde_json::Map<String, serde_json::Value>>(input).map(|_| ())
    }

    /// 取得した一覧でキャッシュを更新する
    ///
    /// A catalog already fetched during this turn is reused instead of calling the API
    /// again.
    async fn execute(&self, _input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError> {
        let blocks = match ctx.fetched_catalog() {
            Some(blocks) => {
                tracing::debug!(org = %ctx.organization_id(), "reusing catalog fetched this turn");
                blocks.clone()
            }
            None => {
                let blocks = ctx.client.get_all_blocks().await?;
                ctx.record_fetched_catalog(blocks.clone());
                blocks
            }
        };
        ctx.catalog.put(ctx.organization_id(), blocks.clone()).await;
        Ok(blocks)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockMetadataArgs {
    block_id: u64,
}

pub struct GetBlockMetadataTool;

#[async_trait]
impl Tool for GetBlockMetadataTool {
    fn name(&self) -> &str {
        TOOL_GET_BLOCK_METADATA
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: TOOL_GET_BLOCK_METADATA.to_string(),
            description: "Get detailed metadata for a specific block by its ID. This includes configuration options, parameters, and capabilities.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "blockId": {
                        "type": "number",
                        "description": "The ID of the block to get metadata for"
                    }
                },
                "required": ["blockId"]
            }),
        }
    }

    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError> {
        parse_args::<BlockMetadataArgs>(input).map(|_| ())
    }

    async fn execute(&self, input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError> {
        let args: BlockMetadataArgs = parse_args(input)?;
        ctx.client.get_block_metadata(args.block_id).await
    }
}
