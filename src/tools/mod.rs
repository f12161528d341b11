pub mod blocks;
pub mod dataflows;
pub mod dispatch;
pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::AppError;
use crate::llm::types::ToolDefinition;
use types::ToolContext;

/// 全ツールが実装するトレイト
///
/// A tool's schema and its handler live on the same type, so what the model is
/// offered and what can be dispatched never diverge.
#[async_trait]
pub trait Tool: Send + Sync {
    /// ツール名（LLM APIに渡す識別子）
    fn name(&self) -> &str;

    /// LLM APIに渡すToolDefinition（JSONスキーマ含む）
    fn definition(&self) -> ToolDefinition;

    /// 引数が宣言した形に合うか検証する
    fn validate(&self, input: &serde_json::Value) -> Result<(), AppError>;

    /// ツールを実行し結果を返す
    async fn execute(&self, input: &serde_json::Value, ctx: &ToolContext) -> Result<serde_json::Value, AppError>;
}

/// ツールレジストリ
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    /// 登録順（プロンプト内の並びを安定させる）
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry with every Connect+ operation the model may call.
    pub fn connect_plus() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(blocks::GetAllBlocksTool));
        registry.register(Box::new(blocks::GetBlockMetadataTool));
        registry.register(Box::new(dataflows::CreateDataflowCanvasTool));
        registry.register(Box::new(dataflows::GetDataflowTool));
        registry.register(Box::new(dataflows::GetDataflowWithValuesTool));
        registry.register(Box::new(dataflows::CreateSimpleDataflowTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// 名前でツールを取得
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// 全ToolDefinitionを登録順で返す
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition())
            .collect()
    }

    /// 全ツール名を登録順で返す
    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::connect_plus()
    }
}
