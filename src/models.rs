use serde::{Deserialize, Serialize};

use crate::connect_api::dataflow::{DataflowBlock, SaveDataflow};
use crate::constants::DEFAULT_DATAFLOW_SCHEDULE;

// --- Chat Models ---

/// One caller-supplied turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

// --- Dataflow Models ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureDataflowRequest {
    pub dataflow_uuid: String,
    #[serde(default)]
    pub description: String,
    /// 省略時はデフォルトスケジュール
    pub schedule: Option<String>,
    pub blocks: Vec<DataflowBlock>,
}

impl From<ConfigureDataflowRequest> for SaveDataflow {
    fn from(request: ConfigureDataflowRequest) -> Self {
        Self {
            dataflow_uuid: request.dataflow_uuid,
            description: request.description,
            schedule: request
                .schedule
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATAFLOW_SCHEDULE.to_string()),
            blocks: request.blocks,
        }
    }
}
