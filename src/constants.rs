// メッセージロール
pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

// 認証ヘッダー（クライアント → このサーバー）
pub const HEADER_SESSION_TOKEN: &str = "x-connectplus-cookie";
pub const HEADER_ORG_ID: &str = "x-connectplus-org-id";

// 認証ヘッダー（このサーバー → Connect+）
pub const CONNECT_HEADER_ORG_ID: &str = "X-CAP-API-AUTH-ORG-ID";

// Connect+ デフォルト値
pub const DEFAULT_CONNECT_BASE_URL: &str = "https://eucrm.connectplus.capillarytech.com/api/v3";
pub const DEFAULT_DATAFLOW_SCHEDULE: &str = "0/1 0 * * * ? *";

// LLMデフォルト値
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

// ツール名
pub const TOOL_GET_ALL_BLOCKS: &str = "getAllBlocks";
pub const TOOL_GET_BLOCK_METADATA: &str = "getBlockMetadata";
pub const TOOL_CREATE_DATAFLOW_CANVAS: &str = "createDataflowCanvas";
pub const TOOL_GET_DATAFLOW: &str = "getDataflow";
pub const TOOL_GET_DATAFLOW_WITH_VALUES: &str = "getDataflowWithValues";
pub const TOOL_CREATE_SIMPLE_DATAFLOW: &str = "createSimpleDataflow";
