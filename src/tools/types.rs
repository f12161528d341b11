use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::catalog::CatalogCache;
use crate::connect_api::ConnectClient;
use crate::error::AppError;

/// ツール実行時のコンテキスト（リクエスト単位）
#[derive(Clone)]
pub struct ToolContext {
    /// 呼び出し元の認証情報で構築されたクライアント
    pub client: ConnectClient,
    /// ブロック一覧キャッシュ（プロセス共有）
    pub catalog: CatalogCache,
    /// このターンで取得したブロック一覧（同一ターン内の再取得を避ける）
    fetched_catalog: Arc<OnceCell<Value>>,
}

impl ToolContext {
    pub fn new(client: ConnectClient, catalog: CatalogCache) -> Self {
        Self {
            client,
            catalog,
            fetched_catalog: Arc::new(OnceCell::new()),
        }
    }

    pub fn organization_id(&self) -> &str {
        self.client.organization_id()
    }

    /// Remembers a catalog fetched from the API during this turn. The first one wins.
    pub fn record_fetched_catalog(&self, catalog: Value) {
        let _ = self.fetched_catalog.set(catalog);
    }

    pub fn fetched_catalog(&self) -> Option<&Value> {
        self.fetched_catalog.get()
    }
}

/// Decode tool arguments into their typed shape. Anything that does not fit is rejected.
pub fn parse_args<T: DeserializeOwned>(input: &serde_json::Value) -> Result<T, AppError> {
    if !input.is_object() {
        return Err(AppError::InvalidInput(
            "tool arguments must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(input.clone())
        .map_err(|e| AppError::InvalidInput(format!("invalid tool arguments: {e}")))
}
