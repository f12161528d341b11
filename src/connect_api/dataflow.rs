use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::DEFAULT_DATAFLOW_SCHEDULE;
use crate::error::AppError;

use super::ConnectClient;

/// Body of `PUT /dataflows`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDataflow {
    pub dataflow_uuid: String,
    pub description: String,
    pub schedule: String,
    pub blocks: Vec<DataflowBlock>,
}

/// One step of a dataflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataflowBlock {
    /// Canvas-local id (`block1`, `block2`, ...).
    pub id: String,
    /// Catalog id of the block type.
    pub block_id: String,
    pub block_name: String,
    pub block_type: String,
    pub destination_block_ids: Vec<String>,
    #[serde(default)]
    pub block_inputs: Value,
}

impl ConnectClient {
    /// Canvas → concurrent metadata fetch → linear graph → save.
    ///
    /// Any failing step fails the whole call; a half-built canvas is never reported
    /// as success.
    pub async fn create_simple_dataflow(&self, name: &str, block_ids: &[u64]) -> Result<Value, AppError> {
        if block_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "blockIds must contain at least one block".to_string(),
            ));
        }

        let unique_name = unique_canvas_name(name);
        tracing::info!(name = %unique_name, ?block_ids, "creating simple dataflow");

        let canvas = self.create_dataflow_canvas(&unique_name).await?;
        let dataflow_uuid = canvas
            .get("dataflowId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::UnexpectedResponse("canvas response has no dataflowId".to_string())
            })?
            .to_string();

        let metadata = self.fetch_all_metadata(block_ids).await?;
        let blocks = build_linear_blocks(block_ids, &metadata)?;
        let description = format!(
            "Pipeline: {}",
            blocks
                .iter()
                .map(|b| b.block_type.as_str())
                .collect::<Vec<_>>()
                .join(" → ")
        );
        tracing::debug!(dataflow = %dataflow_uuid, "{description}");

        let request = SaveDataflow {
            dataflow_uuid: dataflow_uuid.clone(),
            description: description.clone(),
            schedule: DEFAULT_DATAFLOW_SCHEDULE.to_string(),
            blocks,
        };
        let saved = self.save_dataflow(&request).await?;
        tracing::info!(dataflow = %dataflow_uuid, "dataflow saved");

        let block_summary: Vec<Value> = request
            .blocks
            .iter()
            .map(|b| {
                serde_json::json!({
                    "id": b.id,
                    "blockId": b.block_id,
                    "blockType": b.block_type,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "dataflowId": dataflow_uuid,
            "name": unique_name,
            "description": description,
            "blocks": block_summary,
            "saved": saved,
        }))
    }

    /// Metadata requests run concurrently. A `SessionExpired` anywhere wins, otherwise
    /// the first failure in id order is returned.
    async fn fetch_all_metadata(&self, block_ids: &[u64]) -> Result<Vec<Value>, AppError> {
        let results = join_all(block_ids.iter().map(|id| self.get_block_metadata(*id))).await;

        let mut metadata = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(value) => metadata.push(value),
                Err(AppError::SessionExpired) => return Err(AppError::SessionExpired),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(metadata),
        }
    }
}

/// Each step points at the next one; the last has no successor.
pub fn build_linear_blocks(block_ids: &[u64], metadata: &[Value]) -> Result<Vec<DataflowBlock>, AppError> {
    let count = block_ids.len();
    block_ids
        .iter()
        .zip(metadata)
        .enumerate()
        .map(|(index, (block_id, meta))| {
            let block_type = meta
                .get("type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    AppError::UnexpectedResponse(format!("metadata for block {block_id} has no type"))
                })?;
            let destination_block_ids = if index + 1 < count {
                vec![format!("block{}", index + 2)]
            } else {
                vec![]
            };
            Ok(DataflowBlock {
                id: format!("block{}", index + 1),
                block_id: block_id.to_string(),
                block_name: friendly_block_name(block_type),
                block_type: block_type.to_string(),
                destination_block_ids,
                block_inputs: meta
                    .get("blockInputs")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(vec![])),
            })
        })
        .collect()
}

/// 既知のブロック種別は固定名、それ以外は `sftp_read` → `SFTP-READ` 形式
pub fn friendly_block_name(block_type: &str) -> String {
    match block_type {
        "sftp_read" => "SFTP-Source".to_string(),
        "sftp_write" => "SFTP-Destination".to_string(),
        "s3_read" => "S3-Source".to_string(),
        "s3_write" => "S3-Destination".to_string(),
        "http_write" => "API-Writer".to_string(),
        "http_read" => "API-Reader".to_string(),
        "convert_csv_to_json" => "CSV-to-JSON".to_string(),
        "neo_block" => "Transform".to_string(),
        "kafka_read" => "Kafka-Source".to_string(),
        "kafka_write" => "Kafka-Destination".to_string(),
        other => other.replace('_', "-").to_uppercase(),
    }
}

/// Canvas names must be unique per organization, so a short random tag is appended.
fn unique_canvas_name(name: &str) -> String {
    let tag: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("{} {}", name.trim(), tag.to_uppercase())
}

#[cfg(test)]
mod tests {
    use httpmock::Method::{GET, POST, PUT};
    use httpmock::MockServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::connect_api::Credentials;

    fn test_client(server: &MockServer) -> ConnectClient {
        let credentials = Credentials::new(Some("SESSION=abc"), Some("100737")).unwrap();
        let base = Url::parse(&format!("{}/api/v3", server.base_url())).unwrap();
        ConnectClient::new(reqwest::Client::new(), base, credentials)
    }

    #[test]
    fn linear_blocks_link_each_step_to_the_next() {
        let metadata = vec![
            json!({ "type": "sftp_read", "blockInputs": [{ "name": "host" }] }),
            json!({ "type": "convert_csv_to_json" }),
            json!({ "type": "custom_sink" }),
        ];
        let blocks = build_linear_blocks(&[71, 5, 62], &metadata).unwrap();

        assert_eq!(
            blocks
                .iter()
                .map(|b| (b.id.as_str(), b.destination_block_ids.clone()))
                .collect::<Vec<_>>(),
            vec![
                ("block1", vec!["block2".to_string()]),
                ("block2", vec!["block3".to_string()]),
                ("block3", vec![]),
            ]
        );
        assert_eq!(blocks[0].block_id, "71");
        assert_eq!(blocks[0].block_name, "SFTP-Source");
        assert_eq!(blocks[0].block_inputs, json!([{ "name": "host" }]));
        assert_eq!(blocks[1].block_inputs, json!([]));
        assert_eq!(blocks[2].block_name, "CUSTOM-SINK");
    }

    #[test]
    fn metadata_without_type_is_rejected() {
        let err = build_linear_blocks(&[9], &[json!({})]).unwrap_err();
        assert!(matches!(err, AppError::UnexpectedResponse(_)));
    }

    #[test]
    fn canvas_names_get_a_six_character_tag() {
        let name = unique_canvas_name("Demo");
        let (base, tag) = name.split_once(' ').unwrap();
        assert_eq!(base, "Demo");
        assert_eq!(tag.len(), 6);
        assert_eq!(tag, tag.to_uppercase());
    }

    #[tokio::test]
    async fn creates_saves_and_reports_identifiers() {
        let server = MockServer::start();
        let canvas = server.mock(|when, then| {
            when.method(POST).path("/api/v3/dataflows/canvas");
            then.status(200).json_body(json!({ "dataflowId": "df-1" }));
        });
        let meta_71 = server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/71/metadata");
            then.status(200)
                .json_body(json!({ "type": "sftp_read", "blockInputs": [] }));
        });
        let meta_62 = server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/62/metadata");
            then.status(200)
                .json_body(json!({ "type": "http_write", "blockInputs": [] }));
        });
        let save = server.mock(|when, then| {
            when.method(PUT)
                .path("/api/v3/dataflows")
                .body_contains("\"dataflowUuid\":\"df-1\"")
                .body_contains("\"description\":\"Pipeline: sftp_read → http_write\"")
                .body_contains("\"destinationBlockIds\":[\"block2\"]");
            then.status(200).json_body(json!({ "dataflowUuid": "df-1", "version": 1 }));
        });

        let result = test_client(&server)
            .create_simple_dataflow("Demo", &[71, 62])
            .await
            .unwrap();

        canvas.assert();
        meta_71.assert();
        meta_62.assert();
        save.assert();
        assert_eq!(result["dataflowId"], "df-1");
        assert_eq!(result["blocks"][0]["blockId"], "71");
        assert_eq!(result["blocks"][1]["blockId"], "62");
        assert_eq!(result["saved"]["version"], 1);
    }

    #[tokio::test]
    async fn failed_metadata_fetch_skips_the_save() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v3/dataflows/canvas");
            then.status(200).json_body(json!({ "dataflowId": "df-1" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/71/metadata");
            then.status(200).json_body(json!({ "type": "sftp_read" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/62/metadata");
            then.status(500).body("boom");
        });
        let save = server.mock(|when, then| {
            when.method(PUT).path("/api/v3/dataflows");
            then.status(200).json_body(json!({}));
        });

        let err = test_client(&server)
            .create_simple_dataflow("Demo", &[71, 62])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: Some(500), .. }));
        save.assert_hits(0);
    }

    #[tokio::test]
    async fn failed_save_fails_the_whole_call() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v3/dataflows/canvas");
            then.status(200).json_body(json!({ "dataflowId": "df-1" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/71/metadata");
            then.status(200).json_body(json!({ "type": "sftp_read" }));
        });
        server.mock(|when, then| {
            when.method(PUT).path("/api/v3/dataflows");
            then.status(400).body("invalid schedule");
        });

        let err = test_client(&server)
            .create_simple_dataflow("Demo", &[71])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Upstream { status: Some(400), .. }));
    }

    #[tokio::test]
    async fn session_expiry_during_metadata_wins_over_other_failures() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/v3/dataflows/canvas");
            then.status(200).json_body(json!({ "dataflowId": "df-1" }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/1/metadata");
            then.status(500).body("boom");
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/blocks/2/metadata");
            then.status(401);
        });

        let err = test_client(&server)
            .create_simple_dataflow("Demo", &[1, 2])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn empty_block_list_makes_no_calls() {
        let server = MockServer::start();
        let canvas = server.mock(|when, then| {
            when.method(POST).path("/api/v3/dataflows/canvas");
            then.status(200).json_body(json!({ "dataflowId": "df-1" }));
        });

        let err = test_client(&server)
            .create_simple_dataflow("Demo", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        canvas.assert_hits(0);
    }
}
