//! Tendermint JSON-RPC implementation of the node capability contract.
use std::time::Duration;

use chrono::{DateTime, Utc};
use error_stack::{Result, ResultExt};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::core::BlockMeta;

use super::{BlockResult, NodeProvider, NodeStatus, ProviderError, RangeMetadata};

/// Tendermint RPC access over HTTP.
///
/// Block results are fetched with a JSON-RPC batch request: all heights of a
/// follower batch go out as one POST and come back as one response array.
pub struct TendermintProvider {
    client: reqwest::Client,
    url: Url,
}

#[derive(Debug, Clone)]
pub struct TendermintProviderOptions {
    /// Timeout applied to every request on the endpoint.
    pub request_timeout: Duration,
}

impl Default for TendermintProviderOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
        }
    }
}

impl TendermintProvider {
    pub fn new(url: Url, options: TendermintProviderOptions) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .change_context(ProviderError)
            .attach_printable("failed to build HTTP client")?;
        Ok(Self { client, url })
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value, ProviderError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 0,
            method,
            params,
        };
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .change_context(ProviderError)
            .attach_printable_lazy(|| format!("{method} request failed"))?;
        let response: RpcResponse = response
            .error_for_status()
            .change_context(ProviderError)
            .attach_printable_lazy(|| format!("{method} request rejected"))?
            .json()
            .await
            .change_context(ProviderError)
            .attach_printable_lazy(|| format!("failed to decode {method} response"))?;
        response.into_result(method)
    }
}

#[async_trait::async_trait]
impl NodeProvider for TendermintProvider {
    type Results = Value;

    async fn status(&self) -> Result<NodeStatus, ProviderError> {
        let result = self.call("status", json!({})).await?;
        let status: StatusResult = serde_json::from_value(result)
            .change_context(ProviderError)
            .attach_printable("failed to decode status result")?;
        Ok(NodeStatus {
            earliest_height: status.sync_info.earliest_block_height,
            latest_height: status.sync_info.latest_block_height,
            observed_at: Utc::now(),
        })
    }

    async fn block_range_metadata(
        &self,
        low: u64,
        high: u64,
    ) -> Result<RangeMetadata, ProviderError> {
        let params = json!({
            "minHeight": low.to_string(),
            "maxHeight": high.to_string(),
        });
        let result = self
            .call("blockchain", params)
            .await
            .attach_printable_lazy(|| format!("blockchain query for {low}-{high}"))?;
        let info: BlockchainResult = serde_json::from_value(result)
            .change_context(ProviderError)
            .attach_printable_lazy(|| format!("failed to decode blockchain result {low}-{high}"))?;
        let metas = info
            .block_metas
            .into_iter()
            .map(|meta| BlockMeta {
                height: meta.header.height,
                time: meta.header.time,
            })
            .collect();
        Ok(RangeMetadata {
            metas,
            latest_height: info.last_height,
        })
    }

    async fn batched_block_results(
        &self,
        heights: &[u64],
    ) -> Result<Vec<BlockResult<Value>>, ProviderError> {
        if heights.is_empty() {
            return Ok(Vec::new());
        }

        // Single-request batches are sent as a plain call: several Tendermint
        // versions reject a JSON-RPC batch array of length one.
        if let [height] = heights {
            let result = self
                .call("block_results", json!({ "height": height.to_string() }))
                .await?;
            return Ok(vec![block_result_from_value(result)?]);
        }

        let requests: Vec<RpcRequest> = heights
            .iter()
            .enumerate()
            .map(|(id, height)| RpcRequest {
                jsonrpc: "2.0",
                id: id as u32,
                method: "block_results",
                params: json!({ "height": height.to_string() }),
            })
            .collect();

        let (low, high) = (heights[0], heights[heights.len() - 1]);
        let response = self
            .client
            .post(self.url.clone())
            .json(&requests)
            .send()
            .await
            .change_context(ProviderError)
            .attach_printable_lazy(|| format!("block_results batch for {low}-{high} failed"))?;
        let mut responses: Vec<RpcResponse> = response
            .error_for_status()
            .change_context(ProviderError)
            .attach_printable_lazy(|| format!("block_results batch for {low}-{high} rejected"))?
            .json()
            .await
            .change_context(ProviderError)
            .attach_printable_lazy(|| {
                format!("failed to decode block_results batch for {low}-{high}")
            })?;

        // The server may answer a batch in any order. Ids restore request
        // order; the follower still validates heights positionally.
        responses.sort_by_key(|response| response.id);

        let mut results = Vec::with_capacity(responses.len());
        for response in responses {
            let result = response.into_result("block_results")?;
            results.push(block_result_from_value(result)?);
        }
        Ok(results)
    }
}

#[derive(Debug, serde::Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u32,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default, deserialize_with = "id_from_value")]
    id: u32,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

impl RpcResponse {
    fn into_result(self, method: &str) -> Result<Value, ProviderError> {
        if let Some(err) = self.error {
            return Err(ProviderError).attach_printable(format!(
                "{method} RPC error {}: {} {}",
                err.code,
                err.message,
                err.data.unwrap_or_default()
            ));
        }
        self.result
            .ok_or(ProviderError)
            .attach_printable_lazy(|| format!("{method} response has no result"))
    }
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    #[serde(deserialize_with = "u64_from_string")]
    earliest_block_height: u64,
    #[serde(deserialize_with = "u64_from_string")]
    latest_block_height: u64,
}

#[derive(Debug, Deserialize)]
struct BlockchainResult {
    #[serde(deserialize_with = "u64_from_string")]
    last_height: u64,
    #[serde(default)]
    block_metas: Vec<BlockMetaItem>,
}

#[derive(Debug, Deserialize)]
struct BlockMetaItem {
    header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    #[serde(deserialize_with = "u64_from_string")]
    height: u64,
    time: DateTime<Utc>,
}

/// Extract the reported height from a block_results payload.
fn block_result_from_value(result: Value) -> Result<BlockResult<Value>, ProviderError> {
    let height = result
        .get("height")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .ok_or(ProviderError)
        .attach_printable("block_results response is missing its height")?;
    Ok(BlockResult {
        height,
        data: result,
    })
}

// Tendermint encodes heights as decimal strings.
fn u64_from_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

// Batch response ids come back as JSON numbers or strings depending on the
// server version.
fn id_from_value<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n as u32)
            .ok_or_else(|| serde::de::Error::custom("invalid response id")),
        Value::String(raw) => raw.parse().map_err(serde::de::Error::custom),
        _ => Err(serde::de::Error::custom("invalid response id")),
    }
}
