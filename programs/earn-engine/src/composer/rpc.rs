use std::str::FromStr;
use std::time::Duration;

use anchor_lang::prelude::*;
use anchor_lang::solana_program::address_lookup_table::state::AddressLookupTable;
use anchor_lang::solana_program::address_lookup_table::AddressLookupTableAccount;
use anchor_lang::solana_program::hash::Hash;
use async_trait::async_trait;
use base64::Engine as _;

use crate::errors::EarnError;

/// The slice of chain state the composer reads.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Raw account data, or `None` when the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;
}

/// Solana JSON-RPC over HTTP.
pub struct JsonRpcClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    /// Make a Solana JSON-RPC call
    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                log::warn!("[rpc] {} failed: {}", method, e);
                if e.is_timeout() {
                    error!(EarnError::UpstreamTimeout)
                } else {
                    error!(EarnError::UpstreamUnavailable)
                }
            })?;

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            log::warn!("[rpc] {} returned an unreadable body: {}", method, e);
            error!(EarnError::MalformedUpstreamResponse)
        })?;

        if let Some(error) = json.get("error") {
            log::warn!("[rpc] {} error: {}", method, error);
            return err!(EarnError::UpstreamUnavailable);
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
    }
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let result = self
            .rpc_call(
                "getAccountInfo",
                serde_json::json!([address.to_string(), { "encoding": "base64" }]),
            )
            .await?;

        let value = result.get("value").ok_or(EarnError::MalformedUpstreamResponse)?;
        if value.is_null() {
            return Ok(None);
        }
        let encoded = value
            .pointer("/data/0")
            .and_then(|v| v.as_str())
            .ok_or(EarnError::MalformedUpstreamResponse)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Some)
            .map_err(|_| error!(EarnError::MalformedUpstreamResponse))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        let result = self
            .rpc_call("getLatestBlockhash", serde_json::json!([{ "commitment": "confirmed" }]))
            .await?;
        result
            .pointer("/value/blockhash")
            .and_then(|v| v.as_str())
            .and_then(|s| Hash::from_str(s).ok())
            .ok_or_else(|| error!(EarnError::MalformedUpstreamResponse))
    }
}

pub fn parse_lookup_table(key: Pubkey, data: &[u8]) -> Result<AddressLookupTableAccount> {
    let table = AddressLookupTable::deserialize(data).map_err(|e| {
        log::warn!("[rpc] Lookup table {} is not decodable: {}", key, e);
        error!(EarnError::LookupTableUnavailable)
    })?;
    Ok(AddressLookupTableAccount {
        key,
        addresses: table.addresses.to_vec(),
    })
}

/// Fetch and decode every table in `keys`, concurrently. Any missing or
/// undecodable table fails the whole set.
pub async fn resolve_lookup_tables(
    rpc: &dyn ChainRpc,
    keys: &[Pubkey],
) -> Result<Vec<AddressLookupTableAccount>> {
    let fetches = keys.iter().map(|key| async move {
        let data = rpc.get_account_data(key).await.map_err(|e| {
            log::warn!("[rpc] Lookup table {} fetch failed: {}", key, e);
            error!(EarnError::LookupTableUnavailable)
        })?;
        let data = data.ok_or_else(|| {
            log::warn!("[rpc] Lookup table {} does not exist", key);
            error!(EarnError::LookupTableUnavailable)
        })?;
        parse_lookup_table(*key, &data)
    });
    futures::future::try_join_all(fetches).await
}
