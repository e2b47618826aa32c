// src/sources/solana_rpc.rs
//! Onchain snapshot over Solana JSON-RPC.
//!
//! Public RPC exposes current totals, not history, so each metric is one
//! snapshot spread flat over the window days (same as the GitHub provider).

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{http_client, CollectionWindow, MockFeed, SignalProvider};
use crate::signal::{Signal, SourceType};

pub const ENV_SOLANA_RPC_URL: &str = "SOLANA_RPC_URL";
/// Owner of every upgradeable program account.
pub const UPGRADEABLE_LOADER: &str = "BPFLoaderUpgradeab1e11111111111111111111111";
/// Size of an upgradeable loader `Program` account.
const PROGRAM_ACCOUNT_SIZE: u64 = 36;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Decode a JSON-RPC reply body, turning an `error` member into `Err`.
pub fn parse_rpc_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let resp: RpcResponse<T> = serde_json::from_str(body).context("rpc response json")?;
    match (resp.result, resp.error) {
        (_, Some(e)) => Err(anyhow!("rpc error {}: {}", e.code, e.message)),
        (Some(v), None) => Ok(v),
        (None, None) => Err(anyhow!("rpc response without result")),
    }
}

/// Current onchain totals. A metric whose call failed is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OnchainSnapshot {
    pub transaction_count: Option<u64>,
    pub program_accounts: Option<u64>,
}

pub struct SolanaRpcProvider {
    url: String,
    client: reqwest::Client,
}

impl SolanaRpcProvider {
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url,
            client: http_client(timeout)?,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = self
            .client
            .post(&self.url)
            .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
            .send()
            .await
            .with_context(|| format!("rpc {method}"))?
            .error_for_status()
            .with_context(|| format!("rpc status {method}"))?
            .text()
            .await
            .with_context(|| format!("rpc body {method}"))?;
        parse_rpc_response(&body).with_context(|| format!("rpc {method}"))
    }

    async fn snapshot(&self) -> OnchainSnapshot {
        let tx = self.call::<u64>("getTransactionCount", json!([])).await;
        let programs = self
            .call::<Vec<Value>>(
                "getProgramAccounts",
                json!([
                    UPGRADEABLE_LOADER,
                    {
                        "encoding": "base64",
                        "dataSlice": { "offset": 0, "length": 0 },
                        "filters": [{ "dataSize": PROGRAM_ACCOUNT_SIZE }]
                    }
                ]),
            )
            .await
            .map(|accounts| accounts.len() as u64);

        OnchainSnapshot {
            transaction_count: self.ok_or_warn(tx, "transaction_volume"),
            program_accounts: self.ok_or_warn(programs, "program_deployments"),
        }
    }

    fn ok_or_warn(&self, r: Result<u64>, metric: &str) -> Option<u64> {
        match r {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(target: "sources", error = ?e, metric, provider = "solana_rpc", "rpc call failed");
                counter!("source_errors_total", "source" => "solana_rpc").increment(1);
                None
            }
        }
    }
}

#[async_trait]
impl SignalProvider for SolanaRpcProvider {
    async fn collect(&self, window: &CollectionWindow) -> Result<Vec<Signal>> {
        let t0 = std::time::Instant::now();
        let snap = self.snapshot().await;
        if snap == OnchainSnapshot::default() {
            anyhow::bail!("solana_rpc: every call failed");
        }
        histogram!("source_fetch_ms", "source" => "solana_rpc")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(snapshot_signals(&snap, window))
    }

    fn name(&self) -> &'static str {
        "solana_rpc"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Onchain
    }

    fn fallback(&self) -> Option<MockFeed> {
        Some(MockFeed::Onchain)
    }
}

/// One signal per available metric and window day; the category is the
/// metric name.
pub fn snapshot_signals(snap: &OnchainSnapshot, window: &CollectionWindow) -> Vec<Signal> {
    let metrics = [
        ("transaction_volume", snap.transaction_count),
        ("program_deployments", snap.program_accounts),
    ];
    let mut out = Vec::new();
    for (metric, value) in metrics {
        let Some(value) = value else { continue };
        out.extend((0..window.days).map(|i| {
            Signal::new(SourceType::Onchain, metric, value as f64, window.day(i))
                .with_meta("category", metric)
                .with_meta("source", "solana_rpc")
        }));
    }
    out
}
