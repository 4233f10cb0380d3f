//! JSON-RPC implementation of the wallet-provider capability, speaking the
//! EIP-1193-shaped method set over HTTP. An HTTP endpoint has no push
//! channel, so account and chain changes are observed by a background poll
//! that diffs `eth_accounts`/`eth_chainId` and emits signals.

use std::time::Duration;

use alloy_primitives::{
    Address,
    B256,
    Bytes,
};
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use tokio::{
    sync::mpsc,
    time,
};
use tracing::{
    debug,
    info,
};

use crate::{
    error::GameError,
    provider::{
        LogEntry,
        LogFilter,
        ProviderSignal,
        TxReceipt,
        TxRequest,
        WalletProvider,
    },
};

// EIP-1193: the user rejected the request.
const USER_REJECTED_CODE: i64 = 4001;

#[derive(Clone)]
pub struct HttpProvider {
    http: reqwest::Client,
    url: String,
}

impl HttpProvider {
    /// Connects to the provider endpoint and hands back the signal channel
    /// the session loop listens on. Fails with `WalletUnavailable` when no
    /// provider answers at the URL.
    pub async fn connect(
        url: impl Into<String>,
        signal_poll: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ProviderSignal>), GameError> {
        let url = url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GameError::GatewayUnreachable(e.to_string()))?;
        let provider = Self { http, url };

        let chain_id = provider
            .chain_id()
            .await
            .map_err(|_| GameError::WalletUnavailable)?;
        info!(url = %provider.url, chain_id, "wallet provider reachable");

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        tokio::spawn(poll_signals(provider.clone(), signal_poll, signal_tx));
        Ok((provider, signal_rx))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, GameError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GameError::GatewayUnreachable(format!("{method} request failed: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| GameError::GatewayUnreachable(format!("{method} returned invalid JSON: {e}")))?;
        if let Some(error) = body.get("error") {
            return Err(classify_rpc_error(error));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| GameError::GatewayUnreachable(format!("{method} response missing result")))
    }
}

impl WalletProvider for HttpProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, GameError> {
        let result = match self.request("eth_requestAccounts", json!([])).await {
            Ok(result) => result,
            Err(GameError::UserRejected) => return Err(GameError::UserRejected),
            Err(err) => {
                // Plain nodes expose unlocked accounts under eth_accounts.
                debug!(%err, "eth_requestAccounts unavailable; falling back to eth_accounts");
                self.request("eth_accounts", json!([]))
                    .await
                    .map_err(|_| GameError::WalletUnavailable)?
            }
        };
        parse_accounts(&result)
    }

    async fn chain_id(&self) -> Result<u64, GameError> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_qty(&result)
    }

    async fn block_number(&self) -> Result<u64, GameError> {
        let result = self.request("eth_blockNumber", json!([])).await?;
        parse_qty(&result)
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, GameError> {
        let result = self.request("eth_sendTransaction", json!([tx_to_json(&tx)])).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| GameError::GatewayUnreachable("transaction hash must be a string".into()))?;
        parse_b256(raw)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, GameError> {
        let params = json!([{ "to": to.to_string(), "data": data.to_string() }, "latest"]);
        let result = self.request("eth_call", params).await?;
        let raw = result
            .as_str()
            .ok_or_else(|| GameError::GatewayUnreachable("call result must be a string".into()))?;
        parse_bytes(raw)
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> Result<u64, GameError> {
        let result = self.request("eth_estimateGas", json!([tx_to_json(tx)])).await?;
        parse_qty(&result)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, GameError> {
        let result = self
            .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let dto: ReceiptDto = serde_json::from_value(result)
            .map_err(|e| GameError::GatewayUnreachable(format!("invalid receipt payload: {e}")))?;
        dto.into_receipt().map(Some)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, GameError> {
        let mut topics = vec![Value::String(filter.topic0.to_string())];
        if let Some(topic1) = filter.topic1 {
            topics.push(Value::String(topic1.to_string()));
        }
        let params = json!([{
            "address": filter.address.to_string(),
            "topics": topics,
            "fromBlock": hex_qty(filter.from_block),
            "toBlock": "latest",
        }]);
        let result = self.request("eth_getLogs", params).await?;
        let dtos: Vec<LogDto> = serde_json::from_value(result)
            .map_err(|e| GameError::GatewayUnreachable(format!("invalid log payload: {e}")))?;
        dtos.into_iter().map(LogDto::into_entry).collect()
    }
}

async fn poll_signals(
    provider: HttpProvider,
    interval: Duration,
    signals: mpsc::UnboundedSender<ProviderSignal>,
) {
    let mut ticker = time::interval(interval);
    let mut last_accounts: Option<Vec<Address>> = None;
    let mut last_chain: Option<u64> = None;
    loop {
        ticker.tick().await;
        if signals.is_closed() {
            return;
        }
        match provider.request("eth_accounts", json!([])).await {
            Ok(result) => match parse_accounts(&result) {
                Ok(accounts) => {
                    if last_accounts.as_ref().is_some_and(|prev| *prev != accounts) {
                        let _ = signals.send(ProviderSignal::AccountsChanged(accounts.clone()));
                    }
                    last_accounts = Some(accounts);
                }
                Err(err) => debug!(%err, "account poll returned malformed accounts"),
            },
            Err(err) => debug!(%err, "account poll failed"),
        }
        match provider.chain_id().await {
            Ok(chain_id) => {
                if last_chain.is_some_and(|prev| prev != chain_id) {
                    let _ = signals.send(ProviderSignal::ChainChanged(chain_id));
                }
                last_chain = Some(chain_id);
            }
            Err(err) => debug!(%err, "chain poll failed"),
        }
    }
}

fn classify_rpc_error(error: &Value) -> GameError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("provider error")
        .to_string();
    if code == USER_REJECTED_CODE {
        GameError::UserRejected
    } else if message.to_ascii_lowercase().contains("revert") {
        GameError::Reverted(message)
    } else {
        GameError::GatewayUnreachable(message)
    }
}

fn tx_to_json(tx: &TxRequest) -> Value {
    let mut object = json!({
        "from": tx.from.to_string(),
        "to": tx.to.to_string(),
        "value": format!("{:#x}", tx.value),
        "data": tx.data.to_string(),
    });
    if let Some(gas) = tx.gas_limit {
        object["gas"] = Value::String(hex_qty(gas));
    }
    object
}

fn parse_accounts(result: &Value) -> Result<Vec<Address>, GameError> {
    let raw = result
        .as_array()
        .ok_or_else(|| GameError::GatewayUnreachable("accounts must be an array".into()))?;
    raw.iter()
        .map(|item| {
            item.as_str()
                .ok_or_else(|| GameError::GatewayUnreachable("account must be a string".into()))
                .and_then(parse_address)
        })
        .collect()
}

fn parse_address(raw: &str) -> Result<Address, GameError> {
    raw.parse()
        .map_err(|_| GameError::GatewayUnreachable(format!("invalid address: {raw}")))
}

fn parse_b256(raw: &str) -> Result<B256, GameError> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .map_err(|_| GameError::GatewayUnreachable(format!("invalid hex word: {raw}")))?;
    if bytes.len() != 32 {
        return Err(GameError::GatewayUnreachable(format!(
            "expected a 32-byte word, got {} bytes",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

fn parse_bytes(raw: &str) -> Result<Bytes, GameError> {
    hex::decode(raw.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|_| GameError::GatewayUnreachable(format!("invalid hex data: {raw}")))
}

fn parse_qty(result: &Value) -> Result<u64, GameError> {
    let raw = result
        .as_str()
        .ok_or_else(|| GameError::GatewayUnreachable("quantity must be a string".into()))?;
    parse_hex_u64(raw)
}

fn parse_hex_u64(raw: &str) -> Result<u64, GameError> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|_| GameError::GatewayUnreachable(format!("invalid hex quantity: {raw}")))
}

fn hex_qty(value: u64) -> String {
    format!("{value:#x}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
}

impl ReceiptDto {
    fn into_receipt(self) -> Result<TxReceipt, GameError> {
        let tx_hash = parse_b256(&self.transaction_hash)?;
        let block_number = match self.block_number.as_deref() {
            Some(raw) => parse_hex_u64(raw)?,
            None => 0,
        };
        let success = match self.status.as_deref() {
            Some(raw) => parse_hex_u64(raw)? == 1,
            // pre-Byzantium receipts carry no status field
            None => true,
        };
        Ok(TxReceipt {
            tx_hash,
            block_number,
            success,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogDto {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
}

impl LogDto {
    fn into_entry(self) -> Result<LogEntry, GameError> {
        let address = parse_address(&self.address)?;
        let topics = self
            .topics
            .iter()
            .map(|topic| parse_b256(topic))
            .collect::<Result<Vec<_>, _>>()?;
        let data = parse_bytes(&self.data)?;
        let block_number = match self.block_number.as_deref() {
            Some(raw) => parse_hex_u64(raw)?,
            None => 0,
        };
        Ok(LogEntry {
            address,
            topics,
            data,
            block_number,
        })
    }
}
