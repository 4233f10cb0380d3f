//! The wallet-provider capability the rest of the client is written
//! against. One interface, negotiated at construction time; callers never
//! learn which concrete provider is underneath.

use std::future::Future;

use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
};

use crate::error::GameError;

/// A transaction to be signed and submitted by the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    pub fn new(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: data.into(),
            gas_limit: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
    pub topic1: Option<B256>,
    pub from_block: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
}

/// Session-level change announced by the provider. The session must
/// re-derive its gateway handle after either signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderSignal {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
}

pub trait WalletProvider: Send + Sync + 'static {
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, GameError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, GameError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, GameError>> + Send;

    /// Submits one transaction. Resolves once the wallet has signed and the
    /// node has accepted it; waiting for inclusion is a separate concern.
    fn send_transaction(&self, tx: TxRequest) -> impl Future<Output = Result<B256, GameError>> + Send;

    /// Read-only contract call against latest state.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes, GameError>> + Send;

    fn estimate_gas(&self, tx: &TxRequest) -> impl Future<Output = Result<u64, GameError>> + Send;

    /// `None` until the transaction is mined.
    fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Option<TxReceipt>, GameError>> + Send;

    fn logs(&self, filter: &LogFilter) -> impl Future<Output = Result<Vec<LogEntry>, GameError>> + Send;
}
