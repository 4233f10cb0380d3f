//! Typed invocation wrapper around the ledger contract. This is the only
//! place display amounts (decimal ETH) and base units (wei) are converted,
//! in either direction.

use std::{
    sync::Arc,
    time::Duration,
};

use alloy_primitives::{
    Address,
    B256,
    U256,
    utils::{
        format_ether,
        parse_ether,
    },
};
use tokio::time;
use tracing::debug;

use crate::{
    bindings,
    error::GameError,
    provider::{
        LogFilter,
        TxReceipt,
        TxRequest,
        WalletProvider,
    },
};

/// The result of one roll as reported by the ledger. The client never
/// computes one of these; they are decoded from `DiceRolled` events only.
#[derive(Clone, Debug, PartialEq)]
pub struct RollOutcome {
    pub player: Address,
    pub roll: u8,
    pub win: bool,
    pub bet_amount: f64,
    pub payout: f64,
}

impl RollOutcome {
    /// The house rule: 4, 5 and 6 win. Used by tests and by a decode-time
    /// sanity warning; never to synthesize an outcome.
    pub fn win_expected(roll: u8) -> bool {
        (4..=6).contains(&roll)
    }
}

pub struct ContractGateway<P> {
    provider: Arc<P>,
    contract: Address,
    account: Address,
    receipt_poll: Duration,
}

impl<P> Clone for ContractGateway<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            contract: self.contract,
            account: self.account,
            receipt_poll: self.receipt_poll,
        }
    }
}

impl<P: WalletProvider> ContractGateway<P> {
    pub fn new(
        provider: Arc<P>,
        contract: Address,
        account: Address,
        receipt_poll: Duration,
    ) -> Self {
        Self {
            provider,
            contract,
            account,
            receipt_poll,
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub async fn deposit(&self, amount: f64) -> Result<B256, GameError> {
        let value = wei_from_display(amount)?;
        let tx = TxRequest::new(self.account, self.contract, bindings::deposit_calldata())
            .with_value(value);
        self.provider.send_transaction(tx).await
    }

    pub async fn withdraw(&self, amount: f64) -> Result<B256, GameError> {
        let wei = wei_from_display(amount)?;
        let tx = TxRequest::new(self.account, self.contract, bindings::withdraw_calldata(wei));
        self.provider.send_transaction(tx).await
    }

    pub async fn roll_dice(&self, bet: f64, gas_limit: Option<u64>) -> Result<B256, GameError> {
        let tx = self.roll_request(bet)?.with_gas_limit(gas_limit);
        self.provider.send_transaction(tx).await
    }

    pub async fn estimate_roll_gas(&self, bet: f64) -> Result<u64, GameError> {
        let tx = self.roll_request(bet)?;
        self.provider
            .estimate_gas(&tx)
            .await
            .map_err(|e| GameError::GasEstimationFailed(e.to_string()))
    }

    fn roll_request(&self, bet: f64) -> Result<TxRequest, GameError> {
        let wei = wei_from_display(bet)?;
        Ok(TxRequest::new(
            self.account,
            self.contract,
            bindings::roll_dice_calldata(wei),
        ))
    }

    /// Safe to call at any time; reflects last confirmed chain state only.
    pub async fn read_balance(&self, who: Address) -> Result<f64, GameError> {
        let returned = self
            .provider
            .call(self.contract, bindings::balances_calldata(who))
            .await?;
        let wei = bindings::decode_uint_return(&returned)?;
        Ok(display_from_wei(wei))
    }

    pub async fn current_block(&self) -> Result<u64, GameError> {
        self.provider.block_number().await
    }

    /// Suspends until the network reports the transaction mined; a reverted
    /// execution surfaces as `Reverted`.
    pub async fn await_confirmation(&self, tx_hash: B256) -> Result<TxReceipt, GameError> {
        loop {
            if let Some(receipt) = self.provider.transaction_receipt(tx_hash).await? {
                if receipt.success {
                    return Ok(receipt);
                }
                return Err(GameError::Reverted(format!(
                    "transaction {tx_hash} reverted in block {}",
                    receipt.block_number
                )));
            }
            time::sleep(self.receipt_poll).await;
        }
    }

    /// Fetches the first `DiceRolled` emitted for `player` at or after
    /// `from_block`, already converted to display units.
    pub async fn poll_outcome(
        &self,
        player: Address,
        from_block: u64,
    ) -> Result<Option<RollOutcome>, GameError> {
        let filter = LogFilter {
            address: self.contract,
            topic0: bindings::dice_rolled_topic(),
            topic1: Some(player.into_word()),
            from_block,
        };
        for log in self.provider.logs(&filter).await? {
            let event = match bindings::decode_dice_rolled(&log.topics, &log.data) {
                Ok(event) => event,
                Err(err) => {
                    debug!(%err, "skipping undecodable DiceRolled log");
                    continue;
                }
            };
            if event.player != player {
                continue;
            }
            if event.win != RollOutcome::win_expected(event.roll) {
                debug!(roll = event.roll, win = event.win, "ledger outcome disagrees with house rule");
            }
            return Ok(Some(RollOutcome {
                player: event.player,
                roll: event.roll,
                win: event.win,
                bet_amount: display_from_wei(event.bet_amount),
                payout: display_from_wei(event.payout),
            }));
        }
        Ok(None)
    }
}

/// Decimal ETH to wei. Positivity is checked here so an invalid amount is
/// rejected before any network call.
pub fn wei_from_display(amount: f64) -> Result<U256, GameError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(GameError::InvalidAmount);
    }
    parse_ether(&amount.to_string()).map_err(|_| GameError::InvalidAmount)
}

/// Wei to decimal ETH.
pub fn display_from_wei(wei: U256) -> f64 {
    format_ether(wei).parse().unwrap_or_default()
}
