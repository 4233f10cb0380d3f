//! Sequences a logical operation into validate, estimate (rolls only),
//! submit, await confirmation. Submission happens on the caller's task;
//! confirmation and outcome waits run on spawned watchers that report back
//! over the event channel, so deposits, withdrawals and a roll can be in
//! flight at the same time.

use std::time::Duration;

use alloy_primitives::{
    Address,
    B256,
};
use tokio::{
    sync::{
        mpsc,
        oneshot,
    },
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    error::GameError,
    gateway::{
        ContractGateway,
        RollOutcome,
    },
    outcome::OutcomeListener,
    provider::WalletProvider,
};

// Safety margin applied on top of a successful gas estimate.
const GAS_MARGIN_NUM: u64 = 130;
const GAS_MARGIN_DEN: u64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Deposit,
    Withdraw,
    Roll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    Submitted,
    Confirmed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub amount: f64,
    pub status: OperationStatus,
}

/// Asynchronous completion of an operation, reported by a watcher or the
/// outcome listener. Every event names the account it belongs to so the
/// receiver can drop events from a session that has since changed.
#[derive(Debug)]
pub enum OperationEvent {
    TransferConfirmed {
        account: Address,
        op: PendingOperation,
    },
    OperationFailed {
        account: Address,
        op: PendingOperation,
        error: GameError,
    },
    RollResolved {
        account: Address,
        outcome: RollOutcome,
    },
    /// The roll transaction confirmed but no outcome event was observed
    /// within the grace period. Funds may have moved on-chain; surfaced as
    /// a failure so the rolling indicator never hangs.
    RollUnresolved { account: Address },
}

impl OperationEvent {
    pub fn account(&self) -> Address {
        match self {
            OperationEvent::TransferConfirmed { account, .. }
            | OperationEvent::OperationFailed { account, .. }
            | OperationEvent::RollResolved { account, .. }
            | OperationEvent::RollUnresolved { account } => *account,
        }
    }
}

pub struct TransactionOrchestrator<P> {
    gateway: ContractGateway<P>,
    events: mpsc::UnboundedSender<OperationEvent>,
    outcome_grace: Duration,
    outcome_poll: Duration,
    // At most one roll may be pending per session; holding the listener
    // here is both the flag and the teardown handle.
    pending_roll: Option<OutcomeListener>,
    watchers: Vec<JoinHandle<()>>,
}

impl<P: WalletProvider> TransactionOrchestrator<P> {
    pub fn new(
        gateway: ContractGateway<P>,
        events: mpsc::UnboundedSender<OperationEvent>,
        outcome_grace: Duration,
        outcome_poll: Duration,
    ) -> Self {
        Self {
            gateway,
            events,
            outcome_grace,
            outcome_poll,
            pending_roll: None,
            watchers: Vec::new(),
        }
    }

    pub fn gateway(&self) -> &ContractGateway<P> {
        &self.gateway
    }

    pub fn has_pending_roll(&self) -> bool {
        self.pending_roll.is_some()
    }

    pub async fn deposit(&mut self, amount: f64) -> Result<PendingOperation, GameError> {
        ensure_positive(amount)?;
        let tx_hash = self.gateway.deposit(amount).await?;
        info!(%tx_hash, amount, "deposit submitted");
        self.spawn_transfer_watcher(OperationKind::Deposit, amount, tx_hash);
        Ok(operation(OperationKind::Deposit, amount, OperationStatus::Submitted))
    }

    pub async fn withdraw(&mut self, amount: f64) -> Result<PendingOperation, GameError> {
        ensure_positive(amount)?;
        let tx_hash = self.gateway.withdraw(amount).await?;
        info!(%tx_hash, amount, "withdrawal submitted");
        self.spawn_transfer_watcher(OperationKind::Withdraw, amount, tx_hash);
        Ok(operation(OperationKind::Withdraw, amount, OperationStatus::Submitted))
    }

    /// The displayed balance gates the bet locally as an advisory check;
    /// the ledger remains the final arbiter and may still reject.
    pub async fn roll(
        &mut self,
        bet: f64,
        displayed_balance: f64,
    ) -> Result<PendingOperation, GameError> {
        ensure_positive(bet)?;
        if displayed_balance < bet {
            return Err(GameError::InsufficientBalance {
                balance: displayed_balance,
                bet,
            });
        }
        if self.pending_roll.is_some() {
            return Err(GameError::RollPending);
        }

        let from_block = self.gateway.current_block().await.unwrap_or(0);
        let (resolved_tx, resolved_rx) = oneshot::channel();
        // Register the one-shot listener before submitting so an event in
        // the submission block cannot be missed.
        let listener = OutcomeListener::register(
            self.gateway.clone(),
            from_block,
            self.outcome_poll,
            self.events.clone(),
            resolved_tx,
        );

        let gas_limit = match self.gateway.estimate_roll_gas(bet).await {
            Ok(estimate) => Some(estimate.saturating_mul(GAS_MARGIN_NUM) / GAS_MARGIN_DEN),
            Err(err) => {
                // Internal fallback: submit with the provider's default
                // limit instead. Not an operation failure.
                warn!(%err, "gas estimation failed; submitting without an explicit limit");
                None
            }
        };

        let tx_hash = match self.gateway.roll_dice(bet, gas_limit).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                drop(listener);
                return Err(err);
            }
        };
        info!(%tx_hash, bet, "roll submitted");
        self.pending_roll = Some(listener);
        self.spawn_roll_watcher(bet, tx_hash, resolved_rx);
        Ok(operation(OperationKind::Roll, bet, OperationStatus::Submitted))
    }

    /// Clears the single-pending-roll flag and tears down its listener.
    pub fn clear_pending_roll(&mut self) {
        self.pending_roll = None;
    }

    /// Stops every watcher and listener. Already-submitted transactions
    /// still run to completion or reversion on the ledger; we only stop
    /// listening for them.
    pub fn reset(&mut self) {
        self.pending_roll = None;
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }

    fn spawn_transfer_watcher(&mut self, kind: OperationKind, amount: f64, tx_hash: B256) {
        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let account = gateway.account();
        let handle = tokio::spawn(async move {
            let event = match gateway.await_confirmation(tx_hash).await {
                Ok(receipt) => {
                    debug!(%tx_hash, block = receipt.block_number, ?kind, "transfer confirmed");
                    OperationEvent::TransferConfirmed {
                        account,
                        op: operation(kind, amount, OperationStatus::Confirmed),
                    }
                }
                Err(error) => OperationEvent::OperationFailed {
                    account,
                    op: operation(kind, amount, OperationStatus::Failed),
                    error,
                },
            };
            let _ = events.send(event);
        });
        self.track(handle);
    }

    fn spawn_roll_watcher(&mut self, bet: f64, tx_hash: B256, resolved_rx: oneshot::Receiver<()>) {
        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let grace = self.outcome_grace;
        let account = gateway.account();
        let handle = tokio::spawn(async move {
            match gateway.await_confirmation(tx_hash).await {
                Ok(receipt) => {
                    // The receipt only proves the transaction executed; the
                    // event remains the sole source of the outcome.
                    debug!(%tx_hash, block = receipt.block_number, "roll confirmed; awaiting outcome");
                    if time::timeout(grace, resolved_rx).await.is_err() {
                        let _ = events.send(OperationEvent::RollUnresolved { account });
                    }
                }
                Err(error) => {
                    let _ = events.send(OperationEvent::OperationFailed {
                        account,
                        op: operation(OperationKind::Roll, bet, OperationStatus::Failed),
                        error,
                    });
                }
            }
        });
        self.track(handle);
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.watchers.retain(|watcher| !watcher.is_finished());
        self.watchers.push(handle);
    }
}

impl<P> Drop for TransactionOrchestrator<P> {
    fn drop(&mut self) {
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }
}

fn operation(kind: OperationKind, amount: f64, status: OperationStatus) -> PendingOperation {
    PendingOperation {
        kind,
        amount,
        status,
    }
}

fn ensure_positive(amount: f64) -> Result<(), GameError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(GameError::InvalidAmount);
    }
    Ok(())
}
