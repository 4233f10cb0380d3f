//! The balance and history the user sees. The balance is always re-read
//! from the ledger after a confirmed change, never derived from history;
//! history is newest-first and append-only.

use chrono::{
    DateTime,
    Utc,
};

use crate::{
    error::GameError,
    gateway::{
        ContractGateway,
        RollOutcome,
    },
    provider::WalletProvider,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Deposit,
    Withdraw,
    Bet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BetResult {
    Won,
    Lost,
}

/// Immutable once appended. `amount` is signed: positive for funds in,
/// negative for funds out.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub kind: EntryKind,
    pub amount: f64,
    pub roll: Option<u8>,
    pub result: Option<BetResult>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LedgerView {
    balance: f64,
    history: Vec<HistoryEntry>,
}

impl LedgerView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn formatted_balance(&self) -> String {
        format!("{:.4}", self.balance)
    }

    /// Newest first.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn record_deposit(&mut self, amount: f64) {
        self.prepend(HistoryEntry {
            kind: EntryKind::Deposit,
            amount,
            roll: None,
            result: None,
            timestamp: Utc::now(),
        });
    }

    pub fn record_withdrawal(&mut self, amount: f64) {
        self.prepend(HistoryEntry {
            kind: EntryKind::Withdraw,
            amount: -amount,
            roll: None,
            result: None,
            timestamp: Utc::now(),
        });
    }

    pub fn record_outcome(&mut self, outcome: &RollOutcome) {
        let (result, amount) = if outcome.win {
            (BetResult::Won, outcome.payout)
        } else {
            (BetResult::Lost, -outcome.bet_amount)
        };
        self.prepend(HistoryEntry {
            kind: EntryKind::Bet,
            amount,
            roll: Some(outcome.roll),
            result: Some(result),
            timestamp: Utc::now(),
        });
    }

    /// Overwrites the displayed balance with the latest ledger read.
    /// Idempotent; safe to call redundantly.
    pub async fn refresh<P: WalletProvider>(
        &mut self,
        gateway: &ContractGateway<P>,
    ) -> Result<(), GameError> {
        self.balance = gateway.read_balance(gateway.account()).await?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.balance = 0.0;
        self.history.clear();
    }

    fn prepend(&mut self, entry: HistoryEntry) {
        self.history.insert(0, entry);
    }
}
