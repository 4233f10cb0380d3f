use thiserror::Error;

/// Everything an operation can fail with, from local validation up to the
/// ledger rejecting a transaction. Failures are caught at the orchestrator
/// boundary and turned into status text; nothing here aborts the process.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("no wallet provider detected; install or start one to play")]
    WalletUnavailable,

    #[error("the wallet rejected the request")]
    UserRejected,

    #[error("wallet is not connected")]
    NotConnected,

    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient balance: have {balance} ETH, bet {bet} ETH")]
    InsufficientBalance { balance: f64, bet: f64 },

    #[error("a roll is already awaiting its outcome")]
    RollPending,

    // Recovered internally via the no-limit fallback submission; callers
    // other than the orchestrator never see this variant.
    #[error("gas estimation failed: {0}")]
    GasEstimationFailed(String),

    #[error("the ledger rejected the transaction: {0}")]
    Reverted(String),

    #[error("could not reach the ledger: {0}")]
    GatewayUnreachable(String),

    #[error("transaction confirmed but no outcome event was observed")]
    OutcomeTimeout,
}
