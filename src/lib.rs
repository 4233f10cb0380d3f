pub mod bindings;
pub mod client;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod outcome;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod view;

pub use crate::{
    error::GameError,
    gateway::{
        ContractGateway,
        RollOutcome,
    },
    orchestrator::{
        OperationEvent,
        OperationKind,
        OperationStatus,
        PendingOperation,
        TransactionOrchestrator,
    },
    outcome::OutcomeListener,
    provider::{
        LogEntry,
        LogFilter,
        ProviderSignal,
        TxReceipt,
        TxRequest,
        WalletProvider,
    },
    rpc::HttpProvider,
    session::{
        Session,
        SessionChange,
        WalletSession,
    },
    view::{
        BetResult,
        EntryKind,
        HistoryEntry,
        LedgerView,
    },
};
