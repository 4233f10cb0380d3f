//! The application controller: owns the session, the orchestrator and the
//! ledger view, applies provider signals and operation completions, and
//! drives the interactive loop for the binary.

use std::{
    sync::Arc,
    time::Duration,
};

use alloy_primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use tokio::{
    io::{
        AsyncBufReadExt,
        BufReader,
    },
    sync::mpsc,
};
use tracing::{
    debug,
    error,
    warn,
};

use crate::{
    error::GameError,
    gateway::ContractGateway,
    orchestrator::{
        OperationEvent,
        OperationKind,
        PendingOperation,
        TransactionOrchestrator,
    },
    provider::{
        ProviderSignal,
        WalletProvider,
    },
    rpc::HttpProvider,
    session::{
        SessionChange,
        WalletSession,
    },
    view::{
        BetResult,
        EntryKind,
        LedgerView,
    },
};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x2af3733be093331b70b4ff07141c4f3fd3960b55";
pub const CONTRACT_ADDRESS_ENV: &str = "DICE_CONTRACT_ADDRESS";

const MAX_ERRORS: usize = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub rpc_url: String,
    pub contract: Address,
    pub receipt_poll: Duration,
    pub outcome_poll: Duration,
    pub outcome_grace: Duration,
    pub signal_poll: Duration,
}

impl AppConfig {
    pub fn new(rpc_url: impl Into<String>, contract: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract,
            receipt_poll: Duration::from_millis(500),
            outcome_poll: Duration::from_millis(500),
            outcome_grace: Duration::from_secs(30),
            signal_poll: Duration::from_secs(2),
        }
    }
}

/// Ledger address resolution: explicit flag, then the environment, then the
/// built-in default deployment.
pub fn resolve_contract_address(flag: Option<&str>) -> Result<Address> {
    let raw = match flag {
        Some(raw) => raw.to_string(),
        None => std::env::var(CONTRACT_ADDRESS_ENV)
            .unwrap_or_else(|_| DEFAULT_CONTRACT_ADDRESS.to_string()),
    };
    raw.parse()
        .map_err(|_| eyre!("invalid ledger contract address: {raw}"))
}

pub struct DiceApp<P> {
    config: AppConfig,
    session: WalletSession<P>,
    orchestrator: Option<TransactionOrchestrator<P>>,
    view: LedgerView,
    events_tx: mpsc::UnboundedSender<OperationEvent>,
    status: String,
    errors: Vec<String>,
}

impl<P: WalletProvider> DiceApp<P> {
    pub fn new(
        provider: Arc<P>,
        config: AppConfig,
    ) -> (Self, mpsc::UnboundedReceiver<OperationEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let app = Self {
            config,
            session: WalletSession::new(provider),
            orchestrator: None,
            view: LedgerView::new(),
            events_tx,
            status: String::from("Ready"),
            errors: Vec::new(),
        };
        (app, events_rx)
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn view(&self) -> &LedgerView {
        &self.view
    }

    pub fn account(&self) -> Option<Address> {
        self.session.account()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn is_rolling(&self) -> bool {
        self.orchestrator
            .as_ref()
            .is_some_and(|orchestrator| orchestrator.has_pending_roll())
    }

    pub async fn connect(&mut self) -> Result<(), GameError> {
        match self.session.connect().await {
            Ok(account) => {
                self.build_orchestrator(account);
                self.refresh_balance().await;
                self.set_status(format!("Connected as {account}"));
                Ok(())
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn deposit(&mut self, amount: f64) -> Result<PendingOperation, GameError> {
        let submitted = match self.orchestrator.as_mut() {
            Some(orchestrator) => orchestrator.deposit(amount).await,
            None => Err(GameError::NotConnected),
        };
        match submitted {
            Ok(op) => {
                self.set_status(format!("Depositing {amount} ETH..."));
                Ok(op)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn withdraw(&mut self, amount: f64) -> Result<PendingOperation, GameError> {
        let submitted = match self.orchestrator.as_mut() {
            Some(orchestrator) => orchestrator.withdraw(amount).await,
            None => Err(GameError::NotConnected),
        };
        match submitted {
            Ok(op) => {
                self.set_status(format!("Withdrawing {amount} ETH..."));
                Ok(op)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    pub async fn roll(&mut self, bet: f64) -> Result<PendingOperation, GameError> {
        let balance = self.view.balance();
        let submitted = match self.orchestrator.as_mut() {
            Some(orchestrator) => orchestrator.roll(bet, balance).await,
            None => Err(GameError::NotConnected),
        };
        match submitted {
            Ok(op) => {
                self.set_status(format!("Rolling for {bet} ETH..."));
                Ok(op)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Safe to call at any time; overwrites the displayed balance with the
    /// latest ledger read.
    pub async fn refresh_balance(&mut self) {
        let Some(orchestrator) = self.orchestrator.as_ref() else {
            return;
        };
        if let Err(err) = self.view.refresh(orchestrator.gateway()).await {
            warn!(%err, "balance refresh failed");
            self.push_error(format!("balance refresh failed: {err}"));
        }
    }

    pub async fn handle_signal(&mut self, signal: ProviderSignal) {
        match self.session.apply_signal(signal) {
            SessionChange::None => {}
            SessionChange::AccountSwitched(account) => {
                // The old gateway handle is invalid; rebuilding tears down
                // pending listeners so a stale outcome cannot fire.
                self.build_orchestrator(account);
                self.refresh_balance().await;
                self.set_status(format!("Switched to {account}"));
            }
            SessionChange::Reset => self.full_reset(),
        }
    }

    pub async fn handle_operation_event(&mut self, event: OperationEvent) {
        if self.session.account() != Some(event.account()) {
            debug!(account = %event.account(), "ignoring completion for a stale session");
            return;
        }
        match event {
            OperationEvent::TransferConfirmed { op, .. } => {
                self.refresh_balance().await;
                match op.kind {
                    OperationKind::Deposit => {
                        self.view.record_deposit(op.amount);
                        self.set_status(format!("Deposited {} ETH", op.amount));
                    }
                    OperationKind::Withdraw => {
                        self.view.record_withdrawal(op.amount);
                        self.set_status(format!("Withdrew {} ETH", op.amount));
                    }
                    // rolls resolve through their outcome event
                    OperationKind::Roll => {}
                }
            }
            OperationEvent::RollResolved { outcome, .. } => {
                self.clear_pending_roll();
                self.view.record_outcome(&outcome);
                self.refresh_balance().await;
                if outcome.win {
                    self.set_status(format!(
                        "You rolled a {} and won {} ETH!",
                        outcome.roll, outcome.payout
                    ));
                } else {
                    self.set_status(format!(
                        "You rolled a {} and lost {} ETH.",
                        outcome.roll, outcome.bet_amount
                    ));
                }
            }
            OperationEvent::RollUnresolved { .. } => {
                self.clear_pending_roll();
                self.push_error(GameError::OutcomeTimeout.to_string());
                self.set_status(
                    "Roll confirmed on-chain but no outcome was observed; \
                     check your balance and reconcile manually.",
                );
            }
            OperationEvent::OperationFailed { op, error, .. } => {
                if op.kind == OperationKind::Roll {
                    self.clear_pending_roll();
                }
                self.record_failure(&error);
            }
        }
    }

    fn build_orchestrator(&mut self, account: Address) {
        let gateway = ContractGateway::new(
            self.session.provider(),
            self.config.contract,
            account,
            self.config.receipt_poll,
        );
        // Replacing the orchestrator drops the old one, which aborts its
        // watchers and any one-shot listener still registered.
        self.orchestrator = Some(TransactionOrchestrator::new(
            gateway,
            self.events_tx.clone(),
            self.config.outcome_grace,
            self.config.outcome_poll,
        ));
    }

    fn full_reset(&mut self) {
        // Submitted transactions cannot be cancelled; we only stop
        // listening for their confirmations and outcomes.
        if let Some(orchestrator) = self.orchestrator.as_mut() {
            orchestrator.reset();
        }
        self.orchestrator = None;
        self.view.clear();
        self.set_status("Session reset; connect your wallet to continue.");
    }

    fn clear_pending_roll(&mut self) {
        if let Some(orchestrator) = self.orchestrator.as_mut() {
            orchestrator.clear_pending_roll();
        }
    }

    fn record_failure(&mut self, err: &GameError) {
        error!(%err, "operation failed");
        self.push_error(err.to_string());
        let status = match err {
            GameError::WalletUnavailable => {
                "No wallet provider detected. Install one to use this app.".to_string()
            }
            GameError::InsufficientBalance { .. } => {
                "Insufficient balance. Please deposit more ETH.".to_string()
            }
            GameError::InvalidAmount
            | GameError::RollPending
            | GameError::NotConnected
            | GameError::UserRejected => err.to_string(),
            _ => "Transaction failed. Please try again.".to_string(),
        };
        self.set_status(status);
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    fn push_error(&mut self, message: String) {
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let (provider, mut signals) =
        HttpProvider::connect(config.rpc_url.clone(), config.signal_poll).await?;
    let (mut app, mut events) = DiceApp::new(Arc::new(provider), config);

    println!("dicegame-client (type `help` for commands)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events.recv() => {
                app.handle_operation_event(event).await;
                println!("{}", app.status());
            }
            Some(signal) = signals.recv() => {
                app.handle_signal(signal).await;
                println!("{}", app.status());
            }
            line = lines.next_line() => {
                let Some(line) = line.wrap_err("reading stdin failed")? else {
                    break;
                };
                if handle_command(&mut app, line.trim()).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Returns true when the user asked to quit.
async fn handle_command(app: &mut DiceApp<HttpProvider>, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("quit") | Some("exit") => return true,
        Some("help") => print_help(),
        Some("connect") => {
            let _ = app.connect().await;
            println!("{}", app.status());
        }
        Some("deposit") => {
            if let Some(amount) = parse_amount(parts.next()) {
                let _ = app.deposit(amount).await;
            }
            println!("{}", app.status());
        }
        Some("withdraw") => {
            if let Some(amount) = parse_amount(parts.next()) {
                let _ = app.withdraw(amount).await;
            }
            println!("{}", app.status());
        }
        Some("roll") => {
            if let Some(bet) = parse_amount(parts.next()) {
                let _ = app.roll(bet).await;
            }
            println!("{}", app.status());
        }
        Some("balance") => {
            app.refresh_balance().await;
            println!("Balance: {} ETH", app.view().formatted_balance());
        }
        Some("history") => print_history(app),
        Some("status") => println!("{}", app.status()),
        Some(other) => println!("unknown command: {other} (try `help`)"),
    }
    false
}

fn parse_amount(raw: Option<&str>) -> Option<f64> {
    match raw.map(str::parse::<f64>) {
        Some(Ok(amount)) => Some(amount),
        _ => {
            println!("expected a decimal ETH amount, e.g. `0.1`");
            None
        }
    }
}

fn print_history(app: &DiceApp<HttpProvider>) {
    let history = app.view().history();
    if history.is_empty() {
        println!("No transactions yet");
        return;
    }
    for entry in history {
        let kind = match entry.kind {
            EntryKind::Deposit => "Deposit",
            EntryKind::Withdraw => "Withdraw",
            EntryKind::Bet => "Bet",
        };
        let mut line = format!(
            "{}  {:<8} {:+} ETH",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            kind,
            entry.amount
        );
        if let (Some(roll), Some(result)) = (entry.roll, entry.result) {
            let result = match result {
                BetResult::Won => "Won",
                BetResult::Lost => "Lost",
            };
            line.push_str(&format!("  rolled {roll} - {result}"));
        }
        println!("{line}");
    }
}

fn print_help() {
    println!(
        "Commands:\n\
         \x20 connect            request wallet access\n\
         \x20 deposit <eth>      deposit ETH into the game\n\
         \x20 withdraw <eth>     withdraw ETH from the game\n\
         \x20 roll <eth>         bet and roll (4, 5 or 6 doubles the bet)\n\
         \x20 balance            re-read the ledger balance\n\
         \x20 history            show the transaction history\n\
         \x20 status             show the last status line\n\
         \x20 quit               exit"
    );
}
