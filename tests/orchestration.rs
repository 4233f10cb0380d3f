#![allow(non_snake_case)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U256,
    utils::parse_ether,
};
use dicegame_client::{
    bindings,
    client::{
        AppConfig,
        DiceApp,
    },
    error::GameError,
    orchestrator::OperationEvent,
    provider::{
        LogEntry,
        LogFilter,
        ProviderSignal,
        TxReceipt,
        TxRequest,
        WalletProvider,
    },
    view::{
        BetResult,
        EntryKind,
    },
};
use tokio::time;

fn contract() -> Address {
    Address::repeat_byte(0xcc)
}

fn alice() -> Address {
    Address::repeat_byte(0xaa)
}

fn bob() -> Address {
    Address::repeat_byte(0xbb)
}

#[derive(Default)]
struct FakeState {
    available: bool,
    accounts: Vec<Address>,
    chain_id: u64,
    block: u64,
    balances: HashMap<Address, U256>,
    receipts: HashMap<B256, TxReceipt>,
    logs: Vec<LogEntry>,
    sent: Vec<TxRequest>,
    balance_reads: u64,
    next_tx: u64,
    fail_estimation: bool,
    reject_next_send: bool,
    revert_next_send: bool,
}

/// In-memory stand-in for the wallet provider and the chain behind it.
/// Transactions confirm instantly; outcome events appear only when a test
/// injects them.
struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                available: true,
                accounts: vec![alice()],
                chain_id: 1,
                block: 10,
                ..FakeState::default()
            }),
        })
    }

    fn make_unavailable(&self) {
        self.state.lock().unwrap().available = false;
    }

    fn set_balance(&self, who: Address, eth: &str) {
        let wei = parse_ether(eth).unwrap();
        self.state.lock().unwrap().balances.insert(who, wei);
    }

    fn fail_estimation(&self) {
        self.state.lock().unwrap().fail_estimation = true;
    }

    fn reject_next_send(&self) {
        self.state.lock().unwrap().reject_next_send = true;
    }

    fn revert_next_send(&self) {
        self.state.lock().unwrap().revert_next_send = true;
    }

    fn push_outcome_log(&self, player: Address, roll: u8, win: bool, bet: &str, payout: &str) {
        let mut data = Vec::with_capacity(128);
        data.extend_from_slice(&U256::from(roll).to_be_bytes::<32>());
        data.extend_from_slice(&U256::from(win as u8).to_be_bytes::<32>());
        data.extend_from_slice(&parse_ether(bet).unwrap().to_be_bytes::<32>());
        data.extend_from_slice(&parse_ether(payout).unwrap().to_be_bytes::<32>());
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        let entry = LogEntry {
            address: contract(),
            topics: vec![bindings::dice_rolled_topic(), player.into_word()],
            data: Bytes::from(data),
            block_number: state.block,
        };
        state.logs.push(entry);
    }

    fn sent(&self) -> Vec<TxRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    fn balance_reads(&self) -> u64 {
        self.state.lock().unwrap().balance_reads
    }
}

impl WalletProvider for FakeProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, GameError> {
        let state = self.state.lock().unwrap();
        if !state.available {
            return Err(GameError::WalletUnavailable);
        }
        Ok(state.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, GameError> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn block_number(&self) -> Result<u64, GameError> {
        Ok(self.state.lock().unwrap().block)
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, GameError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_next_send {
            state.reject_next_send = false;
            return Err(GameError::UserRejected);
        }
        state.next_tx += 1;
        state.block += 1;
        let tx_hash = B256::from(U256::from(state.next_tx));
        let success = !state.revert_next_send;
        state.revert_next_send = false;
        let block_number = state.block;
        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number,
                success,
            },
        );
        state.sent.push(tx);
        Ok(tx_hash)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, GameError> {
        let mut state = self.state.lock().unwrap();
        assert_eq!(to, contract(), "calls must target the ledger contract");
        let balances_call = bindings::balances_calldata(Address::ZERO);
        if data.len() >= 36 && data[..4] == balances_call[..4] {
            state.balance_reads += 1;
            let who = Address::from_slice(&data[16..36]);
            let balance = state.balances.get(&who).copied().unwrap_or(U256::ZERO);
            return Ok(Bytes::from(balance.to_be_bytes::<32>().to_vec()));
        }
        Err(GameError::GatewayUnreachable("unexpected call".into()))
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> Result<u64, GameError> {
        let state = self.state.lock().unwrap();
        if state.fail_estimation {
            return Err(GameError::GatewayUnreachable(
                "cannot estimate gas; transaction may fail".into(),
            ));
        }
        Ok(100_000)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, GameError> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, GameError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.block_number >= filter.from_block
                    && log.topics.first() == Some(&filter.topic0)
                    && filter
                        .topic1
                        .is_none_or(|topic1| log.topics.get(1) == Some(&topic1))
            })
            .cloned()
            .collect())
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::new("http://localhost:0", contract());
    config.receipt_poll = Duration::from_millis(10);
    config.outcome_poll = Duration::from_millis(10);
    config.outcome_grace = Duration::from_millis(500);
    config
}

struct TestContext {
    provider: Arc<FakeProvider>,
    app: DiceApp<FakeProvider>,
    events: tokio::sync::mpsc::UnboundedReceiver<OperationEvent>,
}

impl TestContext {
    fn new() -> Self {
        let provider = FakeProvider::new();
        let (app, events) = DiceApp::new(provider.clone(), test_config());
        Self {
            provider,
            app,
            events,
        }
    }

    async fn connected_with_balance(eth: &str) -> Self {
        let mut ctx = Self::new();
        ctx.provider.set_balance(alice(), eth);
        ctx.app.connect().await.unwrap();
        ctx
    }

    /// Waits for the next asynchronous completion and applies it.
    async fn pump_one(&mut self) {
        let event = time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for an operation event")
            .expect("event channel closed");
        self.app.handle_operation_event(event).await;
    }

    async fn assert_no_event(&mut self, wait: Duration) {
        if let Ok(Some(event)) = time::timeout(wait, self.events.recv()).await {
            panic!("unexpected operation event: {event:?}");
        }
    }
}

#[tokio::test]
async fn connect__without_provider_fails_with_wallet_unavailable() {
    // given
    let mut ctx = TestContext::new();
    ctx.provider.make_unavailable();

    // when
    let result = ctx.app.connect().await;

    // then
    assert!(matches!(result, Err(GameError::WalletUnavailable)));
    assert!(!ctx.app.is_connected());
    assert!(ctx.app.account().is_none());
}

#[tokio::test]
async fn deposit__confirmation_refreshes_balance_then_prepends_history() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.5").await;
    assert_eq!(ctx.app.view().balance(), 0.5);

    // when
    ctx.app.deposit(0.2).await.unwrap();
    ctx.provider.set_balance(alice(), "0.7");
    ctx.pump_one().await;

    // then
    assert_eq!(ctx.app.view().balance(), 0.7);
    let history = ctx.app.view().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Deposit);
    assert_eq!(history[0].amount, 0.2);
    // one read at connect, exactly one more for the confirmed deposit
    assert_eq!(ctx.provider.balance_reads(), 2);
}

#[tokio::test]
async fn withdraw__confirmation_debits_history_entry() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;

    // when
    ctx.app.withdraw(0.1).await.unwrap();
    ctx.provider.set_balance(alice(), "0.6");
    ctx.pump_one().await;

    // then
    assert_eq!(ctx.app.view().balance(), 0.6);
    let entry = &ctx.app.view().history()[0];
    assert_eq!(entry.kind, EntryKind::Withdraw);
    assert_eq!(entry.amount, -0.1);
}

#[tokio::test]
async fn deposit__rejects_non_positive_amount_before_any_network_call() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.5").await;

    // when
    let zero = ctx.app.deposit(0.0).await;
    let negative = ctx.app.withdraw(-1.0).await;

    // then
    assert!(matches!(zero, Err(GameError::InvalidAmount)));
    assert!(matches!(negative, Err(GameError::InvalidAmount)));
    assert!(ctx.provider.sent().is_empty());
}

#[tokio::test]
async fn roll__winning_outcome_prepends_entry_and_refreshes_balance() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;

    // when
    ctx.app.roll(0.1).await.unwrap();
    assert!(ctx.app.is_rolling());
    ctx.provider.push_outcome_log(alice(), 5, true, "0.1", "0.2");
    ctx.provider.set_balance(alice(), "0.8");
    ctx.pump_one().await;

    // then
    assert!(!ctx.app.is_rolling());
    assert_eq!(ctx.app.view().balance(), 0.8);
    let entry = &ctx.app.view().history()[0];
    assert_eq!(entry.kind, EntryKind::Bet);
    assert_eq!(entry.roll, Some(5));
    assert_eq!(entry.result, Some(BetResult::Won));
    assert_eq!(entry.amount, 0.2);
    assert!(ctx.app.status().contains("won"));
    // the one-shot listener never double-fires
    ctx.assert_no_event(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn roll__losing_outcome_debits_the_stake() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;

    // when
    ctx.app.roll(0.1).await.unwrap();
    ctx.provider.push_outcome_log(alice(), 2, false, "0.1", "0");
    ctx.provider.set_balance(alice(), "0.6");
    ctx.pump_one().await;

    // then
    let entry = &ctx.app.view().history()[0];
    assert_eq!(entry.roll, Some(2));
    assert_eq!(entry.result, Some(BetResult::Lost));
    assert_eq!(entry.amount, -0.1);
    assert!(ctx.app.status().contains("lost"));
}

#[tokio::test]
async fn roll__applies_thirty_percent_margin_to_the_gas_estimate() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;

    // when
    ctx.app.roll(0.1).await.unwrap();

    // then
    let sent = ctx.provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].gas_limit, Some(130_000));
}

#[tokio::test]
async fn roll__gas_estimation_failure_is_silent_and_submits_without_limit() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;
    ctx.provider.fail_estimation();

    // when
    let result = ctx.app.roll(0.1).await;

    // then: the submission still proceeds and no error surfaces
    assert!(result.is_ok());
    assert!(ctx.app.errors().is_empty());
    assert_eq!(ctx.app.status(), "Rolling for 0.1 ETH...");
    let sent = ctx.provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].gas_limit, None);

    // and the roll still resolves through its outcome event
    ctx.provider.push_outcome_log(alice(), 6, true, "0.1", "0.2");
    ctx.pump_one().await;
    assert!(!ctx.app.is_rolling());
}

#[tokio::test]
async fn roll__second_submission_while_pending_is_rejected_locally() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;
    ctx.app.roll(0.1).await.unwrap();

    // when
    let second = ctx.app.roll(0.1).await;

    // then: rejected without reaching the network
    assert!(matches!(second, Err(GameError::RollPending)));
    assert_eq!(ctx.provider.sent().len(), 1);
}

#[tokio::test]
async fn roll__insufficient_displayed_balance_is_rejected_locally() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.05").await;

    // when
    let result = ctx.app.roll(0.1).await;

    // then
    assert!(matches!(result, Err(GameError::InsufficientBalance { .. })));
    assert!(ctx.provider.sent().is_empty());
    assert_eq!(ctx.app.status(), "Insufficient balance. Please deposit more ETH.");
}

#[tokio::test]
async fn roll__user_rejection_clears_pending_flag_for_retry() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;
    ctx.provider.reject_next_send();

    // when
    let rejected = ctx.app.roll(0.1).await;

    // then: surfaced, nothing left pending, a retry may submit
    assert!(matches!(rejected, Err(GameError::UserRejected)));
    assert!(!ctx.app.is_rolling());
    ctx.assert_no_event(Duration::from_millis(100)).await;
    ctx.app.roll(0.1).await.unwrap();
    assert_eq!(ctx.provider.sent().len(), 1);
}

#[tokio::test]
async fn roll__reverted_transaction_surfaces_failure_and_clears_pending() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;
    ctx.provider.revert_next_send();

    // when
    ctx.app.roll(0.1).await.unwrap();
    ctx.pump_one().await;

    // then
    assert!(!ctx.app.is_rolling());
    assert_eq!(ctx.app.status(), "Transaction failed. Please try again.");
    assert!(ctx.app.view().history().is_empty());
}

#[tokio::test]
async fn roll__confirmed_without_outcome_resolves_as_failure_after_grace() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;

    // when: the transaction confirms but no event ever arrives
    ctx.app.roll(0.1).await.unwrap();
    ctx.pump_one().await;

    // then: the rolling indicator clears with a failure-style message
    assert!(!ctx.app.is_rolling());
    assert!(ctx.app.status().contains("no outcome"));
    assert!(!ctx.app.errors().is_empty());
    assert!(ctx.app.view().history().is_empty());
}

#[tokio::test]
async fn operations__deposit_interleaves_with_a_pending_roll() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;

    // when: a deposit confirms while the roll is still unresolved
    ctx.app.roll(0.1).await.unwrap();
    ctx.app.deposit(0.2).await.unwrap();
    ctx.provider.set_balance(alice(), "0.9");
    ctx.pump_one().await;
    assert!(ctx.app.is_rolling());
    ctx.provider.push_outcome_log(alice(), 4, true, "0.1", "0.2");
    ctx.pump_one().await;

    // then: both completions landed, newest first
    assert!(!ctx.app.is_rolling());
    let history = ctx.app.view().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, EntryKind::Bet);
    assert_eq!(history[1].kind, EntryKind::Deposit);
}

#[tokio::test]
async fn chain_change__while_roll_pending_resets_session_and_ignores_late_outcome() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;
    ctx.app.roll(0.1).await.unwrap();
    assert!(ctx.app.is_rolling());

    // when
    ctx.app.handle_signal(ProviderSignal::ChainChanged(5)).await;
    ctx.provider.push_outcome_log(alice(), 5, true, "0.1", "0.2");

    // then: session reset, pending flag cleared, stale outcome ignored
    assert!(!ctx.app.is_connected());
    assert!(!ctx.app.is_rolling());
    ctx.assert_no_event(Duration::from_millis(300)).await;
    assert!(ctx.app.view().history().is_empty());
    assert_eq!(ctx.app.view().balance(), 0.0);
}

#[tokio::test]
async fn accounts_changed__switch_drops_listeners_for_the_previous_account() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.7").await;
    ctx.provider.set_balance(bob(), "1.0");
    ctx.app.roll(0.1).await.unwrap();

    // when
    ctx.app
        .handle_signal(ProviderSignal::AccountsChanged(vec![bob()]))
        .await;
    ctx.provider.push_outcome_log(alice(), 6, true, "0.1", "0.2");

    // then: still connected as bob, alice's outcome produces nothing
    assert!(ctx.app.is_connected());
    assert_eq!(ctx.app.account(), Some(bob()));
    assert_eq!(ctx.app.view().balance(), 1.0);
    assert!(!ctx.app.is_rolling());
    ctx.assert_no_event(Duration::from_millis(300)).await;
    assert!(ctx.app.view().history().is_empty());
}

#[tokio::test]
async fn accounts_changed__empty_set_disconnects_the_session() {
    // given
    let mut ctx = TestContext::connected_with_balance("0.5").await;

    // when
    ctx.app
        .handle_signal(ProviderSignal::AccountsChanged(Vec::new()))
        .await;

    // then
    assert!(!ctx.app.is_connected());
    assert!(ctx.app.account().is_none());
}
