use std::time::Duration;

use tokio::{
    sync::{
        mpsc,
        oneshot,
    },
    task::JoinHandle,
    time,
};
use tracing::debug;

use crate::{
    gateway::ContractGateway,
    orchestrator::OperationEvent,
    provider::WalletProvider,
};

/// One-shot subscription to the ledger's outcome event for a single bet,
/// filtered to the account that placed it. Registered no later than the
/// roll submission so a fast-confirming event cannot be missed; removes
/// itself after the first match and is aborted on drop, so a stale event
/// after a session reset has nobody left to fire.
pub struct OutcomeListener {
    handle: JoinHandle<()>,
}

impl OutcomeListener {
    pub fn register<P: WalletProvider>(
        gateway: ContractGateway<P>,
        from_block: u64,
        poll: Duration,
        events: mpsc::UnboundedSender<OperationEvent>,
        resolved: oneshot::Sender<()>,
    ) -> Self {
        let player = gateway.account();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(poll);
            loop {
                ticker.tick().await;
                match gateway.poll_outcome(player, from_block).await {
                    Ok(Some(outcome)) => {
                        debug!(roll = outcome.roll, win = outcome.win, "outcome observed");
                        let _ = events.send(OperationEvent::RollResolved {
                            account: player,
                            outcome,
                        });
                        let _ = resolved.send(());
                        // one-shot: deliver once, then unsubscribe
                        return;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        debug!(%err, "outcome poll failed; retrying");
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for OutcomeListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
