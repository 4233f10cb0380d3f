use std::sync::Arc;

use alloy_primitives::Address;
use tracing::info;

use crate::{
    error::GameError,
    provider::{
        ProviderSignal,
        WalletProvider,
    },
};

/// Connection state for the active wallet. Reset to the disconnected state
/// on disconnect or chain change; mutated in place on an account switch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub connected: bool,
}

/// What a provider signal did to the session, so the owner knows whether to
/// rebuild its gateway or tear everything down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionChange {
    None,
    AccountSwitched(Address),
    Reset,
}

pub struct WalletSession<P> {
    provider: Arc<P>,
    session: Session,
}

impl<P: WalletProvider> WalletSession<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            session: Session::default(),
        }
    }

    pub fn provider(&self) -> Arc<P> {
        Arc::clone(&self.provider)
    }

    pub fn account(&self) -> Option<Address> {
        self.session.account
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.session.chain_id
    }

    pub fn is_connected(&self) -> bool {
        self.session.connected
    }

    /// Requests account access. No session exists until this succeeds.
    pub async fn connect(&mut self) -> Result<Address, GameError> {
        let accounts = self.provider.request_accounts().await?;
        let account = accounts.first().copied().ok_or(GameError::UserRejected)?;
        let chain_id = self.provider.chain_id().await?;
        self.session = Session {
            account: Some(account),
            chain_id: Some(chain_id),
            connected: true,
        };
        info!(%account, chain_id, "wallet connected");
        Ok(account)
    }

    /// Applies a provider signal. A non-empty account set switches the
    /// active account and stays connected; an empty set disconnects; a
    /// chain change always forces a full reset because the ledger address
    /// and semantics may differ on the new chain.
    pub fn apply_signal(&mut self, signal: ProviderSignal) -> SessionChange {
        if !self.session.connected {
            return SessionChange::None;
        }
        match signal {
            ProviderSignal::AccountsChanged(accounts) => match accounts.first().copied() {
                Some(account) if self.session.account == Some(account) => SessionChange::None,
                Some(account) => {
                    info!(%account, "active account switched");
                    self.session.account = Some(account);
                    SessionChange::AccountSwitched(account)
                }
                None => {
                    info!("wallet disconnected all accounts");
                    self.reset();
                    SessionChange::Reset
                }
            },
            ProviderSignal::ChainChanged(chain_id) => {
                info!(chain_id, "chain changed; resetting session");
                self.reset();
                SessionChange::Reset
            }
        }
    }

    pub fn reset(&mut self) {
        self.session = Session::default();
    }
}
