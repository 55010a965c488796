//! In-memory session state.

use mp_api_types::{Account, ErrorKind, MintError, TxHash};
use tokio::sync::broadcast;
use tracing::info;

const TRANSITION_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connected(Account),
    Minting(Account, TxHash),
    Minted(Account),
    Failed(Account, ErrorKind),
}

impl SessionPhase {
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Disconnected => None,
            Self::Connected(account)
            | Self::Minting(account, _)
            | Self::Minted(account)
            | Self::Failed(account, _) => Some(account),
        }
    }
}

/// Current account and phase, plus a feed of every transition.
pub struct SessionState {
    phase: SessionPhase,
    in_flight: bool,
    listener_attached: bool,
    transitions: broadcast::Sender<SessionPhase>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            phase: SessionPhase::Disconnected,
            in_flight: false,
            listener_attached: false,
            transitions,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn current_account(&self) -> Option<&Account> {
        self.phase.account()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionPhase> {
        self.transitions.subscribe()
    }

    pub fn listener_attached(&self) -> bool {
        self.listener_attached
    }

    pub fn mark_listener_attached(&mut self) {
        self.listener_attached = true;
    }

    /// Returns whether the current account changed.
    pub fn connect(&mut self, account: Account) -> Result<bool, MintError> {
        if self.in_flight {
            return Err(MintError::MintInProgress);
        }
        let changed = self.current_account() != Some(&account);
        self.set(SessionPhase::Connected(account));
        Ok(changed)
    }

    /// Claims the single mint slot for the current account.
    pub fn begin_mint(&mut self) -> Result<Account, MintError> {
        if self.in_flight {
            return Err(MintError::MintInProgress);
        }
        let account = self.current_account().cloned().ok_or(MintError::NotConnected)?;
        self.in_flight = true;
        Ok(account)
    }

    pub fn minting(&mut self, account: Account, hash: TxHash) {
        self.set(SessionPhase::Minting(account, hash));
    }

    pub fn minted(&mut self, account: Account) {
        self.in_flight = false;
        self.set(SessionPhase::Minted(account));
    }

    /// Records the failure, then returns to `Connected` so the user can retry.
    pub fn failed(&mut self, account: Account, kind: ErrorKind) {
        self.in_flight = false;
        self.set(SessionPhase::Failed(account.clone(), kind));
        self.set(SessionPhase::Connected(account));
    }

    fn set(&mut self, phase: SessionPhase) {
        info!(phase = ?phase, "session phase");
        self.phase = phase.clone();
        // No receivers is fine.
        let _ = self.transitions.send(phase);
    }
}
