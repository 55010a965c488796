use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// An authorized signing identity, as reported by the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Account(pub String);

impl Account {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Account {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxHash {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broadcast emitted by the contract for every mint, whoever submitted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MintEvent {
    pub account: Account,
    pub token_id: TokenId,
}

/// Outcome of awaiting a submitted mint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MintReceipt {
    pub hash: TxHash,
    pub success: bool,
    /// Token id decoded from the receipt's own mint log, when the chain returned one.
    #[serde(default)]
    pub token_id: Option<TokenId>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    WalletUnavailable,
    AuthorizationDenied,
    SubmissionRejected,
    TransactionReverted,
    TransportError,
    InvalidInterface,
    NotConnected,
    MintInProgress,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::WalletUnavailable => "wallet_unavailable",
            Self::AuthorizationDenied => "authorization_denied",
            Self::SubmissionRejected => "submission_rejected",
            Self::TransactionReverted => "transaction_reverted",
            Self::TransportError => "transport_error",
            Self::InvalidInterface => "invalid_interface",
            Self::NotConnected => "not_connected",
            Self::MintInProgress => "mint_in_progress",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MintError {
    #[error("no wallet capability is available")]
    WalletUnavailable,
    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),
    #[error("transaction {hash} reverted")]
    TransactionReverted { hash: TxHash },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid contract interface: {0}")]
    InvalidInterface(String),
    #[error("no account is connected")]
    NotConnected,
    #[error("a mint is already in flight")]
    MintInProgress,
}

impl MintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WalletUnavailable => ErrorKind::WalletUnavailable,
            Self::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            Self::SubmissionRejected(_) => ErrorKind::SubmissionRejected,
            Self::TransactionReverted { .. } => ErrorKind::TransactionReverted,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::InvalidInterface(_) => ErrorKind::InvalidInterface,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::MintInProgress => ErrorKind::MintInProgress,
        }
    }

    /// Message shown to the person driving the session.
    pub fn user_message(&self) -> String {
        match self {
            Self::WalletUnavailable => "No wallet found. Install a wallet extension and reload.".to_owned(),
            Self::AuthorizationDenied(_) => "Wallet connection was declined.".to_owned(),
            Self::SubmissionRejected(reason) => format!("The mint was not submitted: {reason}"),
            Self::TransactionReverted { hash } => {
                format!("The mint transaction {hash} was rejected by the contract.")
            }
            Self::Transport(reason) => format!("Could not reach the network: {reason}"),
            Self::InvalidInterface(reason) => format!("Contract configuration is invalid: {reason}"),
            Self::NotConnected => "Connect a wallet before minting.".to_owned(),
            Self::MintInProgress => "A mint is already in progress.".to_owned(),
        }
    }

    pub fn is_startup_fatal(&self) -> bool {
        matches!(self, Self::InvalidInterface(_))
    }
}
