use async_trait::async_trait;
use mp_api_types::{Account, MintError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// EIP-1193 code for a request the user declined.
pub const USER_REJECTED: i64 = 4001;
pub const UNAUTHORIZED: i64 = 4100;
pub const UNSUPPORTED_METHOD: i64 = 4200;
pub const DISCONNECTED: i64 = 4900;
pub const CHAIN_DISCONNECTED: i64 = 4901;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMethod {
    /// Silent query, never prompts.
    Accounts,
    /// Opens the wallet's authorization prompt.
    RequestAccounts,
}

impl WalletMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accounts => "eth_accounts",
            Self::RequestAccounts => "eth_requestAccounts",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("wallet request failed ({code}): {message}")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Host-supplied wallet object. Implementations forward `request` to whatever
/// actually holds the keys.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    async fn request(&self, method: WalletMethod) -> Result<Vec<String>, ProviderRpcError>;
}

/// Stateless adapter over an optional wallet capability.
#[derive(Clone, Default)]
pub struct WalletProvider {
    capability: Option<Arc<dyn WalletCapability>>,
}

impl WalletProvider {
    pub fn new(capability: Arc<dyn WalletCapability>) -> Self {
        Self {
            capability: Some(capability),
        }
    }

    /// Adapter for a host that injected no wallet.
    pub fn unavailable() -> Self {
        Self { capability: None }
    }

    pub async fn query_authorized_accounts(&self) -> Result<Vec<Account>, MintError> {
        let Some(capability) = &self.capability else {
            info!("no wallet capability present");
            return Ok(Vec::new());
        };

        match capability.request(WalletMethod::Accounts).await {
            Ok(raw) => Ok(to_accounts(raw)),
            Err(err) if err.code == UNAUTHORIZED => Ok(Vec::new()),
            Err(err) => Err(classify(err)),
        }
    }

    pub async fn request_authorization(&self) -> Result<Vec<Account>, MintError> {
        let Some(capability) = &self.capability else {
            return Err(MintError::WalletUnavailable);
        };

        let accounts = to_accounts(
            capability
                .request(WalletMethod::RequestAccounts)
                .await
                .map_err(classify)?,
        );

        if accounts.is_empty() {
            return Err(MintError::AuthorizationDenied(
                "wallet returned no accounts".to_owned(),
            ));
        }

        debug!(count = accounts.len(), "wallet authorized accounts");
        Ok(accounts)
    }
}

fn to_accounts(raw: Vec<String>) -> Vec<Account> {
    raw.into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(Account)
        .collect()
}

fn classify(err: ProviderRpcError) -> MintError {
    match err.code {
        USER_REJECTED | UNAUTHORIZED => MintError::AuthorizationDenied(err.message),
        UNSUPPORTED_METHOD => MintError::WalletUnavailable,
        _ => MintError::Transport(err.message),
    }
}
