use anyhow::Context;
use clap::{Parser, Subcommand};
use mp_api_types::{TokenId, TxHash};
use mp_chain_rpc::DEFAULT_RPC_URL;
use mp_contract::ContractReference;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub(crate) const DEFAULT_CONTRACT: &str = "0x925Bf916Bb018dBaf6beD4e15eF63c5650ecc842";

#[derive(Parser, Debug)]
#[command(version, about = "Connect a wallet and mint from a deployed NFT contract")]
pub(crate) struct Cli {
    #[arg(long, env = "MINTPORT_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub(crate) rpc_url: String,

    #[arg(long, env = "MINTPORT_CONTRACT_ADDRESS", default_value = DEFAULT_CONTRACT)]
    pub(crate) contract: String,

    /// ABI array or compiler artifact containing an `abi` field.
    #[arg(long, env = "MINTPORT_ABI_PATH")]
    pub(crate) abi: PathBuf,

    #[arg(long, env = "MINTPORT_POLL_INTERVAL_MS", default_value_t = 2000)]
    pub(crate) poll_interval_ms: u64,

    /// 0 waits indefinitely.
    #[arg(long, env = "MINTPORT_CONFIRM_TIMEOUT_SECS", default_value_t = 600)]
    pub(crate) confirm_timeout_secs: u64,

    #[arg(long, env = "MINTPORT_EXPLORER_URL", default_value = "https://rinkeby.etherscan.io/tx")]
    pub(crate) explorer_url: String,

    #[arg(long, env = "MINTPORT_MARKETPLACE_URL", default_value = "https://testnets.opensea.io/assets")]
    pub(crate) marketplace_url: String,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Report an already-authorized account without prompting.
    Status,
    /// Ask the wallet to authorize an account.
    Connect,
    /// Mint one token and wait for it to be mined.
    Mint {
        /// How long to keep listening for the mint broadcast after confirmation.
        #[arg(long, default_value_t = 30)]
        linger_secs: u64,
    },
    /// Print every mint event until interrupted.
    Watch,
}

pub(crate) struct Settings {
    pub(crate) rpc_url: String,
    pub(crate) contract: ContractReference,
    pub(crate) poll_interval: Duration,
    pub(crate) confirm_timeout: Option<Duration>,
    pub(crate) links: Links,
}

impl Cli {
    /// Fails on an unreadable or invalid interface; nothing runs without one.
    pub(crate) fn settings(&self) -> anyhow::Result<Settings> {
        let abi = fs::read_to_string(&self.abi)
            .with_context(|| format!("failed to read ABI file {}", self.abi.display()))?;
        let contract = ContractReference::new(&self.contract, &abi)?;

        Ok(Settings {
            rpc_url: self.rpc_url.clone(),
            links: Links {
                explorer: self.explorer_url.trim_end_matches('/').to_owned(),
                marketplace: self.marketplace_url.trim_end_matches('/').to_owned(),
                contract: contract.address().to_string(),
            },
            contract,
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            confirm_timeout: (self.confirm_timeout_secs > 0)
                .then(|| Duration::from_secs(self.confirm_timeout_secs)),
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Links {
    explorer: String,
    marketplace: String,
    contract: String,
}

impl Links {
    pub(crate) fn transaction(&self, hash: &TxHash) -> String {
        format!("{}/{}", self.explorer, hash)
    }

    pub(crate) fn token(&self, token_id: TokenId) -> String {
        format!("{}/{}/{}", self.marketplace, self.contract, token_id)
    }
}
