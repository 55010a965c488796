mod config;

use clap::Parser;
use mp_api_types::{Account, MintError};
use mp_chain_rpc::{JsonRpcClient, RpcTransport, RpcWallet};
use mp_session::{MintNotifier, MintOrchestrator, MintedNotice};
use mp_wallet_provider::WalletProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Cli, Command, Links};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = cli.settings()?;

    let client = Arc::new(JsonRpcClient::new(&settings.rpc_url));
    let wallet = WalletProvider::new(Arc::new(RpcWallet::new(client.clone())));
    let transport = Arc::new(RpcTransport::new(
        client,
        settings.poll_interval,
        settings.confirm_timeout,
    ));
    let (notifier, mut notices) = MintNotifier::new();
    let orchestrator = MintOrchestrator::new(wallet, settings.contract.clone(), transport, notifier);
    info!(contract = %settings.contract.address(), rpc = %settings.rpc_url, "session started");

    match cli.command {
        Command::Status => match orchestrator.restore().await.map_err(surface)? {
            Some(account) => println!("Found an authorized account: {account}"),
            None => println!("No authorized account found"),
        },
        Command::Connect => {
            let account = ensure_connected(&orchestrator).await?;
            println!("Connected {account}");
        }
        Command::Mint { linger_secs } => {
            let account = ensure_connected(&orchestrator).await?;
            println!("Going to pop wallet now to pay gas for {account}...");

            let receipt = orchestrator.mint().await.map_err(surface)?;
            println!("Mined, see transaction: {}", settings.links.transaction(&receipt.hash));

            print_notices(&mut notices, &settings.links, &account, Some(Duration::from_secs(linger_secs))).await;
        }
        Command::Watch => {
            let account = ensure_connected(&orchestrator).await?;
            println!("Listening for mint events; press Ctrl-C to stop");
            print_notices(&mut notices, &settings.links, &account, None).await;
        }
    }

    Ok(())
}

async fn ensure_connected(orchestrator: &MintOrchestrator) -> anyhow::Result<Account> {
    if let Some(account) = orchestrator.restore().await.map_err(surface)? {
        return Ok(account);
    }
    orchestrator.connect().await.map_err(surface)
}

/// Prints notices until `linger` elapses, or until Ctrl-C when `linger` is `None`.
async fn print_notices(
    notices: &mut mpsc::UnboundedReceiver<MintedNotice>,
    links: &Links,
    account: &Account,
    linger: Option<Duration>,
) {
    let deadline = async {
        match linger {
            Some(linger) => tokio::time::sleep(linger).await,
            None => {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for Ctrl-C: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Some(notice) => println!("{}", describe(&notice, links, account)),
                None => break,
            },
            _ = &mut deadline => break,
        }
    }
}

fn describe(notice: &MintedNotice, links: &Links, account: &Account) -> String {
    let whose = if notice.account.as_str().eq_ignore_ascii_case(account.as_str()) {
        "your"
    } else {
        "an"
    };

    match (notice.token_id, &notice.tx_hash) {
        (Some(token_id), _) => format!(
            "Minted {whose} NFT #{token_id}. It can take a few minutes to show up: {}",
            links.token(token_id)
        ),
        (None, Some(hash)) => format!("Minted {whose} NFT in {}", links.transaction(hash)),
        (None, None) => format!("Minted {whose} NFT"),
    }
}

fn surface(err: MintError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}
