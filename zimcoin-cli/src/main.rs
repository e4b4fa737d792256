use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;
use zimcoin_config::ZimcoinConfig;
use zimcoin_node::run_node;
use zimcoin_wallet::WalletStore;

#[derive(Parser)]
#[command(name = "zimcoin", version, about = "Zimcoin node and wallet CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        #[arg(long, default_value = "config/zimcoin.toml")]
        config: PathBuf,
    },
    /// Start the node
    Node {
        #[command(subcommand)]
        cmd: NodeCmd,
    },
    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        cmd: WalletCmd,
    },
}

#[derive(Subcommand)]
enum NodeCmd {
    Start {
        #[arg(long, default_value = "config/zimcoin.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum WalletCmd {
    New {
        #[arg(long, default_value = "default")]
        name: String,
        #[arg(long)]
        password: String,
    },
    List,
    /// Sign a transaction and print it as JSON (there is no RPC submission
    /// path yet; pipe the output to a node operator or the network layer).
    Send {
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value_t = 0)]
        fee: u64,
        #[arg(long)]
        nonce: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init { config } => init_config(config)?,
        Commands::Node { cmd } => match cmd {
            NodeCmd::Start { config } => {
                let rt = Runtime::new()?;
                rt.block_on(async move { run_node(config).await })?;
            }
        },
        Commands::Wallet { cmd } => match cmd {
            WalletCmd::New { name, password } => {
                let store = WalletStore::new(wallet_dir()?)?;
                let wallet = store.create(&name, &password)?;
                println!("created wallet {} address {}", wallet.name, zimcoin_crypto::address_to_string(&wallet.address));
            }
            WalletCmd::List => {
                let store = WalletStore::new(wallet_dir()?)?;
                for w in store.list()? {
                    println!("{} -> {}", w.name, zimcoin_crypto::address_to_string(&w.address));
                }
            }
            WalletCmd::Send { name, password, to, amount, fee, nonce } => {
                let store = WalletStore::new(wallet_dir()?)?;
                let wallet = store.load(&name)?;
                let recipient = zimcoin_crypto::address_from_string(&to)?;
                let tx = store.create_signed_transaction(&wallet, &password, recipient, amount, fee, nonce)?;
                println!("{}", serde_json::to_string_pretty(&tx)?);
            }
        },
    }
    Ok(())
}

fn init_config(path: PathBuf) -> Result<()> {
    if path.exists() {
        println!("config already exists at {:?}", path);
        return Ok(());
    }
    let cfg = ZimcoinConfig::example();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(&cfg)?)?;
    println!("wrote config to {:?}", path);
    Ok(())
}

fn wallet_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir().unwrap_or_else(std::env::temp_dir).join(".zimcoin").join("wallets");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
