//! Wires crypto, consensus, mining, storage and network together into a
//! running process, and owns the miner actor runtime.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use zimcoin_config::ZimcoinConfig;
use zimcoin_consensus::ChainState;
use zimcoin_core::{Address, Block};
use zimcoin_crypto::{address_from_string, DefaultCryptoProvider};
use zimcoin_network::{Libp2pNetwork, NetworkConfig as P2pConfig, NetworkEvent, NetworkService};
use zimcoin_storage::{BlockStore, SledBlockStore};

/// A dedicated OS thread that searches for a proof-of-work nonce against the
/// chain's current tip, submitting mined blocks back through `mined_tx`.
/// Mirrors the reference implementation's Thespian miner actor: told to
/// start/stop, and preempted whenever the node accepts a block that arrived
/// from the network first.
pub struct MinerHandle {
    abandon: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MinerHandle {
    pub fn start(
        chain: Arc<Mutex<ChainState>>,
        miner_address: Address,
        mined_tx: tokio::sync::mpsc::UnboundedSender<Block>,
    ) -> Self {
        let abandon = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_abandon = abandon.clone();
        let thread_shutdown = shutdown.clone();

        let thread = std::thread::spawn(move || loop {
            if thread_shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread_abandon.store(false, Ordering::Relaxed);

            let (previous, height, timestamp, difficulty) = {
                let state = chain.lock();
                let previous = state.longest_chain.last().map(|b| b.block_id).unwrap_or(zimcoin_core::GENESIS_PREVIOUS);
                let height = state.longest_chain.len() as u64;
                let difficulty = state.calculate_difficulty();
                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                (previous, height, timestamp, difficulty)
            };

            match zimcoin_mining::mine_block(previous, height, miner_address, vec![], timestamp, difficulty, &thread_abandon) {
                Ok(block) => {
                    if mined_tx.send(block).is_err() {
                        return;
                    }
                }
                Err(zimcoin_mining::MiningError::Cancelled) => continue,
            }
        });

        Self { abandon, shutdown, thread: Some(thread) }
    }

    /// Abandon whatever block is currently being searched for. The mining
    /// thread immediately moves on to the chain's new tip.
    pub fn preempt(&self) {
        self.abandon.store(true, Ordering::Relaxed);
    }

    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.abandon.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Runs the node until its network task exits. Accepts blocks from the
/// network, mines its own when configured to, and persists every accepted
/// block.
pub async fn run_node(config_path: PathBuf) -> Result<()> {
    init_logging();
    let cfg = ZimcoinConfig::load(&config_path)?;
    info!(?config_path, "starting zimcoin node");

    let store = Arc::new(SledBlockStore::open(&cfg.storage.data_dir)?);
    let crypto = DefaultCryptoProvider::new();
    let chain = Arc::new(Mutex::new(ChainState::new()));

    let mut network = Libp2pNetwork::new(P2pConfig {
        listen_addr: cfg.network.listen_addr.clone(),
        seed_nodes: cfg.network.seed_nodes.clone(),
    })?;
    let mut events = network.start().await?;

    let (mined_tx, mut mined_rx) = tokio::sync::mpsc::unbounded_channel();
    let miner = if cfg.mining.enabled {
        let miner_address = address_from_string(&cfg.mining.miner_address)?;
        Some(MinerHandle::start(chain.clone(), miner_address, mined_tx))
    } else {
        None
    };

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                if let NetworkEvent::Block(block) = event {
                    let accepted = {
                        let mut state = chain.lock();
                        state.verify_and_apply_block(block.clone(), &crypto)
                    };
                    match accepted {
                        Ok(()) => {
                            info!(height = block.height, "accepted block from network");
                            store.insert_block(&block).await?;
                            if let Some(miner) = &miner {
                                miner.preempt();
                            }
                        }
                        Err(err) => warn!(?err, "rejected block from network"),
                    }
                }
            }
            Some(block) = mined_rx.recv() => {
                let accepted = {
                    let mut state = chain.lock();
                    state.verify_and_apply_block(block.clone(), &crypto)
                };
                if accepted.is_ok() {
                    info!(height = block.height, "accepted locally mined block");
                    store.insert_block(&block).await?;
                    network.broadcast_block(&block).await?;
                }
            }
            else => break,
        }
    }

    if let Some(miner) = miner {
        miner.stop();
    }
    Ok(())
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
