//! Typed node configuration, loaded the way the ancestor's `DxidConfig` was:
//! a `File` source layered under a `ZIMCOIN__`-prefixed `Environment` source.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zimcoin_core::{BOOTSTRAP_DIFFICULTY, DIFFICULTY_RETARGET_WINDOW, TARGET_BLOCK_INTERVAL_SECS};

/// Consensus parameters are fixed by `zimcoin-core`; these fields exist so
/// tests and alternate test networks can override them, not for mainnet use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub bootstrap_difficulty: u128,
    pub target_block_interval_secs: u64,
    pub difficulty_retarget_window: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            bootstrap_difficulty: BOOTSTRAP_DIFFICULTY,
            target_block_interval_secs: TARGET_BLOCK_INTERVAL_SECS,
            difficulty_retarget_window: DIFFICULTY_RETARGET_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub listen_addr: String,
    pub seed_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    pub enabled: bool,
    pub miner_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZimcoinConfig {
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub mining: MiningConfig,
}

impl ZimcoinConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("ZIMCOIN").separator("__"));
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn example() -> Self {
        Self {
            consensus: ConsensusConfig::default(),
            network: NetworkConfig {
                listen_addr: "/ip4/0.0.0.0/tcp/7000".into(),
                seed_nodes: vec![],
            },
            storage: StorageConfig {
                data_dir: "./zimcoin-data".into(),
            },
            mining: MiningConfig {
                enabled: false,
                miner_address: "".into(),
            },
        }
    }
}
