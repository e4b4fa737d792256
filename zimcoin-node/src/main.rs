use std::path::PathBuf;
use zimcoin_node::run_node;

#[tokio::main]
async fn main() {
    let path = std::env::var("ZIMCOIN_CONFIG").unwrap_or_else(|_| "config/zimcoin.toml".to_string());
    if let Err(e) = run_node(PathBuf::from(path)).await {
        eprintln!("node failed: {e:?}");
    }
}
