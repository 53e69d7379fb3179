// Vela validator node.
//
// Glue between the library crates and the `vela` binary. The binary only
// parses arguments; everything it runs lives here so tests can drive it.

pub mod config;
pub mod replay;

pub use config::{NodeConfig, NodeConfigError};
pub use replay::{init_if_fresh, replay_blocks, BlockEntry, BlockFile, GenesisDoc, ReplayError, ReplaySummary};

use anyhow::{Context as _, Result};
use std::fs;
use tracing_subscriber::EnvFilter;
use vela_app::AppMsg;
use vela_core::{BaseApp, RequestQuery, ResponseQuery};
use vela_store::CommitStore;

/// Installs the global tracing subscriber. `RUST_LOG` wins over
/// `default_level`; records from the `log` facade are forwarded too.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Opens the file-backed store named by `cfg` and loads the protocol version
/// its latest committed root records.
pub fn open_app(cfg: &NodeConfig) -> Result<BaseApp<AppMsg>> {
    let path = cfg.state_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let store = CommitStore::open(&path, cfg.app.pruning)
        .with_context(|| format!("failed to open state at {}", path.display()))?;
    let app = vela_app::new_app(store, cfg.app.clone())?;
    Ok(app)
}

/// Query against committed state. `height` 0 means the latest height.
pub fn query(app: &BaseApp<AppMsg>, path: &str, data: Vec<u8>, height: u64) -> ResponseQuery {
    app.query(&RequestQuery { path: path.to_string(), data, height, prove: false })
}
