use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

use vela_app::GenesisState;
use vela_core::FatalError;
use vela_root::{init_if_fresh, open_app, query, replay_blocks, BlockFile, GenesisDoc, NodeConfig, ReplayError};

#[derive(Parser)]
#[command(name = "vela")]
#[command(version, about = "Vela validator node", long_about = None)]
struct Cli {
    /// Node home directory (config/app.toml, genesis and state live here)
    #[arg(long, default_value = ".vela")]
    home: PathBuf,

    /// Log filter, overrides `log_level` from app.toml. RUST_LOG wins over both.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default app.toml and an empty genesis file
    Init {
        #[arg(long)]
        chain_id: Option<String>,

        /// Replace an existing app.toml
        #[arg(long)]
        overwrite: bool,
    },

    /// Replay a JSON block file against the persisted state
    Start {
        #[arg(long)]
        blocks: PathBuf,
    },

    /// List the protocol versions compiled into this binary
    Versions,

    /// Query committed state, e.g. `custom/bank/balances/<address>`
    Query {
        path: String,

        /// Hex request data (the full key for `store` queries)
        #[arg(long, default_value = "")]
        data: String,

        /// 0 queries the latest height
        #[arg(long, default_value_t = 0)]
        height: u64,
    },

    /// Export application state and validators as a genesis document
    Export {
        #[arg(long)]
        for_zero_height: bool,

        /// Operator addresses whose validators keep their power
        #[arg(long, value_delimiter = ',')]
        jail_whitelist: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = NodeConfig::load(&cli.home)?;
    if let Some(level) = &cli.log_level {
        cfg.log_level = level.clone();
    }
    vela_root::init_logging(&cfg.log_level);

    match cli.command {
        Commands::Init { chain_id, overwrite } => {
            if let Some(chain_id) = chain_id {
                cfg.chain_id = chain_id;
            }
            let path = cfg.write(overwrite)?;
            info!("Wrote {}", path.display());

            let genesis_path = cfg.genesis_path();
            if genesis_path.exists() {
                info!("Keeping existing genesis {}", genesis_path.display());
            } else {
                let doc = GenesisDoc::new(&cfg.chain_id, &GenesisState::default())?;
                fs::write(&genesis_path, serde_json::to_vec_pretty(&doc)?)
                    .with_context(|| format!("failed to write {}", genesis_path.display()))?;
                info!("Wrote {}", genesis_path.display());
            }
        }
        Commands::Start { blocks } => {
            let app = open_app(&cfg)?;
            let genesis = GenesisDoc::load(&cfg.genesis_path())?;
            init_if_fresh(&app, &genesis, &cfg.chain_id)?;

            let file = BlockFile::load(&blocks)?;
            info!("Replaying {} blocks from {}", file.blocks.len(), blocks.display());
            match replay_blocks(&app, &file, &cfg.chain_id) {
                Ok(summary) => info!(
                    "Replay finished at height {} ({} blocks, {} skipped, {} txs, {} failed), app hash {}",
                    summary.last_height,
                    summary.blocks,
                    summary.skipped,
                    summary.txs,
                    summary.failed_txs,
                    hex::encode(summary.app_hash)
                ),
                Err(ReplayError::Fatal(FatalError::HaltHeight(height))) => {
                    info!("Node halted at configured height {}", height);
                }
                Err(err) => {
                    error!("Replay stopped: {}", err);
                    return Err(err.into());
                }
            }
        }
        Commands::Versions => {
            for version in vela_app::SUPPORTED_VERSIONS {
                println!("{}", version);
            }
            if cfg.state_path().exists() {
                let app = open_app(&cfg)?;
                let info = app.info();
                println!("active: {} at height {}", info.app_version, info.last_block_height);
            }
        }
        Commands::Query { path, data, height } => {
            let data = hex::decode(&data).context("--data must be hex")?;
            let app = open_app(&cfg)?;
            let res = query(&app, &path, data, height);
            if !res.is_ok() {
                bail!("query failed (codespace {}, code {}): {}", res.codespace, res.code, res.log);
            }
            match serde_json::from_slice::<serde_json::Value>(&res.value) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{}", hex::encode(&res.value)),
            }
        }
        Commands::Export { for_zero_height, jail_whitelist } => {
            let app = open_app(&cfg)?;
            let exported = app.export_state(for_zero_height, &jail_whitelist)?;
            let doc = GenesisDoc {
                chain_id: cfg.chain_id.clone(),
                genesis_time: 0,
                consensus_params: Default::default(),
                validators: exported.validators,
                app_state: exported.app_state,
            };
            info!("Exported state at height {}", exported.height);
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
    }

    Ok(())
}
