// Vela reference application.
//
// The modules a Vela chain ships with (accounts, balances, the genesis
// validator set, content records, upgrade governance) and the protocol
// versions that route them. Version 0 handles transfers and upgrade
// proposals; version 1 adds records.

pub mod ante;
pub mod auth;
pub mod bank;
pub mod client;
pub mod genesis;
pub mod gov;
pub mod msgs;
pub mod protocol;
pub mod record;
pub mod staking;

pub use genesis::GenesisState;
pub use msgs::AppMsg;
pub use protocol::{Keepers, ProtocolV0, ProtocolV1};

use std::sync::Arc;
use vela_core::{AppConfig, BaseApp, FatalError, ProtocolEngine, ProtocolVersion};
use vela_store::CommitStore;

pub const APP_NAME: &str = "vela";

/// Protocol versions compiled into this binary, in registration order.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 2] = [ProtocolV0::VERSION, ProtocolV1::VERSION];

/// Store namespaces owned by the reference modules. 0x00 and 0x01 belong to
/// the pipeline and the upgrade module.
pub mod namespaces {
    use vela_store::Namespace;

    pub const AUTH: Namespace = Namespace(0x02);
    pub const BANK: Namespace = Namespace(0x03);
    pub const STAKING: Namespace = Namespace(0x04);
    pub const RECORD: Namespace = Namespace(0x05);
    pub const GOV: Namespace = Namespace(0x06);
}

/// Registers every supported protocol version. Nothing is loaded yet.
pub fn build_engine() -> Result<ProtocolEngine<AppMsg>, FatalError> {
    let supported: Arc<[ProtocolVersion]> = Arc::from(SUPPORTED_VERSIONS.to_vec());
    let mut engine = ProtocolEngine::new();
    engine.add(Box::new(ProtocolV0::new(supported.clone())))?;
    engine.add(Box::new(ProtocolV1::new(supported)))?;
    Ok(engine)
}

/// Builds the application over `store` and loads the protocol version its
/// latest committed root records.
pub fn new_app(store: CommitStore, config: AppConfig) -> Result<BaseApp<AppMsg>, FatalError> {
    let app = BaseApp::new(APP_NAME, build_engine()?, store, config)?;
    app.load_latest_version()?;
    Ok(app)
}
