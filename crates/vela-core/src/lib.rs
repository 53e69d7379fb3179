// Vela core: the versioned protocol registry and the transaction processing
// pipeline every protocol version plugs into.

pub mod abci;
pub mod baseapp;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod gas;
pub mod keys;
pub mod protocol;
pub mod router;
pub mod tx;
pub mod types;

pub use abci::*;
pub use baseapp::BaseApp;
pub use config::AppConfig;
pub use context::{Context, RunTxMode};
pub use engine::ProtocolEngine;
pub use error::{AppError, FatalError, ROOT_CODESPACE};
pub use gas::{Gas, GasMeter, KvGasConfig};
pub use protocol::{AnteHandler, FeeRefundHandler, Protocol};
pub use router::{Handler, HandlerResult, Querier, QueryRouter, RouteError, Router};
pub use tx::{sign_bytes, BincodeCodec, Codec, Fee, Msg, StdSignature, Tx};
pub use types::{Address, Coin, Coins, Event, Header, ProtocolVersion};
