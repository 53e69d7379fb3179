// PROTOCOL CONTRACT
// One immutable bundle of "the rules for version N".
//
// SAFETY INVARIANTS:
// 1. version() is constant for the lifetime of the value
// 2. Routers and handlers exist only after load_context(); an unwired
//    protocol reports no routes
// 3. build_query_router() leaves the protocol itself unwired; the router it
//    returns is dropped once the query is served
// 4. init() runs at most once per process, on mid-run activation only

use crate::abci::{ExportedState, RequestBeginBlock, RequestEndBlock, RequestInitChain, ResponseEndBlock, ResponseInitChain};
use crate::context::Context;
use crate::error::{AppError, FatalError};
use crate::router::{QueryRouter, Router};
use crate::tx::{Codec, Msg, Tx};
use crate::types::ProtocolVersion;

/// Authenticates a transaction, deducts its fee and attaches its gas meter.
pub trait AnteHandler<M: Msg>: Send + Sync {
    /// `tx_len` is the encoded size, charged as gas. With `simulate` set,
    /// signatures are not verified and the gas meter is unbounded.
    fn ante(&self, ctx: &mut Context<'_>, tx: &Tx<M>, tx_len: usize, simulate: bool) -> Result<(), AppError>;
}

/// Returns the unused part of a fee once execution is over.
pub trait FeeRefundHandler<M: Msg>: Send + Sync {
    fn refund(&self, ctx: &mut Context<'_>, tx: &Tx<M>, gas_used: u64) -> Result<(), AppError>;
}

pub trait Protocol<M: Msg>: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    /// Builds keepers and routers. Called whenever this version becomes current.
    fn load_context(&mut self) -> Result<(), FatalError>;

    /// One-off migration hook, run before load_context() when activated mid-run.
    fn init(&mut self) -> Result<(), FatalError> {
        Ok(())
    }

    fn codec(&self) -> &dyn Codec<M>;

    fn router(&self) -> &Router<M>;

    fn query_router(&self) -> &QueryRouter;

    /// Fresh query router for this version, usable whether or not it is
    /// current. Serves queries at heights this version was current at.
    fn build_query_router(&self) -> Result<QueryRouter, FatalError>;

    fn ante_handler(&self) -> Option<&dyn AnteHandler<M>>;

    fn fee_refund_handler(&self) -> Option<&dyn FeeRefundHandler<M>> {
        None
    }

    fn init_chainer(&self, ctx: &mut Context<'_>, req: &RequestInitChain) -> Result<ResponseInitChain, AppError>;

    fn begin_blocker(&self, _ctx: &mut Context<'_>, _req: &RequestBeginBlock) -> Result<(), AppError> {
        Ok(())
    }

    fn end_blocker(&self, ctx: &mut Context<'_>, req: &RequestEndBlock) -> Result<ResponseEndBlock, AppError>;

    fn export_app_state_and_validators(
        &self,
        ctx: &mut Context<'_>,
        for_zero_height: bool,
        jail_whitelist: &[String],
    ) -> Result<ExportedState, AppError>;
}
