// REFERENCE PROTOCOLS
// Shared wiring for the protocol versions this binary ships. Each version
// owns a `ProtocolBase` and decides which routes it registers on top of the
// common ones.
//
// SAFETY INVARIANTS:
// 1. Routers are rebuilt from scratch on every load_context
// 2. Block hooks, genesis and export are identical across versions; only the
//    routed message set differs

mod v0;
mod v1;

pub use v0::ProtocolV0;
pub use v1::ProtocolV1;

use crate::ante::{AuthAnteHandler, FeeRefund};
use crate::auth::{AccountKeeper, AuthQuerier};
use crate::bank::{BankHandler, BankKeeper, BankQuerier};
use crate::genesis::{self, GenesisState};
use crate::gov::UpgradeProposalHandler;
use crate::msgs::AppMsg;
use crate::record::RecordKeeper;
use crate::staking::{StakingKeeper, StakingQuerier};
use crate::{auth, bank, gov, staking};
use std::sync::Arc;
use vela_core::{
    AppError, BincodeCodec, Context, ExportedState, FatalError, ProtocolVersion, QueryRouter, RequestEndBlock,
    RequestInitChain, ResponseEndBlock, ResponseInitChain, RouteError, Router,
};
use vela_upgrade::{UpgradeCoordinator, UpgradeKeeper, UpgradeQuerier};

/// Every keeper the reference modules use.
#[derive(Clone)]
pub struct Keepers {
    pub accounts: AccountKeeper,
    pub bank: BankKeeper,
    pub staking: StakingKeeper,
    pub records: RecordKeeper,
    pub upgrade: UpgradeCoordinator,
}

impl Keepers {
    pub fn new() -> Self {
        let accounts = AccountKeeper;
        let staking = StakingKeeper;
        Keepers {
            accounts,
            bank: BankKeeper::new(accounts),
            staking,
            records: RecordKeeper,
            upgrade: UpgradeCoordinator::new(UpgradeKeeper::new(), Arc::new(staking)),
        }
    }
}

impl Default for Keepers {
    fn default() -> Self {
        Self::new()
    }
}

fn wiring(err: RouteError) -> FatalError {
    FatalError::Wiring(err.to_string())
}

pub struct ProtocolBase {
    version: ProtocolVersion,
    supported: Arc<[ProtocolVersion]>,
    keepers: Keepers,
    codec: BincodeCodec<AppMsg>,
    router: Router<AppMsg>,
    query_router: QueryRouter,
    ante: AuthAnteHandler,
    refund: FeeRefund,
}

impl ProtocolBase {
    pub fn new(version: ProtocolVersion, supported: Arc<[ProtocolVersion]>) -> Self {
        let keepers = Keepers::new();
        ProtocolBase {
            version,
            supported,
            ante: AuthAnteHandler::new(keepers.accounts, keepers.bank),
            refund: FeeRefund::new(keepers.bank),
            keepers,
            codec: BincodeCodec::new(),
            router: Router::new(),
            query_router: QueryRouter::new(),
        }
    }

    pub fn keepers(&self) -> &Keepers {
        &self.keepers
    }

    /// Query modules every version serves.
    fn common_query_router(&self) -> Result<QueryRouter, FatalError> {
        let k = &self.keepers;
        let mut query_router = QueryRouter::new();
        query_router
            .add_route(auth::QUERY_ROUTE, Box::new(AuthQuerier::new(k.accounts)))
            .map_err(wiring)?
            .add_route(bank::ROUTE, Box::new(BankQuerier::new(k.bank)))
            .map_err(wiring)?
            .add_route(staking::QUERY_ROUTE, Box::new(StakingQuerier::new(k.staking)))
            .map_err(wiring)?
            .add_route(vela_upgrade::QUERY_ROUTE, Box::new(UpgradeQuerier::new(k.upgrade.clone())))
            .map_err(wiring)?;
        Ok(query_router)
    }

    /// Registers the message routes every version has, lets `extend` add the
    /// version-specific ones, and installs the version's `query_router`.
    fn wire(
        &mut self,
        extend: impl FnOnce(&Keepers, &mut Router<AppMsg>) -> Result<(), RouteError>,
        query_router: QueryRouter,
    ) -> Result<(), FatalError> {
        let k = &self.keepers;
        let mut router = Router::new();
        router
            .add_route(bank::ROUTE, Box::new(BankHandler::new(k.bank)))
            .map_err(wiring)?
            .add_route(gov::ROUTE, Box::new(UpgradeProposalHandler::new(*k.upgrade.keeper(), self.supported.clone())))
            .map_err(wiring)?;
        extend(k, &mut router).map_err(wiring)?;

        self.router = router;
        self.query_router = query_router;
        Ok(())
    }

    fn init_chainer(&self, ctx: &mut Context<'_>, req: &RequestInitChain) -> Result<ResponseInitChain, AppError> {
        let state = GenesisState::from_bytes(&req.app_state_bytes)?;
        let validators = genesis::init_genesis(ctx, &self.keepers, &state, &req.validators)?;
        Ok(ResponseInitChain { validators })
    }

    fn end_blocker(&self, ctx: &mut Context<'_>, _req: &RequestEndBlock) -> Result<ResponseEndBlock, AppError> {
        self.keepers.upgrade.end_blocker(ctx)?;
        Ok(ResponseEndBlock::default())
    }

    fn export(
        &self,
        ctx: &mut Context<'_>,
        for_zero_height: bool,
        jail_whitelist: &[String],
    ) -> Result<ExportedState, AppError> {
        let (state, validators) = genesis::export_genesis(ctx, &self.keepers, for_zero_height, jail_whitelist)?;
        let app_state = serde_json::to_value(&state).map_err(|e| AppError::Internal(format!("export: {}", e)))?;
        Ok(ExportedState { app_state, validators, height: ctx.block_height() })
    }
}

/// Implements the parts of `Protocol` that every version delegates to its base.
macro_rules! delegate_to_base {
    () => {
        fn version(&self) -> vela_core::ProtocolVersion {
            self.base.version
        }

        fn codec(&self) -> &dyn vela_core::Codec<crate::msgs::AppMsg> {
            &self.base.codec
        }

        fn router(&self) -> &vela_core::Router<crate::msgs::AppMsg> {
            &self.base.router
        }

        fn query_router(&self) -> &vela_core::QueryRouter {
            &self.base.query_router
        }

        fn ante_handler(&self) -> Option<&dyn vela_core::AnteHandler<crate::msgs::AppMsg>> {
            Some(&self.base.ante)
        }

        fn fee_refund_handler(&self) -> Option<&dyn vela_core::FeeRefundHandler<crate::msgs::AppMsg>> {
            Some(&self.base.refund)
        }

        fn init_chainer(
            &self,
            ctx: &mut vela_core::Context<'_>,
            req: &vela_core::RequestInitChain,
        ) -> Result<vela_core::ResponseInitChain, vela_core::AppError> {
            self.base.init_chainer(ctx, req)
        }

        fn end_blocker(
            &self,
            ctx: &mut vela_core::Context<'_>,
            req: &vela_core::RequestEndBlock,
        ) -> Result<vela_core::ResponseEndBlock, vela_core::AppError> {
            self.base.end_blocker(ctx, req)
        }

        fn export_app_state_and_validators(
            &self,
            ctx: &mut vela_core::Context<'_>,
            for_zero_height: bool,
            jail_whitelist: &[String],
        ) -> Result<vela_core::ExportedState, vela_core::AppError> {
            self.base.export(ctx, for_zero_height, jail_whitelist)
        }
    };
}
pub(crate) use delegate_to_base;
