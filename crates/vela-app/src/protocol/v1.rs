//! Protocol version 1: everything in v0 plus content-hash records.

use super::{delegate_to_base, wiring, ProtocolBase};
use crate::msgs::AppMsg;
use crate::record::{self, RecordHandler, RecordQuerier};
use log::info;
use std::sync::Arc;
use vela_core::{FatalError, Protocol, ProtocolVersion, QueryRouter};

pub struct ProtocolV1 {
    base: ProtocolBase,
}

impl ProtocolV1 {
    pub const VERSION: ProtocolVersion = 1;

    pub fn new(supported: Arc<[ProtocolVersion]>) -> Self {
        ProtocolV1 { base: ProtocolBase::new(Self::VERSION, supported) }
    }
}

impl Protocol<AppMsg> for ProtocolV1 {
    delegate_to_base!();

    fn load_context(&mut self) -> Result<(), FatalError> {
        let query_router = self.build_query_router()?;
        self.base.wire(
            |keepers, router| {
                router.add_route(record::ROUTE, Box::new(RecordHandler::new(keepers.records)))?;
                Ok(())
            },
            query_router,
        )
    }

    fn build_query_router(&self) -> Result<QueryRouter, FatalError> {
        let mut query_router = self.base.common_query_router()?;
        query_router
            .add_route(record::ROUTE, Box::new(RecordQuerier::new(self.base.keepers().records)))
            .map_err(wiring)?;
        Ok(query_router)
    }

    fn init(&mut self) -> Result<(), FatalError> {
        // records start empty; there is no state to migrate
        info!("Protocol version {} enables the record module", Self::VERSION);
        Ok(())
    }
}
