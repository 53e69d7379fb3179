//! Protocol version 0: transfers and upgrade proposals.

use super::{delegate_to_base, ProtocolBase};
use crate::msgs::AppMsg;
use std::sync::Arc;
use vela_core::{FatalError, Protocol, ProtocolVersion, QueryRouter};

pub struct ProtocolV0 {
    base: ProtocolBase,
}

impl ProtocolV0 {
    pub const VERSION: ProtocolVersion = 0;

    pub fn new(supported: Arc<[ProtocolVersion]>) -> Self {
        ProtocolV0 { base: ProtocolBase::new(Self::VERSION, supported) }
    }
}

impl Protocol<AppMsg> for ProtocolV0 {
    delegate_to_base!();

    fn load_context(&mut self) -> Result<(), FatalError> {
        let query_router = self.build_query_router()?;
        self.base.wire(|_, _| Ok(()), query_router)
    }

    fn build_query_router(&self) -> Result<QueryRouter, FatalError> {
        self.base.common_query_router()
    }
}
