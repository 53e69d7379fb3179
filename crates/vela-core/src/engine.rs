// PROTOCOL ENGINE
// Registry of every protocol version this binary supports, plus the single
// version that chain state says is current.
//
// SAFETY INVARIANTS:
// 1. Versions are registered strictly as 0, 1, 2, ... with no gaps
// 2. A registered protocol is never removed or replaced
// 3. `current` always names a registered version once a protocol is loaded
// 4. Only the current version is wired; inactive versions hold no keeper state

use crate::error::FatalError;
use crate::keys;
use crate::protocol::Protocol;
use crate::tx::Msg;
use crate::types::ProtocolVersion;
use log::{info, warn};
use std::collections::BTreeMap;
use vela_store::Tree;

pub struct ProtocolEngine<M: Msg> {
    protocols: BTreeMap<ProtocolVersion, Box<dyn Protocol<M>>>,
    current: Option<ProtocolVersion>,
    next: ProtocolVersion,
}

impl<M: Msg> ProtocolEngine<M> {
    pub fn new() -> Self {
        ProtocolEngine { protocols: BTreeMap::new(), current: None, next: 0 }
    }

    /// Registers the next expected version. Call at process start only.
    pub fn add(&mut self, protocol: Box<dyn Protocol<M>>) -> Result<(), FatalError> {
        let version = protocol.version();
        if version != self.next {
            return Err(FatalError::OutOfSequence { version, expected: self.next });
        }
        self.protocols.insert(version, protocol);
        self.next += 1;
        info!("Registered protocol version {}", version);
        Ok(())
    }

    /// Wires `version` and makes it current.
    pub fn load_protocol(&mut self, version: ProtocolVersion) -> Result<(), FatalError> {
        let protocol = self
            .protocols
            .get_mut(&version)
            .ok_or(FatalError::UnknownProtocolVersion(version))?;
        protocol.load_context()?;
        self.current = Some(version);
        info!("Loaded protocol version {}", version);
        Ok(())
    }

    /// Loads whatever version the committed root records as current.
    ///
    /// Returns `(found, version)`. `found == false` means the chain expects a
    /// version this binary does not ship; nothing is loaded in that case. A
    /// root with no version record (fresh chain) reads as version 0.
    pub fn load_current_protocol_from_store(
        &mut self,
        root: &Tree,
    ) -> Result<(bool, ProtocolVersion), FatalError> {
        let version = read_current_version(root)?.unwrap_or(0);
        if !self.protocols.contains_key(&version) {
            warn!("Chain state expects protocol version {}, which is not registered", version);
            return Ok((false, version));
        }
        self.load_protocol(version)?;
        Ok((true, version))
    }

    /// Switches to `version` mid-run, running its one-time init hook first.
    /// Returns false, changing nothing, if the version is unknown.
    pub fn activate(&mut self, version: ProtocolVersion) -> Result<bool, FatalError> {
        let Some(protocol) = self.protocols.get_mut(&version) else {
            warn!("Refusing to activate unknown protocol version {}", version);
            return Ok(false);
        };
        protocol.init()?;
        protocol.load_context()?;
        let previous = self.current.replace(version);
        info!("Activated protocol version {} (was {:?})", version, previous);
        Ok(true)
    }

    pub fn current_protocol(&self) -> Result<&dyn Protocol<M>, FatalError> {
        let version = self.current.ok_or(FatalError::NoProtocolLoaded)?;
        self.protocols
            .get(&version)
            .map(|p| p.as_ref())
            .ok_or(FatalError::UnknownProtocolVersion(version))
    }

    /// Any registered version, wired or not.
    pub fn protocol(&self, version: ProtocolVersion) -> Option<&dyn Protocol<M>> {
        self.protocols.get(&version).map(|p| p.as_ref())
    }

    pub fn current_version(&self) -> Option<ProtocolVersion> {
        self.current
    }

    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.protocols.contains_key(&version)
    }

    pub fn versions(&self) -> Vec<ProtocolVersion> {
        self.protocols.keys().copied().collect()
    }

    /// Next version `add` expects.
    pub fn next_version(&self) -> ProtocolVersion {
        self.next
    }
}

impl<M: Msg> Default for ProtocolEngine<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads the persisted current-version record from a committed root.
pub fn read_current_version(root: &Tree) -> Result<Option<ProtocolVersion>, FatalError> {
    match root.get(&keys::current_version_key()) {
        Some(raw) => bincode::deserialize(raw)
            .map(Some)
            .map_err(|e| FatalError::Store(vela_store::StoreError::Corrupt(format!("current version: {}", e)))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abci::{ExportedState, RequestEndBlock, RequestInitChain, ResponseEndBlock, ResponseInitChain};
    use crate::context::Context;
    use crate::error::AppError;
    use crate::protocol::AnteHandler;
    use crate::router::{QueryRouter, Router};
    use crate::tx::{BincodeCodec, Codec};
    use crate::types::Address;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Nop;

    impl Msg for Nop {
        fn route(&self) -> &'static str {
            "nop"
        }
        fn msg_type(&self) -> &'static str {
            "nop"
        }
        fn validate_basic(&self) -> Result<(), AppError> {
            Ok(())
        }
        fn signers(&self) -> Vec<Address> {
            Vec::new()
        }
    }

    struct Stub {
        version: ProtocolVersion,
        loads: usize,
        inits: usize,
        codec: BincodeCodec<Nop>,
        router: Router<Nop>,
        query_router: QueryRouter,
    }

    impl Stub {
        fn boxed(version: ProtocolVersion) -> Box<dyn Protocol<Nop>> {
            Box::new(Stub {
                version,
                loads: 0,
                inits: 0,
                codec: BincodeCodec::new(),
                router: Router::new(),
                query_router: QueryRouter::new(),
            })
        }
    }

    impl Protocol<Nop> for Stub {
        fn version(&self) -> ProtocolVersion {
            self.version
        }
        fn load_context(&mut self) -> Result<(), FatalError> {
            self.loads += 1;
            Ok(())
        }
        fn init(&mut self) -> Result<(), FatalError> {
            self.inits += 1;
            Ok(())
        }
        fn codec(&self) -> &dyn Codec<Nop> {
            &self.codec
        }
        fn router(&self) -> &Router<Nop> {
            &self.router
        }
        fn query_router(&self) -> &QueryRouter {
            &self.query_router
        }
        fn build_query_router(&self) -> Result<QueryRouter, FatalError> {
            Ok(QueryRouter::new())
        }
        fn ante_handler(&self) -> Option<&dyn AnteHandler<Nop>> {
            None
        }
        fn init_chainer(&self, _: &mut Context<'_>, _: &RequestInitChain) -> Result<ResponseInitChain, AppError> {
            Ok(ResponseInitChain::default())
        }
        fn end_blocker(&self, _: &mut Context<'_>, _: &RequestEndBlock) -> Result<ResponseEndBlock, AppError> {
            Ok(ResponseEndBlock::default())
        }
        fn export_app_state_and_validators(
            &self,
            _: &mut Context<'_>,
            _: bool,
            _: &[String],
        ) -> Result<ExportedState, AppError> {
            Ok(ExportedState::default())
        }
    }

    #[test]
    fn test_add_is_strictly_sequential() {
        let mut engine = ProtocolEngine::<Nop>::new();
        assert!(matches!(
            engine.add(Stub::boxed(1)),
            Err(FatalError::OutOfSequence { version: 1, expected: 0 })
        ));
        engine.add(Stub::boxed(0)).unwrap();
        assert!(engine.add(Stub::boxed(0)).is_err());
        assert!(engine.add(Stub::boxed(2)).is_err());
        engine.add(Stub::boxed(1)).unwrap();
        assert_eq!(engine.versions(), vec![0, 1]);
        assert_eq!(engine.next_version(), 2);
    }

    #[test]
    fn test_load_unknown_version_is_fatal() {
        let mut engine = ProtocolEngine::<Nop>::new();
        engine.add(Stub::boxed(0)).unwrap();
        assert!(matches!(engine.load_protocol(3), Err(FatalError::UnknownProtocolVersion(3))));
        assert!(matches!(engine.current_protocol(), Err(FatalError::NoProtocolLoaded)));
    }

    #[test]
    fn test_load_from_store() {
        let mut engine = ProtocolEngine::<Nop>::new();
        engine.add(Stub::boxed(0)).unwrap();
        engine.add(Stub::boxed(1)).unwrap();

        let mut root = Tree::new();
        assert_eq!(engine.load_current_protocol_from_store(&root).unwrap(), (true, 0));

        root.insert(keys::current_version_key(), bincode::serialize(&1u64).unwrap());
        assert_eq!(engine.load_current_protocol_from_store(&root).unwrap(), (true, 1));
        assert_eq!(engine.current_protocol().unwrap().version(), 1);

        root.insert(keys::current_version_key(), bincode::serialize(&5u64).unwrap());
        assert_eq!(engine.load_current_protocol_from_store(&root).unwrap(), (false, 5));
        assert_eq!(engine.current_version(), Some(1));
    }

    #[test]
    fn test_activate() {
        let mut engine = ProtocolEngine::<Nop>::new();
        engine.add(Stub::boxed(0)).unwrap();
        engine.add(Stub::boxed(1)).unwrap();
        engine.load_protocol(0).unwrap();

        assert!(!engine.activate(7).unwrap());
        assert_eq!(engine.current_version(), Some(0));

        assert!(engine.activate(1).unwrap());
        assert_eq!(engine.current_version(), Some(1));
        assert!(engine.supports(1));
        assert_eq!(engine.protocol(0).map(|p| p.version()), Some(0));
        assert!(engine.protocol(2).is_none());
    }
}
