// TRANSACTION PROCESSING PIPELINE
// Drives InitChain -> (BeginBlock -> DeliverTx* -> EndBlock -> Commit)* and
// runs CheckTx / Simulate beside it, delegating decode, ante, routing and
// block hooks to the current protocol.
//
// SAFETY INVARIANTS:
// 1. Deliver and check state each own a separate arena over the committed
//    root; nothing written in one is visible to the other before Commit
// 2. A transaction's message writes land all together or not at all
// 3. Gas spent is never refunded by the pipeline, even when the tx fails
// 4. Once the block gas meter is full, every later DeliverTx in the block
//    fails with out-of-gas
// 5. The current protocol only changes inside Commit, so a whole block is
//    executed under one version
// 6. Lock order is engine -> block -> check -> store

use crate::abci::{
    ConsensusParams, ExportedState, RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery,
    ResponseBeginBlock, ResponseCommit, ResponseEndBlock, ResponseInfo, ResponseInitChain, ResponseQuery,
    TxResponse,
};
use crate::config::AppConfig;
use crate::context::{Context, RunTxMode};
use crate::engine::{read_current_version, ProtocolEngine};
use crate::error::{AppError, FatalError};
use crate::gas::{Gas, GasMeter};
use crate::keys;
use crate::protocol::Protocol;
use crate::tx::{Msg, Tx};
use crate::types::{Coins, Event, Header, ProtocolVersion};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use vela_store::{CacheArena, CommitId, CommitStore, LayerId, StoreError, Tree};

/// One mode's view: a private arena over the committed root and the header
/// handlers see.
struct ExecState {
    arena: CacheArena,
    header: Header,
}

impl ExecState {
    fn new(root: Arc<Tree>, header: Header) -> Self {
        ExecState { arena: CacheArena::new(root), header }
    }
}

#[derive(Default)]
struct BlockState {
    deliver: Option<ExecState>,
    gas_meter: Option<GasMeter>,
    pending_activation: Option<ProtocolVersion>,
}

struct TxOutcome {
    result: Result<(Vec<u8>, String, Vec<Event>), AppError>,
    gas_used: Gas,
}

impl TxOutcome {
    fn failed(err: AppError, gas_used: Gas) -> Self {
        TxOutcome { result: Err(err), gas_used }
    }

    fn into_response(self, gas_wanted: Gas) -> TxResponse {
        match self.result {
            Ok((data, log, events)) => TxResponse {
                code: 0,
                codespace: String::new(),
                data,
                log,
                gas_wanted,
                gas_used: self.gas_used,
                events,
            },
            Err(err) => TxResponse::from_error(&err, gas_wanted, self.gas_used),
        }
    }
}

#[derive(Serialize)]
struct MsgLog<'a> {
    msg_index: usize,
    log: &'a str,
}

pub struct BaseApp<M: Msg> {
    name: String,
    engine: RwLock<ProtocolEngine<M>>,
    block: Mutex<BlockState>,
    check_state: Mutex<Option<ExecState>>,
    store: RwLock<CommitStore>,
    config: AppConfig,
    min_gas_prices: Coins,
}

impl<M: Msg> BaseApp<M> {
    pub fn new(
        name: &str,
        engine: ProtocolEngine<M>,
        store: CommitStore,
        config: AppConfig,
    ) -> Result<Self, FatalError> {
        let min_gas_prices = config.min_gas_prices()?;
        Ok(BaseApp {
            name: name.to_string(),
            engine: RwLock::new(engine),
            block: Mutex::new(BlockState::default()),
            check_state: Mutex::new(None),
            store: RwLock::new(store),
            config,
            min_gas_prices,
        })
    }

    /// Loads the protocol version recorded in the latest committed root and,
    /// on a chain that already has blocks, opens check state over it.
    pub fn load_latest_version(&self) -> Result<ProtocolVersion, FatalError> {
        let mut engine = self.engine.write();
        let (root, last) = {
            let store = self.store.read();
            (store.latest(), store.last_commit_id())
        };

        let (found, version) = engine.load_current_protocol_from_store(&root)?;
        if !found {
            error!("Committed state at height {} requires protocol version {}", last.version, version);
            return Err(FatalError::UpgradeRequired(version));
        }

        if last.version > 0 {
            let chain_id = match root.get(&keys::chain_id_key()) {
                Some(raw) => bincode::deserialize::<String>(raw)
                    .map_err(|e| FatalError::Store(StoreError::Corrupt(format!("chain id: {}", e))))?,
                None => String::new(),
            };
            let header = Header { chain_id, height: last.version, ..Default::default() };
            *self.check_state.lock() = Some(ExecState::new(root, header));
        }

        info!("{} loaded at height {} with protocol version {}", self.name, last.version, version);
        Ok(version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_commit_id(&self) -> CommitId {
        self.store.read().last_commit_id()
    }

    pub fn current_version(&self) -> Option<ProtocolVersion> {
        self.engine.read().current_version()
    }

    pub fn supported_versions(&self) -> Vec<ProtocolVersion> {
        self.engine.read().versions()
    }

    pub fn info(&self) -> ResponseInfo {
        let last = self.last_commit_id();
        ResponseInfo {
            data: self.name.clone(),
            app_version: self.current_version().unwrap_or(0),
            last_block_height: last.version,
            last_block_app_hash: last.hash,
        }
    }

    // ---------------------------------------------------------------------
    // Block lifecycle
    // ---------------------------------------------------------------------

    pub fn init_chain(&self, req: RequestInitChain) -> Result<ResponseInitChain, FatalError> {
        let engine = self.engine.read();
        let protocol = engine.current_protocol()?;
        let version = protocol.version();

        let max_gas = req.consensus_params.block.max_gas;
        if max_gas < -1 {
            return Err(FatalError::InvalidMaxBlockGas(max_gas));
        }

        let mut block = self.block.lock();
        let root = {
            let store = self.store.read();
            if store.last_commit_id().version != 0 || block.deliver.is_some() {
                return Err(FatalError::OutOfOrder("InitChain"));
            }
            store.latest()
        };

        let header = Header { chain_id: req.chain_id.clone(), time: req.time, app_version: version, ..Default::default() };
        let mut state = ExecState::new(root, header);

        let response = {
            let mut ctx = Context::new(&mut state.arena, LayerId::ROOT, &state.header, RunTxMode::Deliver);
            let genesis = |e: AppError| FatalError::Genesis(e.to_string());
            ctx.set_value(keys::chain_id_key(), &req.chain_id).map_err(genesis)?;
            ctx.set_value(keys::consensus_params_key(), &req.consensus_params).map_err(genesis)?;
            ctx.set_value(keys::current_version_key(), &version).map_err(genesis)?;
            protocol.init_chainer(&mut ctx, &req).map_err(genesis)?
        };

        *self.check_state.lock() = Some(ExecState { arena: state.arena.clone(), header: state.header.clone() });
        block.deliver = Some(state);

        info!("Initialized chain {} under protocol version {}", req.chain_id, version);
        Ok(response)
    }

    pub fn begin_block(&self, req: RequestBeginBlock) -> Result<ResponseBeginBlock, FatalError> {
        let engine = self.engine.read();
        let protocol = engine.current_protocol()?;

        let mut block = self.block.lock();
        let (root, last) = {
            let store = self.store.read();
            (store.latest(), store.last_commit_id())
        };
        let expected = last.version + 1;
        if req.header.height != expected {
            return Err(FatalError::InvalidHeight { expected, got: req.header.height });
        }

        let state = block.deliver.get_or_insert_with(|| ExecState::new(root, req.header.clone()));
        state.header = req.header.clone();

        let params = match state.arena.get(LayerId::ROOT, &keys::consensus_params_key())? {
            Some(raw) => bincode::deserialize::<ConsensusParams>(&raw)
                .map_err(|e| FatalError::Store(StoreError::Corrupt(format!("consensus params: {}", e))))?,
            None => ConsensusParams::default(),
        };
        if params.block.max_gas < -1 {
            return Err(FatalError::InvalidMaxBlockGas(params.block.max_gas));
        }

        let events = {
            let mut ctx = Context::new(&mut state.arena, LayerId::ROOT, &state.header, RunTxMode::Deliver);
            protocol
                .begin_blocker(&mut ctx, &req)
                .map_err(|e| FatalError::BlockHook(format!("begin block {}: {}", req.header.height, e)))?;
            ctx.take_events()
        };
        block.gas_meter = Some(GasMeter::for_block(params.block.max_gas));

        if let Some(check) = self.check_state.lock().as_mut() {
            check.header = req.header.clone();
        }

        debug!("Began block {}", req.header.height);
        Ok(ResponseBeginBlock { events })
    }

    pub fn end_block(&self, req: RequestEndBlock) -> Result<ResponseEndBlock, FatalError> {
        let engine = self.engine.read();
        let protocol = engine.current_protocol()?;

        let mut block = self.block.lock();
        let block = &mut *block;
        let state = block.deliver.as_mut().ok_or(FatalError::OutOfOrder("EndBlock"))?;

        let mut ctx = Context::new(&mut state.arena, LayerId::ROOT, &state.header, RunTxMode::Deliver);
        let mut response = protocol
            .end_blocker(&mut ctx, &req)
            .map_err(|e| FatalError::BlockHook(format!("end block {}: {}", req.height, e)))?;
        response.events.extend(ctx.take_events());

        if let Some(version) = ctx.take_scheduled_activation() {
            info!("Protocol version {} scheduled to activate after block {}", version, req.height);
            block.pending_activation = Some(version);
        }
        Ok(response)
    }

    /// Persists deliver state, rebuilds check state over the new root and
    /// applies any activation the end-blocker scheduled.
    pub fn commit(&self) -> Result<ResponseCommit, FatalError> {
        let mut engine = self.engine.write();
        let mut block = self.block.lock();

        let state = block.deliver.take().ok_or(FatalError::OutOfOrder("Commit"))?;
        block.gas_meter = None;
        let pending = block.pending_activation.take();
        let header = state.header;
        let changeset = state.arena.into_changeset()?;

        let (commit_id, root) = {
            let mut store = self.store.write();
            let commit_id = store.commit(changeset)?;
            (commit_id, store.latest())
        };
        *self.check_state.lock() = Some(ExecState::new(root, header));

        if let Some(version) = pending {
            if !engine.activate(version)? {
                error!("Block {} switched the chain to protocol version {}, which this binary lacks", commit_id.version, version);
                return Err(FatalError::UpgradeRequired(version));
            }
        }

        debug!("Committed height {} app hash {}", commit_id.version, commit_id.hash_hex());

        let halt = self.config.halt_height;
        if halt > 0 && commit_id.version >= halt {
            error!("Halting at height {} per configured halt height", commit_id.version);
            return Err(FatalError::HaltHeight(commit_id.version));
        }

        Ok(ResponseCommit { height: commit_id.version, app_hash: commit_id.hash })
    }

    // ---------------------------------------------------------------------
    // Transaction execution
    // ---------------------------------------------------------------------

    pub fn check_tx(&self, tx_bytes: &[u8]) -> Result<TxResponse, FatalError> {
        self.run_tx_bytes(RunTxMode::Check, tx_bytes)
    }

    pub fn deliver_tx(&self, tx_bytes: &[u8]) -> Result<TxResponse, FatalError> {
        self.run_tx_bytes(RunTxMode::Deliver, tx_bytes)
    }

    /// Estimates gas and result of encoded tx bytes without keeping any write.
    pub fn simulate(&self, tx_bytes: &[u8]) -> Result<TxResponse, FatalError> {
        self.run_tx_bytes(RunTxMode::Simulate, tx_bytes)
    }

    /// Simulates an already decoded transaction.
    pub fn simulate_tx(&self, tx: &Tx<M>) -> Result<TxResponse, FatalError> {
        let engine = self.engine.read();
        let protocol = engine.current_protocol()?;
        let tx_len = match protocol.codec().encode_tx(tx) {
            Ok(bytes) => bytes.len(),
            Err(err) => return Ok(TxResponse::from_error(&err, tx.fee.gas, 0)),
        };
        self.run_tx(protocol, RunTxMode::Simulate, tx, tx_len)
    }

    fn run_tx_bytes(&self, mode: RunTxMode, tx_bytes: &[u8]) -> Result<TxResponse, FatalError> {
        let engine = self.engine.read();
        let protocol = engine.current_protocol()?;
        let tx = match protocol.codec().decode_tx(tx_bytes) {
            Ok(tx) => tx,
            Err(err) => return Ok(TxResponse::from_error(&err, 0, 0)),
        };
        self.run_tx(protocol, mode, &tx, tx_bytes.len())
    }

    fn run_tx(
        &self,
        protocol: &dyn Protocol<M>,
        mode: RunTxMode,
        tx: &Tx<M>,
        tx_len: usize,
    ) -> Result<TxResponse, FatalError> {
        let gas_wanted = tx.fee.gas;
        if let Err(err) = tx.validate_basic() {
            return Ok(TxResponse::from_error(&err, gas_wanted, 0));
        }

        match mode {
            RunTxMode::Deliver => {
                let mut block = self.block.lock();
                let block = &mut *block;
                let state = block.deliver.as_mut().ok_or(FatalError::OutOfOrder("DeliverTx"))?;
                let meter = block.gas_meter.as_mut().ok_or(FatalError::OutOfOrder("DeliverTx"))?;

                if meter.is_out_of_gas() {
                    let err = AppError::OutOfGas {
                        descriptor: "block gas meter".to_string(),
                        limit: meter.limit().unwrap_or(Gas::MAX),
                        consumed: meter.consumed(),
                    };
                    return Ok(TxResponse::from_error(&err, gas_wanted, 0));
                }

                let outcome = self.execute(protocol, state, LayerId::ROOT, mode, tx, tx_len, meter.remaining());
                meter.consume_saturating(outcome.gas_used);
                Ok(outcome.into_response(gas_wanted))
            }
            RunTxMode::Check => {
                let mut check = self.check_state.lock();
                let state = check.as_mut().ok_or(FatalError::OutOfOrder("CheckTx"))?;
                Ok(self.execute(protocol, state, LayerId::ROOT, mode, tx, tx_len, None).into_response(gas_wanted))
            }
            RunTxMode::Simulate => {
                let mut check = self.check_state.lock();
                let state = check.as_mut().ok_or(FatalError::OutOfOrder("Simulate"))?;
                let scratch = state.arena.branch(LayerId::ROOT)?;
                let outcome = self.execute(protocol, state, scratch, mode, tx, tx_len, None);
                state.arena.discard(scratch)?;
                Ok(outcome.into_response(gas_wanted))
            }
        }
    }

    /// Runs ante, messages and fee refund for one transaction in layers
    /// branched from `parent`. Ante effects survive a message failure.
    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        protocol: &dyn Protocol<M>,
        state: &mut ExecState,
        parent: LayerId,
        mode: RunTxMode,
        tx: &Tx<M>,
        tx_len: usize,
        block_remaining: Option<Gas>,
    ) -> TxOutcome {
        let mut ctx = Context::new(&mut state.arena, parent, &state.header, mode);
        if mode == RunTxMode::Check {
            ctx = ctx.with_min_gas_prices(self.min_gas_prices.clone());
        }

        let mut ante_ran = false;
        if let Some(ante) = protocol.ante_handler() {
            if let Err(err) = run_in_layer(&mut ctx, parent, |ctx| ante.ante(ctx, tx, tx_len, mode == RunTxMode::Simulate)) {
                return TxOutcome::failed(err, ctx.gas_meter().consumed());
            }
            ante_ran = true;
        }

        let msgs_result = run_in_layer(&mut ctx, parent, |ctx| {
            let output = run_msgs(protocol, ctx, tx)?;
            let consumed = ctx.gas_meter().consumed();
            if let Some(remaining) = block_remaining {
                if consumed > remaining {
                    return Err(AppError::OutOfGas {
                        descriptor: "block gas meter".to_string(),
                        limit: remaining,
                        consumed,
                    });
                }
            }
            Ok(output)
        });
        let gas_used = ctx.gas_meter().consumed();

        if ante_ran && mode != RunTxMode::Simulate {
            if let Some(refunder) = protocol.fee_refund_handler() {
                let metered = ctx.set_gas_meter(GasMeter::infinite());
                if let Err(err) = run_in_layer(&mut ctx, parent, |ctx| refunder.refund(ctx, tx, gas_used)) {
                    warn!("Fee refund failed: {}", err);
                }
                ctx.set_gas_meter(metered);
            }
        }

        match msgs_result {
            Ok((data, log)) => TxOutcome { result: Ok((data, log, ctx.take_events())), gas_used },
            Err(err) => TxOutcome::failed(err, gas_used),
        }
    }

    // ---------------------------------------------------------------------
    // Queries & export
    // ---------------------------------------------------------------------

    pub fn query(&self, req: &RequestQuery) -> ResponseQuery {
        let parts: Vec<&str> = req.path.split('/').filter(|p| !p.is_empty()).collect();
        let (root, height) = {
            let store = self.store.read();
            let height = if req.height == 0 { store.last_commit_id().version } else { req.height };
            match store.at_version(height) {
                Ok(root) => (root, height),
                Err(err) => {
                    return ResponseQuery::from_error(&AppError::InvalidRequest(err.to_string()), height);
                }
            }
        };

        let result = match parts.as_slice() {
            ["app", "version"] => version_at(&root)
                .and_then(|version| serde_json::to_vec(&version).map_err(|e| AppError::Internal(e.to_string()))),
            ["store"] => Ok(root.get(&req.data).cloned().unwrap_or_default()),
            ["custom", module, rest @ ..] => self.query_custom(root, height, module, rest, &req.data),
            _ => Err(AppError::UnknownRequest(format!("unknown query path: {}", req.path))),
        };

        match result {
            Ok(value) => ResponseQuery { key: req.data.clone(), value, height, ..Default::default() },
            Err(err) => ResponseQuery::from_error(&err, height),
        }
    }

    /// Serves a module query through the protocol that `root` records as
    /// current, which is not necessarily the one running now.
    fn query_custom(
        &self,
        root: Arc<Tree>,
        height: u64,
        module: &str,
        path: &[&str],
        data: &[u8],
    ) -> Result<Vec<u8>, AppError> {
        let version = version_at(&root)?;
        let engine = self.engine.read();
        let detached;
        let router = if engine.current_version() == Some(version) {
            engine.current_protocol().map_err(|e| AppError::Internal(e.to_string()))?.query_router()
        } else {
            let protocol = engine.protocol(version).ok_or_else(|| {
                AppError::InvalidRequest(format!("height {} ran protocol version {}, which this binary lacks", height, version))
            })?;
            debug!("Serving query at height {} through protocol version {}", height, version);
            detached = protocol.build_query_router().map_err(|e| AppError::Internal(e.to_string()))?;
            &detached
        };
        let querier = router
            .route(module)
            .ok_or_else(|| AppError::UnknownRequest(format!("no query route for module {}", module)))?;

        let mut arena = CacheArena::new(root);
        let header = Header { height, app_version: version, ..Default::default() };
        let mut ctx = Context::new(&mut arena, LayerId::ROOT, &header, RunTxMode::Check);
        querier.query(&mut ctx, path, data)
    }

    /// Exports the latest committed state through the current protocol.
    pub fn export_state(&self, for_zero_height: bool, jail_whitelist: &[String]) -> Result<ExportedState, FatalError> {
        let engine = self.engine.read();
        let protocol = engine.current_protocol()?;
        let (root, last) = {
            let store = self.store.read();
            (store.latest(), store.last_commit_id())
        };

        let mut arena = CacheArena::new(root);
        let header = Header { height: last.version, app_version: protocol.version(), ..Default::default() };
        let mut ctx = Context::new(&mut arena, LayerId::ROOT, &header, RunTxMode::Deliver);
        let mut exported = protocol
            .export_app_state_and_validators(&mut ctx, for_zero_height, jail_whitelist)
            .map_err(|e| FatalError::Export(e.to_string()))?;
        exported.height = last.version;
        Ok(exported)
    }
}

/// Protocol version recorded in a committed root; a root without the record
/// ran version 0.
fn version_at(root: &Tree) -> Result<ProtocolVersion, AppError> {
    Ok(read_current_version(root).map_err(|e| AppError::Internal(e.to_string()))?.unwrap_or(0))
}

/// Runs `f` in a fresh child of `parent`, flushing on success and
/// discarding on failure. The context is left pointing at `parent`.
fn run_in_layer<T>(
    ctx: &mut Context<'_>,
    parent: LayerId,
    f: impl FnOnce(&mut Context<'_>) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let layer = ctx.branch(parent)?;
    ctx.set_layer(layer);
    let result = f(ctx);
    ctx.set_layer(parent);
    match result {
        Ok(value) => {
            ctx.flush(layer)?;
            Ok(value)
        }
        Err(err) => {
            ctx.discard(layer)?;
            Err(err)
        }
    }
}

/// Routes and runs every message, each in its own child layer. Any failure
/// aborts the rest; the caller discards the enclosing layer.
fn run_msgs<M: Msg>(
    protocol: &dyn Protocol<M>,
    ctx: &mut Context<'_>,
    tx: &Tx<M>,
) -> Result<(Vec<u8>, String), AppError> {
    let msgs_layer = ctx.layer();
    let mut data = Vec::new();
    let mut logs = Vec::with_capacity(tx.msgs.len());

    for (index, msg) in tx.msgs.iter().enumerate() {
        let handler = protocol
            .router()
            .route(msg.route())
            .ok_or_else(|| AppError::UnknownRequest(format!("unrecognized message route: {}", msg.route())))?;

        let result = run_in_layer(ctx, msgs_layer, |ctx| handler.handle(ctx, msg))?;
        data.extend_from_slice(&result.data);
        logs.push((index, result.log));
    }

    let entries: Vec<MsgLog<'_>> = logs.iter().map(|(i, log)| MsgLog { msg_index: *i, log }).collect();
    let log = serde_json::to_string(&entries).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((data, log))
}
