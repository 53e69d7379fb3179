// EXECUTION CONTEXT
// Everything a handler may touch while running: one cache layer of the mode's
// arena, the block header, the gas meter and the event log.
//
// SAFETY INVARIANTS:
// 1. All store access goes through the context and is charged to its gas meter
// 2. The context never outlives the arena it borrows
// 3. A context only ever sees the arena of its own mode

use crate::error::AppError;
use crate::gas::{Gas, GasMeter, KvGasConfig};
use crate::types::{Coins, Event, Header, ProtocolVersion};
use serde::de::DeserializeOwned;
use serde::Serialize;
use vela_store::{CacheArena, LayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTxMode {
    Check,
    Deliver,
    Simulate,
}

pub struct Context<'a> {
    store: &'a mut CacheArena,
    layer: LayerId,
    header: &'a Header,
    mode: RunTxMode,
    gas_meter: GasMeter,
    gas_config: KvGasConfig,
    min_gas_prices: Coins,
    events: Vec<Event>,
    scheduled_activation: Option<ProtocolVersion>,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut CacheArena, layer: LayerId, header: &'a Header, mode: RunTxMode) -> Self {
        Context {
            store,
            layer,
            header,
            mode,
            gas_meter: GasMeter::infinite(),
            gas_config: KvGasConfig::default(),
            min_gas_prices: Coins::empty(),
            events: Vec::new(),
            scheduled_activation: None,
        }
    }

    pub fn with_min_gas_prices(mut self, prices: Coins) -> Self {
        self.min_gas_prices = prices;
        self
    }

    pub fn header(&self) -> &Header {
        self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn chain_id(&self) -> &str {
        &self.header.chain_id
    }

    pub fn mode(&self) -> RunTxMode {
        self.mode
    }

    pub fn is_check_tx(&self) -> bool {
        self.mode == RunTxMode::Check
    }

    pub fn is_simulate(&self) -> bool {
        self.mode == RunTxMode::Simulate
    }

    pub fn min_gas_prices(&self) -> &Coins {
        &self.min_gas_prices
    }

    // --- gas ---

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas_meter
    }

    pub fn set_gas_meter(&mut self, meter: GasMeter) -> GasMeter {
        std::mem::replace(&mut self.gas_meter, meter)
    }

    pub fn consume_gas(&mut self, amount: Gas, descriptor: &str) -> Result<(), AppError> {
        self.gas_meter.consume(amount, descriptor)
    }

    // --- layers ---

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn set_layer(&mut self, layer: LayerId) {
        self.layer = layer;
    }

    /// Opens a child of `parent` in this context's arena.
    pub fn branch(&mut self, parent: LayerId) -> Result<LayerId, AppError> {
        Ok(self.store.branch(parent)?)
    }

    pub fn flush(&mut self, layer: LayerId) -> Result<(), AppError> {
        Ok(self.store.flush(layer)?)
    }

    pub fn discard(&mut self, layer: LayerId) -> Result<(), AppError> {
        Ok(self.store.discard(layer)?)
    }

    // --- store access ---

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, AppError> {
        self.gas_meter.consume(self.gas_config.read_cost_flat, "ReadFlat")?;
        let value = self.store.get(self.layer, key)?;
        if let Some(value) = &value {
            let per_byte = self.gas_config.read_cost_per_byte.saturating_mul(value.len() as Gas);
            self.gas_meter.consume(per_byte, "ReadPerByte")?;
        }
        Ok(value)
    }

    pub fn has(&mut self, key: &[u8]) -> Result<bool, AppError> {
        self.gas_meter.consume(self.gas_config.has_cost, "Has")?;
        Ok(self.store.has(self.layer, key)?)
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), AppError> {
        self.gas_meter.consume(self.gas_config.write_cost_flat, "WriteFlat")?;
        let per_byte = self.gas_config.write_cost_per_byte.saturating_mul(value.len() as Gas);
        self.gas_meter.consume(per_byte, "WritePerByte")?;
        Ok(self.store.set(self.layer, key, value)?)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), AppError> {
        self.gas_meter.consume(self.gas_config.delete_cost, "Delete")?;
        Ok(self.store.delete(self.layer, key)?)
    }

    pub fn iter_prefix(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, AppError> {
        let entries = self.store.iter_prefix(self.layer, prefix)?;
        for (_, value) in &entries {
            self.gas_meter.consume(self.gas_config.iter_next_cost_flat, "IterNextFlat")?;
            let per_byte = self.gas_config.read_cost_per_byte.saturating_mul(value.len() as Gas);
            self.gas_meter.consume(per_byte, "ValuePerByte")?;
        }
        Ok(entries)
    }

    /// Typed read of a bincode value.
    pub fn get_value<T: DeserializeOwned>(&mut self, key: &[u8]) -> Result<Option<T>, AppError> {
        match self.get(key)? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_value<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), AppError> {
        let raw = bincode::serialize(value)?;
        self.set(key, raw)
    }

    // --- events & lifecycle effects ---

    pub fn emit_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Asks the pipeline to switch the current protocol once this block commits.
    pub fn schedule_activation(&mut self, version: ProtocolVersion) {
        self.scheduled_activation = Some(version);
    }

    pub fn take_scheduled_activation(&mut self) -> Option<ProtocolVersion> {
        self.scheduled_activation.take()
    }
}
