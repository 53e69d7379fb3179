// RECORDS
// Content-hash records. Routable only from protocol version 1 on.

use crate::msgs::AppMsg;
use crate::namespaces;
use serde::{Deserialize, Serialize};
use vela_core::{Address, AppError, Context, Event, Handler, HandlerResult, Msg, Querier};
use vela_store::KeyBuilder;

pub const ROUTE: &str = "record";
pub const CODESPACE: &str = "record";

pub const MAX_DESCRIPTION_LEN: usize = 280;
const CONTENT_HASH_LEN: usize = 32;

const TAG_RECORD: u8 = 0x01;

/// Error codes under the `record` codespace.
const CODE_INVALID_HASH: u32 = 1;
const CODE_DUPLICATE: u32 = 2;
const CODE_DESCRIPTION: u32 = 3;
const CODE_NOT_FOUND: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub owner: Address,
    pub content_hash: String,
    pub description: String,
    pub height: u64,
}

pub fn validate_record(content_hash: &str, description: &str) -> Result<(), AppError> {
    // lowercase only, so one digest maps to one record key
    let hex_ok = match hex::decode(content_hash) {
        Ok(raw) => raw.len() == CONTENT_HASH_LEN && hex::encode(&raw) == content_hash,
        Err(_) => false,
    };
    if !hex_ok {
        return Err(AppError::module(CODESPACE, CODE_INVALID_HASH, format!("invalid content hash {:?}", content_hash)));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(AppError::module(
            CODESPACE,
            CODE_DESCRIPTION,
            format!("description longer than {} bytes", MAX_DESCRIPTION_LEN),
        ));
    }
    Ok(())
}

fn record_key(content_hash: &str) -> Vec<u8> {
    KeyBuilder::new(namespaces::RECORD).tag(TAG_RECORD).var(content_hash.as_bytes()).build()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordKeeper;

impl RecordKeeper {
    pub fn record(&self, ctx: &mut Context<'_>, content_hash: &str) -> Result<Option<Record>, AppError> {
        ctx.get_value(&record_key(content_hash))
    }

    pub fn create(&self, ctx: &mut Context<'_>, record: &Record) -> Result<(), AppError> {
        let key = record_key(&record.content_hash);
        if ctx.has(&key)? {
            return Err(AppError::module(
                CODESPACE,
                CODE_DUPLICATE,
                format!("record {} already exists", record.content_hash),
            ));
        }
        ctx.set_value(key, record)
    }
}

pub struct RecordHandler {
    keeper: RecordKeeper,
}

impl RecordHandler {
    pub fn new(keeper: RecordKeeper) -> Self {
        RecordHandler { keeper }
    }
}

impl Handler<AppMsg> for RecordHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &AppMsg) -> Result<HandlerResult, AppError> {
        let AppMsg::CreateRecord(create) = msg else {
            return Err(AppError::UnknownRequest(format!("unrecognized record message: {}", msg.msg_type())));
        };
        let record = Record {
            owner: create.owner,
            content_hash: create.content_hash.clone(),
            description: create.description.clone(),
            height: ctx.block_height(),
        };
        self.keeper.create(ctx, &record)?;
        ctx.emit_event(Event::new("create_record").attr("owner", record.owner).attr("hash", &record.content_hash));
        Ok(HandlerResult::with_data(record.content_hash.into_bytes()))
    }
}

pub struct RecordQuerier {
    keeper: RecordKeeper,
}

impl RecordQuerier {
    pub fn new(keeper: RecordKeeper) -> Self {
        RecordQuerier { keeper }
    }
}

impl Querier for RecordQuerier {
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], _data: &[u8]) -> Result<Vec<u8>, AppError> {
        match path {
            ["record", hash] => {
                let record = self
                    .keeper
                    .record(ctx, hash)?
                    .ok_or_else(|| AppError::module(CODESPACE, CODE_NOT_FOUND, format!("record {} not found", hash)))?;
                serde_json::to_vec(&record).map_err(|e| AppError::Internal(e.to_string()))
            }
            _ => Err(AppError::UnknownRequest(format!("unknown record query: {}", path.join("/")))),
        }
    }
}
