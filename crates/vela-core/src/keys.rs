// Main-namespace records owned by the pipeline.

use vela_store::{KeyBuilder, Namespace};

const TAG_CURRENT_VERSION: u8 = 0x01;
const TAG_CONSENSUS_PARAMS: u8 = 0x02;
const TAG_UPGRADE_CONFIG: u8 = 0x03;
const TAG_LAST_FAILED_VERSION: u8 = 0x04;
const TAG_CHAIN_ID: u8 = 0x05;

fn main_key(tag: u8) -> Vec<u8> {
    KeyBuilder::new(Namespace::MAIN).tag(tag).build()
}

pub fn current_version_key() -> Vec<u8> {
    main_key(TAG_CURRENT_VERSION)
}

pub fn consensus_params_key() -> Vec<u8> {
    main_key(TAG_CONSENSUS_PARAMS)
}

/// Pending upgrade, written by the governance boundary.
pub fn upgrade_config_key() -> Vec<u8> {
    main_key(TAG_UPGRADE_CONFIG)
}

pub fn last_failed_version_key() -> Vec<u8> {
    main_key(TAG_LAST_FAILED_VERSION)
}

pub fn chain_id_key() -> Vec<u8> {
    main_key(TAG_CHAIN_ID)
}
