// Upgrade-namespace records.
//
// Signals for one version form a contiguous prefix:
//   [ns][0x20][version u64][address 20B]

use vela_core::{Address, ProtocolVersion};
use vela_store::{KeyBuilder, Namespace};

pub const NAMESPACE: Namespace = Namespace(0x01);

const TAG_PROPOSAL_COUNTER: u8 = 0x01;
const TAG_VERSION_INFO: u8 = 0x10;
const TAG_SUCCESS_VERSION: u8 = 0x11;
const TAG_FAILED_VERSION: u8 = 0x12;
const TAG_SIGNAL: u8 = 0x20;

pub fn proposal_counter_key() -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_PROPOSAL_COUNTER).build()
}

/// proposal id -> VersionInfo
pub fn version_info_key(proposal_id: u64) -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_VERSION_INFO).u64(proposal_id).build()
}

/// successful version -> proposal id
pub fn success_version_key(version: ProtocolVersion) -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_SUCCESS_VERSION).u64(version).build()
}

/// (failed version, proposal id) -> proposal id
pub fn failed_version_key(version: ProtocolVersion, proposal_id: u64) -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_FAILED_VERSION).u64(version).u64(proposal_id).build()
}

pub fn failed_version_prefix(version: ProtocolVersion) -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_FAILED_VERSION).u64(version).build()
}

pub fn signal_key(version: ProtocolVersion, validator: &Address) -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_SIGNAL).u64(version).fixed(validator.as_bytes()).build()
}

pub fn signal_prefix(version: ProtocolVersion) -> Vec<u8> {
    KeyBuilder::new(NAMESPACE).tag(TAG_SIGNAL).u64(version).build()
}

/// Validator address encoded in a signal key.
pub fn address_from_signal_key(key: &[u8]) -> Option<Address> {
    let start = signal_prefix(0).len();
    key.get(start..).and_then(|raw| Address::from_slice(raw).ok())
}
