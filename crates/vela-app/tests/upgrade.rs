// PROTOCOL UPGRADE INTEGRATION TESTS
//
// Test Coverage:
// - Tally below threshold records a failed VersionInfo and keeps version 0
// - Tally above threshold switches to version 1 from the next block
// - A v1-only message is UnknownRequest before the switch and succeeds after
// - Queries at pre-switch heights go through the v0 query router
// - Only the upgrade authority may submit, one proposal at a time
// - A restarted node reloads the persisted protocol version
// - A node without the persisted version refuses to start

mod common;

use common::*;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use vela_app::record::Record;
use vela_app::{AppMsg, ProtocolV0};
use vela_core::{AppConfig, AppError, BaseApp, FatalError, ProtocolEngine};
use vela_store::{CommitStore, PruningOptions};
use vela_upgrade::{SignalSummary, UpgradeError, UpgradeInfo, VersionInfo};

const SWITCH_HEIGHT: u64 = 100;

fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Chain whose first `signalling` validators run a v1 binary, with an
/// upgrade to v1 proposed at height 2.
fn chain_with_proposal(powers: &[u64], signalling: usize, switch_height: u64) -> TestChain {
    let mut chain = TestChain::new(powers);
    for validator in chain.validators.iter_mut().take(signalling) {
        validator.running = 1;
    }
    let alice = alice();
    let tx = chain.sign(&alice, vec![software_upgrade(&alice, 1, switch_height, "0.75")], fee(0, DEFAULT_GAS));
    let res = chain.block(&[tx]).remove(0);
    assert!(res.is_ok(), "proposal rejected: {}", res.log);
    assert_eq!(res.data, 1u64.to_be_bytes().to_vec());
    chain
}

#[test_log::test]
fn test_upgrade_fails_below_threshold() {
    let mut chain = chain_with_proposal(&[25, 25, 25, 25], 2, SWITCH_HEIGHT);
    let info: UpgradeInfo = chain.query_json("custom/upgrade/info");
    assert_eq!(info.upgrade_config.map(|c| c.protocol.switch_height), Some(SWITCH_HEIGHT));

    chain.advance_to(SWITCH_HEIGHT - 1);
    let signals: SignalSummary = chain.query_json("custom/upgrade/signals/1");
    assert_eq!((signals.signal_power, signals.total_power), (50, 100));
    assert_eq!(signals.signal_ratio, "0.5".parse::<vela_upgrade::Dec>().unwrap());

    let height = chain.begin();
    let end = chain.finish(height).unwrap();
    let tally = end.events.iter().find(|e| e.kind == "upgrade" && e.get("tally").is_some()).expect("tally event");
    assert_eq!(tally.get("tally"), Some("failed"));
    assert_eq!(tally.get("signal_power"), Some("50"));

    let record: VersionInfo = chain.query_json("custom/upgrade/proposal/1");
    assert!(!record.success);
    let failed: Vec<VersionInfo> = chain.query_json("custom/upgrade/failed/1");
    assert_eq!(failed.len(), 1);
    assert_eq!(chain.app.current_version(), Some(0));

    let info: UpgradeInfo = chain.query_json("custom/upgrade/info");
    assert_eq!((info.current_version, info.last_failed_version), (0, Some(1)));
    assert!(info.upgrade_config.is_none());
    let signals: SignalSummary = chain.query_json("custom/upgrade/signals/1");
    assert!(signals.validators.is_empty());

    // still v0: records are not routable
    let alice = alice();
    let tx = chain.sign(&alice, vec![create_record(&alice, &content_hash(b"deed"))], fee(0, DEFAULT_GAS));
    let res = chain.block(&[tx]).remove(0);
    assert_eq!(res.code, AppError::UnknownRequest(String::new()).code());

    // a failed attempt leaves room for a new proposal
    let retry = chain.sign(&alice, vec![software_upgrade(&alice, 1, SWITCH_HEIGHT * 2, "0.75")], fee(0, DEFAULT_GAS));
    let res = chain.block(&[retry]).remove(0);
    assert!(res.is_ok(), "{}", res.log);
    assert_eq!(res.data, 2u64.to_be_bytes().to_vec());
}

#[test_log::test]
fn test_upgrade_switches_protocol_from_next_block() {
    let mut chain = chain_with_proposal(&[40, 40, 20], 2, SWITCH_HEIGHT);
    chain.advance_to(SWITCH_HEIGHT - 1);
    let signals: SignalSummary = chain.query_json("custom/upgrade/signals/1");
    assert_eq!((signals.signal_power, signals.total_power), (80, 100));
    assert_eq!(signals.signal_ratio.to_string(), "0.800000000000000000");

    let alice = alice();
    let hash = content_hash(b"deed");

    // the switch block itself still runs v0
    let height = chain.begin();
    assert_eq!(height, SWITCH_HEIGHT);
    let early = chain.sign(&alice, vec![create_record(&alice, &hash)], fee(0, DEFAULT_GAS));
    let res = chain.app.deliver_tx(&early).unwrap();
    assert_eq!(res.code, AppError::UnknownRequest(String::new()).code());

    let end = chain.app.end_block(vela_core::RequestEndBlock { height }).unwrap();
    let switch = end.events.iter().find(|e| e.kind == "upgrade" && e.get("switch").is_some()).expect("switch event");
    assert_eq!(switch.get("switch"), Some("1"));
    assert_eq!(chain.app.current_version(), Some(0));
    chain.app.commit().unwrap();
    assert_eq!(chain.app.current_version(), Some(1));

    let version: u64 = chain.query_json("app/version");
    assert_eq!(version, 1);
    let record: VersionInfo = chain.query_json("custom/upgrade/version/1");
    assert!(record.success);
    assert_eq!(record.upgrade_config.protocol.switch_height, SWITCH_HEIGHT);
    let info: UpgradeInfo = chain.query_json("custom/upgrade/info");
    assert_eq!(info.current_version, 1);
    assert!(info.upgrade_config.is_none());

    // the same message succeeds at switch height + 1
    let tx = chain.sign(&alice, vec![create_record(&alice, &hash)], fee(0, DEFAULT_GAS));
    let res = chain.block(&[tx]).remove(0);
    assert!(res.is_ok(), "{}", res.log);
    assert_eq!(chain.height(), SWITCH_HEIGHT + 1);

    let stored: Record = chain.query_json(&format!("custom/record/record/{}", hash));
    assert_eq!(stored.owner, alice.address());
    assert_eq!(stored.height, SWITCH_HEIGHT + 1);
    assert_eq!(chain.app.info().app_version, 1);
}

#[test_log::test]
fn test_pre_switch_heights_query_through_v0() {
    let mut chain = chain_with_proposal(&[40, 40, 20], 2, 10);
    chain.advance_to(10);
    assert_eq!(chain.app.current_version(), Some(1));

    let alice = alice();
    let hash = content_hash(b"deed");
    let tx = chain.sign(&alice, vec![create_record(&alice, &hash)], fee(0, DEFAULT_GAS));
    assert!(chain.block(&[tx]).remove(0).is_ok());

    let path = format!("custom/record/record/{}", hash);
    let old = chain.query_at(&path, 5);
    assert_eq!(old.code, AppError::UnknownRequest(String::new()).code());
    assert_eq!(old.codespace, "sdk");
    assert_eq!(old.height, 5);
    let version: u64 = serde_json::from_slice(&chain.query_at("app/version", 5).value).unwrap();
    assert_eq!(version, 0);

    // modules both versions share still answer at old heights
    let balance = chain.query_at(&format!("custom/bank/balances/{}", alice.address()), 5);
    assert!(balance.is_ok(), "{}", balance.log);

    let current = chain.query_at(&path, 0);
    assert!(current.is_ok(), "{}", current.log);
    let stored: Record = serde_json::from_slice(&current.value).unwrap();
    assert_eq!(stored.height, 11);
}

#[test_log::test]
fn test_upgrade_requires_authority_and_no_pending_config() {
    let mut chain = TestChain::new(&[10]);
    let (alice, bob) = (alice(), bob());

    let by_bob = chain.sign(&bob, vec![software_upgrade(&bob, 1, 50, "0.75")], fee(0, DEFAULT_GAS));
    let res = chain.block(&[by_bob]).remove(0);
    assert_eq!(res.codespace, vela_upgrade::CODESPACE);
    assert_eq!(res.code, UpgradeError::Unauthorized(String::new()).code());

    let skip = chain.sign(&alice, vec![software_upgrade(&alice, 2, 50, "0.75")], fee(0, DEFAULT_GAS));
    let res = chain.block(&[skip]).remove(0);
    assert_eq!(res.code, UpgradeError::InvalidVersion { expected: 1, got: 2 }.code());

    let first = chain.sign(&alice, vec![software_upgrade(&alice, 1, 50, "0.75")], fee(0, DEFAULT_GAS));
    assert!(chain.block(&[first]).remove(0).is_ok());
    let second = chain.sign(&alice, vec![software_upgrade(&alice, 1, 60, "0.75")], fee(0, DEFAULT_GAS));
    let res = chain.block(&[second]).remove(0);
    assert_eq!(res.code, UpgradeError::UpgradePending(1).code());
}

#[test_log::test]
fn test_restart_reloads_persisted_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.bin");
    let powers = [40, 40, 20];
    let switch_height = 6;

    {
        let store = CommitStore::open(&path, PruningOptions::default()).unwrap();
        let mut chain = TestChain::with(store, AppConfig::default(), &powers, -1);
        for validator in chain.validators.iter_mut().take(2) {
            validator.running = 1;
        }
        let alice = alice();
        let tx = chain.sign(&alice, vec![software_upgrade(&alice, 1, switch_height, "0.75")], fee(0, DEFAULT_GAS));
        assert!(chain.block(&[tx]).remove(0).is_ok());
        chain.advance_to(switch_height);
        assert_eq!(chain.app.current_version(), Some(1));
    }

    let store = CommitStore::open(&path, PruningOptions::default()).unwrap();
    let app = vela_app::new_app(store, AppConfig::default()).unwrap();
    assert_eq!(app.current_version(), Some(1));
    let info = app.info();
    assert_eq!((info.app_version, info.last_block_height), (1, switch_height));

    let mut chain = TestChain::resume(app, &powers);
    let alice = alice();
    let tx = chain.sign(&alice, vec![create_record(&alice, &content_hash(b"after restart"))], fee(0, DEFAULT_GAS));
    let res = chain.block(&[tx]).remove(0);
    assert!(res.is_ok(), "{}", res.log);
}

#[test_log::test]
fn test_node_without_persisted_version_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.bin");

    {
        let store = CommitStore::open(&path, PruningOptions::default()).unwrap();
        let mut chain = chain_with_store(store);
        chain.advance_to(4);
        assert_eq!(chain.app.current_version(), Some(1));
    }

    // a binary that only ships version 0
    let mut engine: ProtocolEngine<AppMsg> = ProtocolEngine::new();
    engine.add(Box::new(ProtocolV0::new(Arc::from(vec![0])))).unwrap();
    let store = CommitStore::open(&path, PruningOptions::default()).unwrap();
    let app = BaseApp::new(vela_app::APP_NAME, engine, store, AppConfig::default()).unwrap();
    assert!(matches!(app.load_latest_version(), Err(FatalError::UpgradeRequired(1))));
}

/// Upgrade to v1 at height 3 with every validator signalling.
fn chain_with_store(store: CommitStore) -> TestChain {
    let mut chain = TestChain::with(store, AppConfig::default(), &[10], -1);
    chain.validators[0].running = 1;
    let alice = alice();
    let tx = chain.sign(&alice, vec![software_upgrade(&alice, 1, 3, "0.5")], fee(0, DEFAULT_GAS));
    assert!(chain.block(&[tx]).remove(0).is_ok());
    chain
}
