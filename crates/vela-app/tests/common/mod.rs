// Shared chain driver for the vela-app integration tests.
//
// Drives a BaseApp through InitChain and complete blocks the way a consensus
// engine would, with a fixed set of funded accounts and genesis validators.

#![allow(dead_code)]

use vela_app::auth::Account;
use vela_app::client::{encode_tx, sign_tx, SignerInfo, TxSigner};
use vela_app::genesis::{GenesisAccount, GenesisValidator, UpgradeGenesis};
use vela_app::msgs::{MsgCreateRecord, MsgSend, MsgSoftwareUpgrade};
use vela_app::{new_app, AppMsg, GenesisState};
use vela_core::{
    Address, AppConfig, BaseApp, BlockParams, Coins, ConsensusParams, Fee, FatalError, Header, ProtocolVersion,
    RequestBeginBlock, RequestEndBlock, RequestInitChain, RequestQuery, ResponseEndBlock, ResponseQuery, TxResponse,
};
use vela_store::{CommitStore, PruningOptions};
use vela_upgrade::{Dec, SoftwareUpgradeProposal};

pub const CHAIN_ID: &str = "vela-test";
pub const DENOM: &str = "uvela";
pub const GENESIS_BALANCE: u64 = 1_000_000;
pub const DEFAULT_GAS: u64 = 200_000;

pub fn alice() -> TxSigner {
    TxSigner::from_seed([1; 32])
}

pub fn bob() -> TxSigner {
    TxSigner::from_seed([2; 32])
}

/// Never funded at genesis.
pub fn carol() -> TxSigner {
    TxSigner::from_seed([3; 32])
}

pub fn coins(amount: u64) -> Coins {
    Coins::single(DENOM, amount)
}

pub fn fee(amount: u64, gas: u64) -> Fee {
    Fee { amount: coins(amount), gas }
}

pub fn send(from: &TxSigner, to: Address, amount: u64) -> AppMsg {
    AppMsg::Send(MsgSend { from: from.address(), to, amount: coins(amount) })
}

pub fn create_record(owner: &TxSigner, content_hash: &str) -> AppMsg {
    AppMsg::CreateRecord(MsgCreateRecord {
        owner: owner.address(),
        content_hash: content_hash.to_string(),
        description: "title deed".to_string(),
    })
}

pub fn software_upgrade(authority: &TxSigner, version: ProtocolVersion, switch_height: u64, threshold: &str) -> AppMsg {
    AppMsg::SoftwareUpgrade(MsgSoftwareUpgrade {
        authority: authority.address(),
        proposal: SoftwareUpgradeProposal {
            title: format!("Upgrade to v{}", version),
            description: "enable records".to_string(),
            version,
            software: format!("vela-v{}", version),
            switch_height,
            threshold: threshold.parse::<Dec>().expect("threshold"),
        },
    })
}

pub struct TestValidator {
    pub key: TxSigner,
    pub power: u64,
    /// Protocol version the validator's binary reports when it proposes.
    pub running: ProtocolVersion,
}

impl TestValidator {
    pub fn consensus_address(&self) -> Address {
        self.key.address()
    }
}

pub fn validators(powers: &[u64]) -> Vec<TestValidator> {
    powers
        .iter()
        .enumerate()
        .map(|(i, power)| TestValidator { key: TxSigner::from_seed([100 + i as u8; 32]), power: *power, running: 0 })
        .collect()
}

pub fn genesis_state(validators: &[TestValidator]) -> GenesisState {
    GenesisState {
        accounts: vec![
            GenesisAccount { address: alice().address(), coins: coins(GENESIS_BALANCE) },
            GenesisAccount { address: bob().address(), coins: coins(GENESIS_BALANCE) },
        ],
        validators: validators
            .iter()
            .map(|v| GenesisValidator {
                operator: v.consensus_address(),
                pub_key: hex::encode(v.key.pub_key()),
                power: v.power,
            })
            .collect(),
        upgrade: UpgradeGenesis { authority: Some(alice().address()) },
    }
}

pub struct TestChain {
    pub app: BaseApp<AppMsg>,
    pub validators: Vec<TestValidator>,
}

impl TestChain {
    /// In-memory chain at height 1 (one empty block after genesis).
    pub fn new(powers: &[u64]) -> Self {
        Self::with(CommitStore::in_memory(PruningOptions { keep_recent: 0 }), AppConfig::default(), powers, -1)
    }

    pub fn with(store: CommitStore, config: AppConfig, powers: &[u64], max_gas: i64) -> Self {
        let app = new_app(store, config).expect("app");
        let validators = validators(powers);
        let genesis = genesis_state(&validators);
        app.init_chain(RequestInitChain {
            chain_id: CHAIN_ID.to_string(),
            time: 0,
            consensus_params: ConsensusParams { block: BlockParams { max_gas, ..Default::default() } },
            validators: Vec::new(),
            app_state_bytes: serde_json::to_vec(&genesis).expect("genesis json"),
        })
        .expect("init chain");

        let mut chain = TestChain { app, validators };
        chain.empty_block();
        chain
    }

    /// Wraps an app that was reopened over already committed state.
    pub fn resume(app: BaseApp<AppMsg>, powers: &[u64]) -> Self {
        TestChain { app, validators: validators(powers) }
    }

    pub fn height(&self) -> u64 {
        self.app.last_commit_id().version
    }

    fn header(&self, height: u64) -> Header {
        let proposer = &self.validators[(height as usize - 1) % self.validators.len()];
        Header {
            chain_id: CHAIN_ID.to_string(),
            height,
            time: height * 5,
            proposer: proposer.consensus_address(),
            app_version: proposer.running,
        }
    }

    pub fn begin(&self) -> u64 {
        let height = self.height() + 1;
        self.app
            .begin_block(RequestBeginBlock { header: self.header(height), last_commit_signers: Vec::new() })
            .expect("begin block");
        height
    }

    pub fn finish(&self, height: u64) -> Result<ResponseEndBlock, FatalError> {
        let end = self.app.end_block(RequestEndBlock { height })?;
        self.app.commit()?;
        Ok(end)
    }

    /// Runs one full block delivering `txs` in order.
    pub fn block(&mut self, txs: &[Vec<u8>]) -> Vec<TxResponse> {
        let height = self.begin();
        let responses = txs.iter().map(|tx| self.app.deliver_tx(tx).expect("deliver tx")).collect();
        self.finish(height).expect("finish block");
        responses
    }

    pub fn empty_block(&mut self) {
        self.block(&[]);
    }

    pub fn advance_to(&mut self, height: u64) {
        while self.height() < height {
            self.empty_block();
        }
    }

    pub fn query(&self, path: &str) -> ResponseQuery {
        self.query_at(path, 0)
    }

    pub fn query_at(&self, path: &str, height: u64) -> ResponseQuery {
        self.app.query(&RequestQuery { path: path.to_string(), height, ..Default::default() })
    }

    pub fn query_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> T {
        let res = self.query(path);
        assert!(res.is_ok(), "query {} failed: {}", path, res.log);
        serde_json::from_slice(&res.value).expect("query json")
    }

    pub fn account(&self, address: &Address) -> Account {
        self.query_json(&format!("custom/auth/account/{}", address))
    }

    pub fn balance(&self, address: &Address) -> u64 {
        let coins: Coins = self.query_json(&format!("custom/bank/balances/{}", address));
        coins.amount_of(DENOM)
    }

    /// Signs with the account state of the latest committed block.
    pub fn sign(&self, signer: &TxSigner, msgs: Vec<AppMsg>, fee: Fee) -> Vec<u8> {
        let account = self.account(&signer.address());
        self.sign_with(signer, account.account_number, account.sequence, msgs, fee)
    }

    pub fn sign_with(&self, signer: &TxSigner, account_number: u64, sequence: u64, msgs: Vec<AppMsg>, fee: Fee) -> Vec<u8> {
        let tx = sign_tx(CHAIN_ID, msgs, fee, "", &[SignerInfo { signer, account_number, sequence }]).expect("sign");
        encode_tx(&tx).expect("encode")
    }

    /// Gas a transaction consumes against the latest committed state.
    pub fn simulate_gas(&self, tx_bytes: &[u8]) -> u64 {
        let res = self.app.simulate(tx_bytes).expect("simulate");
        assert!(res.is_ok(), "simulation failed: {}", res.log);
        res.gas_used
    }
}
