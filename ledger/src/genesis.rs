//! Genesis configuration and block award schedule.
//!
//! The genesis block carries the chain configuration as JSON in the `desc` of its first coinbase
//! transaction. [GenesisBlock] parses it once and exposes the values the rest of the node reads
//! from it, including the award paid to the proposer of each block.

use crate::{block::Block, cache::Cache, Error};
use num_bigint::BigUint;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Consensus named by the genesis configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub miner: String,
}

/// Tokens credited to an address in the genesis block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Predistribution {
    pub address: String,
    pub quota: String,
}

/// Geometric decay of the block award.
///
/// The award is multiplied by `ratio` once every `height_gap` blocks. A gap of zero disables
/// decay.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardDecay {
    pub height_gap: i64,
    pub ratio: f64,
}

/// Resource prices charged to transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasPrice {
    pub cpu_rate: i64,
    pub mem_rate: i64,
    pub disk_rate: i64,
    pub xfee_rate: i64,
}

/// A contract invocation named by the genesis configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeRequest {
    pub module_name: String,
    pub contract_name: String,
    pub method_name: String,
    pub args: BTreeMap<String, String>,
}

/// Account allowed to deploy reserved contracts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservedWhitelist {
    pub account: String,
}

/// Chain configuration embedded in the genesis block.
///
/// Missing fields take their default value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    pub version: String,
    pub consensus: ConsensusConfig,
    #[serde(alias = "Predistribution")]
    pub predistribution: Vec<Predistribution>,
    /// Maximum block size in megabytes.
    #[serde(rename = "maxblocksize")]
    pub max_block_size: String,
    pub period: String,
    #[serde(rename = "nofee")]
    pub no_fee: bool,
    /// Base award, as a decimal string.
    pub award: String,
    pub award_decay: AwardDecay,
    pub gas_price: GasPrice,
    pub decimals: String,
    pub genesis_consensus: Option<Map<String, Value>>,
    pub reserved_contracts: Vec<InvokeRequest>,
    pub reserved_whitelist: ReservedWhitelist,
    pub forbidden_contract: InvokeRequest,
    /// Amount charged to create a contract account.
    pub new_account_resource_amount: i64,
    #[serde(rename = "irreversibleslidewindow")]
    pub irreversible_slide_window: String,
    pub group_chain_contract: InvokeRequest,
}

impl RootConfig {
    /// Parse a configuration, applying the `nofee` override.
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        let mut config: RootConfig = serde_json::from_slice(raw)?;
        if config.no_fee {
            config.award = "0".to_string();
            config.new_account_resource_amount = 0;
            config.predistribution.clear();
            config.gas_price = GasPrice::default();
        }
        Ok(config)
    }

    /// Maximum block size in bytes.
    pub fn max_block_size(&self) -> i64 {
        self.max_block_size.parse::<i64>().unwrap_or(0) << 20
    }

    /// Number of blocks after which a block can no longer be reverted.
    pub fn irreversible_slide_window(&self) -> i64 {
        self.irreversible_slide_window.parse().unwrap_or(0)
    }

    /// Base award, zero if unparseable.
    pub fn award(&self) -> BigUint {
        self.award.parse().unwrap_or_default()
    }

    /// Consensus configuration of the genesis block.
    ///
    /// Built from `consensus` and `period` when no explicit `genesis_consensus` is given.
    pub fn genesis_consensus(&self) -> Map<String, Value> {
        if let Some(explicit) = &self.genesis_consensus {
            return explicit.clone();
        }
        let mut synthesized = Map::new();
        synthesized.insert("name".to_string(), json!(self.consensus.kind));
        synthesized.insert(
            "config".to_string(),
            json!({ "miner": self.consensus.miner, "period": self.period }),
        );
        synthesized
    }
}

/// The genesis block and the configuration parsed from it.
pub struct GenesisBlock {
    block: Block,
    config: RootConfig,
    awards: Cache<i64, BigUint>,
}

impl GenesisBlock {
    /// Parse the configuration of `block`, which must contain a coinbase transaction.
    pub fn new(block: Block, award_cache_size: usize) -> Result<Self, Error> {
        let root_tx = block
            .transactions
            .iter()
            .find(|tx| tx.coinbase)
            .ok_or(Error::GenesisTxMissing)?;
        let config = RootConfig::parse(&root_tx.desc)?;
        Ok(Self {
            block,
            config,
            awards: Cache::new(award_cache_size),
        })
    }

    /// The genesis block, with its body.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The parsed configuration.
    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    /// Award paid to the proposer of the block at `height`.
    ///
    /// The base award is multiplied by the decay ratio once per elapsed period (in floating
    /// point) and rounded half away from zero.
    pub fn calc_award(&self, height: i64) -> BigUint {
        let award = self.config.award();
        let gap = self.config.award_decay.height_gap;
        if gap == 0 {
            return award;
        }
        let period = height / gap;
        if let Some(cached) = self.awards.get(&period) {
            return cached;
        }
        let mut real = award.to_f64().unwrap_or(0.0);
        for _ in 0..period {
            real *= self.config.award_decay.ratio;
        }
        let decayed = BigUint::from_f64(real.round()).unwrap_or_else(BigUint::zero);
        self.awards.put(period, decayed.clone());
        decayed
    }

    /// Sum of the coinbase outputs of the genesis block.
    pub fn coinbase_total(&self) -> BigUint {
        self.block.coinbase_total()
    }

    /// Maximum block size in bytes.
    pub fn max_block_size(&self) -> i64 {
        self.config.max_block_size()
    }

    /// Number of blocks after which a block can no longer be reverted.
    pub fn irreversible_slide_window(&self) -> i64 {
        self.config.irreversible_slide_window()
    }

    /// Amount charged to create a contract account.
    pub fn new_account_resource_amount(&self) -> i64 {
        self.config.new_account_resource_amount
    }

    /// Resource prices.
    pub fn gas_price(&self) -> GasPrice {
        self.config.gas_price
    }

    /// Contracts deployed at genesis.
    pub fn reserved_contracts(&self) -> &[InvokeRequest] {
        &self.config.reserved_contracts
    }

    /// Contract consulted to reject forbidden transactions.
    pub fn forbidden_contract(&self) -> &InvokeRequest {
        &self.config.forbidden_contract
    }

    /// Contract managing group chains.
    pub fn group_chain_contract(&self) -> &InvokeRequest {
        &self.config.group_chain_contract
    }

    /// Account allowed to deploy reserved contracts.
    pub fn reserved_whitelist_account(&self) -> &str {
        &self.config.reserved_whitelist.account
    }

    /// Consensus configuration of the genesis block.
    pub fn genesis_consensus(&self) -> Map<String, Value> {
        self.config.genesis_consensus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Transaction, TxOutput};
    use bytes::Bytes;
    use test_case::test_case;

    fn genesis(config: &str) -> GenesisBlock {
        let tx = Transaction {
            coinbase: true,
            outputs: vec![TxOutput::new(&BigUint::from(1_000u32), &b"founder"[..])],
            desc: Bytes::copy_from_slice(config.as_bytes()),
            ..Default::default()
        };
        let block = Block {
            transactions: vec![tx],
            ..Default::default()
        };
        GenesisBlock::new(block, 1000).unwrap()
    }

    const DECAYING: &str = r#"{
        "version": "1",
        "consensus": {"type": "single", "miner": "alice"},
        "predistribution": [{"address": "alice", "quota": "100"}],
        "maxblocksize": "128",
        "period": "3000",
        "award": "1000000",
        "award_decay": {"height_gap": 10, "ratio": 0.5},
        "gas_price": {"cpu_rate": 1, "mem_rate": 2, "disk_rate": 3, "xfee_rate": 4},
        "decimals": "8",
        "new_account_resource_amount": 1000,
        "irreversibleslidewindow": "12",
        "reserved_whitelist": {"account": "whitelist"}
    }"#;

    #[test_case(0, 1_000_000; "first period")]
    #[test_case(9, 1_000_000; "end of first period")]
    #[test_case(10, 500_000; "second period")]
    #[test_case(25, 250_000; "third period")]
    fn test_award_decay(height: i64, expected: u64) {
        let genesis = genesis(DECAYING);
        assert_eq!(genesis.calc_award(height), BigUint::from(expected));
    }

    #[test]
    fn test_award_rounding() {
        let genesis = genesis(r#"{"award": "3", "award_decay": {"height_gap": 1, "ratio": 0.5}}"#);
        // 1.5 rounds up, 0.75 rounds up, 0.375 rounds down
        assert_eq!(genesis.calc_award(1), BigUint::from(2u32));
        assert_eq!(genesis.calc_award(2), BigUint::from(1u32));
        assert_eq!(genesis.calc_award(3), BigUint::from(0u32));
    }

    #[test]
    fn test_award_memoized() {
        let genesis = genesis(DECAYING);
        let first = genesis.calc_award(15);
        assert_eq!(genesis.awards.len(), 1);
        assert_eq!(genesis.calc_award(19), first);
        assert_eq!(genesis.awards.len(), 1);
    }

    #[test]
    fn test_no_decay() {
        let genesis = genesis(r#"{"award": "42"}"#);
        assert_eq!(genesis.calc_award(1_000_000), BigUint::from(42u32));
        assert!(genesis.awards.is_empty());
    }

    #[test]
    fn test_getters() {
        let genesis = genesis(DECAYING);
        assert_eq!(genesis.max_block_size(), 128 << 20);
        assert_eq!(genesis.irreversible_slide_window(), 12);
        assert_eq!(genesis.new_account_resource_amount(), 1000);
        assert_eq!(genesis.gas_price().disk_rate, 3);
        assert_eq!(genesis.reserved_whitelist_account(), "whitelist");
        assert_eq!(genesis.config().predistribution.len(), 1);
        assert_eq!(genesis.coinbase_total(), BigUint::from(1_000u32));

        let consensus = genesis.genesis_consensus();
        assert_eq!(consensus["name"], json!("single"));
        assert_eq!(consensus["config"]["miner"], json!("alice"));
        assert_eq!(consensus["config"]["period"], json!("3000"));
    }

    #[test]
    fn test_no_fee() {
        let config = DECAYING.replacen("\"version\": \"1\"", "\"version\": \"1\", \"nofee\": true", 1);
        let genesis = genesis(&config);
        assert_eq!(genesis.calc_award(0), BigUint::from(0u32));
        assert_eq!(genesis.new_account_resource_amount(), 0);
        assert_eq!(genesis.gas_price(), GasPrice::default());
        assert!(genesis.config().predistribution.is_empty());
    }

    #[test]
    fn test_explicit_genesis_consensus() {
        let genesis = genesis(r#"{"genesis_consensus": {"name": "tdpos"}}"#);
        assert_eq!(genesis.genesis_consensus()["name"], json!("tdpos"));
    }

    #[test]
    fn test_capitalized_predistribution() {
        let genesis = genesis(r#"{"Predistribution": [{"address": "bob", "quota": "1"}]}"#);
        assert_eq!(genesis.config().predistribution[0].address, "bob");
    }

    #[test]
    fn test_missing_coinbase() {
        let block = Block {
            transactions: vec![Transaction::default()],
            ..Default::default()
        };
        assert!(matches!(
            GenesisBlock::new(block, 10),
            Err(Error::GenesisTxMissing)
        ));
    }

    #[test]
    fn test_invalid_json() {
        let tx = Transaction {
            coinbase: true,
            desc: Bytes::from_static(b"not json"),
            ..Default::default()
        };
        let block = Block {
            transactions: vec![tx],
            ..Default::default()
        };
        assert!(matches!(
            GenesisBlock::new(block, 10),
            Err(Error::InvalidGenesis(_))
        ));
    }
}
