use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;

pub type Round = u64;
pub type AssetId = u64;
pub type AppId = u64;
pub type MicroAlgos = u64;
pub type Timestamp = i64;
pub type CreatableIndex = u64;
pub type Payset = Vec<SignedTxnWithApplyData>;

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// 32-byte ledger address. Rendered as lowercase hex.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Address(#[serde(with = "hex::serde")] pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Arbitrary bytes rendered as lowercase hex in JSON blobs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HexBytes(#[serde(with = "hex::serde")] pub Vec<u8>);

impl HexBytes {
    pub fn new(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Signature scheme observed on a signed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigType {
    Sig,
    Msig,
    Lsig,
}

impl SigType {
    /// Column value for `account.keytype`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigType::Sig => "sig",
            SigType::Msig => "msig",
            SigType::Lsig => "lsig",
        }
    }
}

/// Transaction type classification, with the `txn.typeenum` discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnType {
    Pay = 1,
    Keyreg = 2,
    AssetConfig = 3,
    AssetTransfer = 4,
    AssetFreeze = 5,
    AppCall = 6,
}

impl TxnType {
    pub fn type_enum(&self) -> i16 {
        *self as i16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigSubsig {
    pub key: HexBytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<HexBytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigSig {
    pub version: u8,
    pub threshold: u8,
    pub subsigs: Vec<MultisigSubsig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicSig {
    pub logic: HexBytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msig: Option<MultisigSig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<HexBytes>,
}

/// Per-type transaction fields. The tag doubles as the wire type string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TxnBody {
    #[serde(rename = "pay")]
    Payment {
        receiver: Address,
        #[serde(default, skip_serializing_if = "is_zero")]
        amount: MicroAlgos,
        #[serde(default, skip_serializing_if = "Address::is_zero")]
        close_remainder_to: Address,
    },
    #[serde(rename = "keyreg")]
    Keyreg {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vote_pk: Option<HexBytes>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection_pk: Option<HexBytes>,
        #[serde(default, skip_serializing_if = "is_zero")]
        vote_first: Round,
        #[serde(default, skip_serializing_if = "is_zero")]
        vote_last: Round,
        #[serde(default, skip_serializing_if = "is_zero")]
        vote_key_dilution: u64,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        nonparticipation: bool,
    },
    #[serde(rename = "acfg")]
    AssetConfig {
        #[serde(default, skip_serializing_if = "is_zero")]
        config_asset: AssetId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<AssetParams>,
    },
    #[serde(rename = "axfer")]
    AssetTransfer {
        xfer_asset: AssetId,
        #[serde(default, skip_serializing_if = "is_zero")]
        amount: u64,
        /// Clawback source. Zero unless this is a clawback transfer.
        #[serde(default, skip_serializing_if = "Address::is_zero")]
        asset_sender: Address,
        asset_receiver: Address,
        #[serde(default, skip_serializing_if = "Address::is_zero")]
        asset_close_to: Address,
    },
    #[serde(rename = "afrz")]
    AssetFreeze {
        freeze_account: Address,
        freeze_asset: AssetId,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        frozen: bool,
    },
    #[serde(rename = "appl")]
    AppCall {
        /// Zero when the call creates the application.
        #[serde(default, skip_serializing_if = "is_zero")]
        application_id: AppId,
        #[serde(default, skip_serializing_if = "is_zero")]
        on_completion: u64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<HexBytes>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        accounts: Vec<Address>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        foreign_apps: Vec<AppId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        foreign_assets: Vec<AssetId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approval_program: Option<HexBytes>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clear_state_program: Option<HexBytes>,
    },
}

impl TxnBody {
    pub fn txn_type(&self) -> TxnType {
        match self {
            TxnBody::Payment { .. } => TxnType::Pay,
            TxnBody::Keyreg { .. } => TxnType::Keyreg,
            TxnBody::AssetConfig { .. } => TxnType::AssetConfig,
            TxnBody::AssetTransfer { .. } => TxnType::AssetTransfer,
            TxnBody::AssetFreeze { .. } => TxnType::AssetFreeze,
            TxnBody::AppCall { .. } => TxnType::AppCall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub fee: MicroAlgos,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub first_valid: Round,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_valid: Round,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub rekey_to: Address,
    #[serde(flatten)]
    pub body: TxnBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTxn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msig: Option<MultisigSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsig: Option<LogicSig>,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub auth_addr: Address,
    pub txn: Transaction,
}

impl SignedTxn {
    /// Classifies the signature scheme. An unsigned transaction is an error.
    pub fn sig_type(&self, scope: &'static str) -> Result<SigType, Error> {
        if self.sig.is_some() {
            Ok(SigType::Sig)
        } else if self.msig.is_some() {
            Ok(SigType::Msig)
        } else if self.lsig.is_some() {
            Ok(SigType::Lsig)
        } else {
            Err(Error::UnknownSigType {
                scope,
                sender: self.txn.sender,
            })
        }
    }
}

/// Protocol-produced side effects of executing a transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplyData {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub closing_amount: MicroAlgos,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub asset_closing_amount: u64,
    /// Freshly allocated asset id for creating acfg transactions.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub config_asset: AssetId,
    /// Freshly allocated app id for creating appl transactions.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub application_id: AppId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_txns: Vec<SignedTxnWithApplyData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTxnWithApplyData {
    pub signed_txn: SignedTxn,
    #[serde(default)]
    pub apply_data: ApplyData,
}

/// Extra metadata stored next to the transaction blob.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxnExtra {
    /// Asset close amount supplied by the modified-transactions overlay.
    #[serde(rename = "aca", default, skip_serializing_if = "is_zero")]
    pub asset_close_amount: u64,
    #[serde(rename = "root-txid", default, skip_serializing_if = "Option::is_none")]
    pub root_txid: Option<String>,
    #[serde(rename = "root-intra", default, skip_serializing_if = "Option::is_none")]
    pub root_intra: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RewardsState {
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub fee_sink: Address,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub rewards_pool: Address,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rewards_level: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rewards_rate: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rewards_residue: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    pub round: Round,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_hash: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub txn_counter: u64,
    #[serde(flatten)]
    pub rewards: RewardsState,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub payset: Payset,
}

impl Block {
    pub fn round(&self) -> Round {
        self.header.round
    }

    pub fn special_addresses(&self) -> SpecialAddresses {
        SpecialAddresses {
            fee_sink: self.header.rewards.fee_sink,
            rewards_pool: self.header.rewards.rewards_pool,
        }
    }
}

/// Fee sink and rewards pool, stored as a single metastate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpecialAddresses {
    pub fee_sink: Address,
    pub rewards_pool: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Offline,
    Online,
    #[serde(rename = "not_participating")]
    NotParticipating,
}

impl AccountStatus {
    fn is_offline(&self) -> bool {
        *self == AccountStatus::Offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateSchema {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_uint: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_byte_slice: u64,
}

impl StateSchema {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TealValue {
    Bytes(HexBytes),
    Uint(u64),
}

pub type TealKeyValue = BTreeMap<String, TealValue>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssetParams {
    pub total: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub decimals: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default_frozen: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_hash: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub manager: Address,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub reserve: Address,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub freeze: Address,
    #[serde(default, skip_serializing_if = "Address::is_zero")]
    pub clawback: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetHolding {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub amount: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub frozen: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_program: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_state_program: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "StateSchema::is_empty")]
    pub global_state_schema: StateSchema,
    #[serde(default, skip_serializing_if = "StateSchema::is_empty")]
    pub local_state_schema: StateSchema,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub global_state: TealKeyValue,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub extra_program_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppLocalState {
    #[serde(default, skip_serializing_if = "StateSchema::is_empty")]
    pub schema: StateSchema,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub key_value: TealKeyValue,
}

/// Post-transaction account state as handed over by the ledger engine.
///
/// The per-creatable collections are projected into their own tables and
/// trimmed out of the stored account blob.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(default, skip_serializing_if = "AccountStatus::is_offline")]
    pub status: AccountStatus,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub micro_algos: MicroAlgos,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rewards_base: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rewarded_micro_algos: MicroAlgos,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_id: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_id: Option<HexBytes>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub asset_params: BTreeMap<AssetId, AssetParams>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<AssetId, AssetHolding>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app_params: BTreeMap<AppId, AppParams>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app_local_states: BTreeMap<AppId, AppLocalState>,
    #[serde(default, skip_serializing_if = "StateSchema::is_empty")]
    pub total_app_schema: StateSchema,
}

impl AccountData {
    /// A zero post-state means the account was closed this round.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatableType {
    Asset,
    App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifiedCreatable {
    pub ctype: CreatableType,
    /// False means the creatable was closed this round.
    pub created: bool,
    pub creator: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlgoCount {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub money: MicroAlgos,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reward_units: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountTotals {
    #[serde(default)]
    pub online: AlgoCount,
    #[serde(default)]
    pub offline: AlgoCount,
    #[serde(default)]
    pub not_participating: AlgoCount,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rewards_level: u64,
}

/// Per-block ledger change set computed by the ledger engine.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    /// Ordered sequence of modified accounts with their post-states.
    pub accts: Vec<(Address, AccountData)>,
    pub creatables: BTreeMap<CreatableIndex, ModifiedCreatable>,
    /// (addr, asset) -> created. False marks a closed holding.
    pub modified_asset_holdings: BTreeMap<(Address, AssetId), bool>,
    /// (addr, app) -> created. False marks a closed local state.
    pub modified_app_local_states: BTreeMap<(Address, AppId), bool>,
    pub totals: AccountTotals,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn zero_address_is_zero() {
        assert!(Address::ZERO.is_zero());
        let mut addr = Address::ZERO;
        addr.0[5] = 1;
        assert!(!addr.is_zero());
    }

    #[test]
    fn txn_type_discriminants() {
        assert_eq!(TxnType::Pay.type_enum(), 1);
        assert_eq!(TxnType::Keyreg.type_enum(), 2);
        assert_eq!(TxnType::AssetConfig.type_enum(), 3);
        assert_eq!(TxnType::AssetTransfer.type_enum(), 4);
        assert_eq!(TxnType::AssetFreeze.type_enum(), 5);
        assert_eq!(TxnType::AppCall.type_enum(), 6);
    }

    #[test]
    fn sig_type_classification() {
        let txn = Transaction {
            sender: Address([1u8; 32]),
            fee: 1000,
            first_valid: 1,
            last_valid: 10,
            genesis_id: String::new(),
            note: None,
            rekey_to: Address::ZERO,
            body: TxnBody::Payment {
                receiver: Address([2u8; 32]),
                amount: 5,
                close_remainder_to: Address::ZERO,
            },
        };

        let mut stxn = SignedTxn {
            sig: Some(HexBytes(vec![5u8; 64])),
            msig: None,
            lsig: None,
            auth_addr: Address::ZERO,
            txn,
        };
        assert_eq!(stxn.sig_type("test").unwrap(), SigType::Sig);

        stxn.sig = None;
        stxn.msig = Some(MultisigSig {
            version: 1,
            threshold: 1,
            subsigs: vec![],
        });
        assert_eq!(stxn.sig_type("test").unwrap(), SigType::Msig);

        stxn.msig = None;
        stxn.lsig = Some(LogicSig {
            logic: HexBytes(vec![1]),
            sig: None,
            msig: None,
            args: vec![],
        });
        assert_eq!(stxn.sig_type("test").unwrap(), SigType::Lsig);

        stxn.lsig = None;
        assert!(stxn.sig_type("test").is_err());
    }

    #[test]
    fn zero_account_data() {
        let mut data = AccountData::default();
        assert!(data.is_zero());
        data.micro_algos = 1;
        assert!(!data.is_zero());
    }

    #[test]
    fn txn_body_json_tag() {
        let body = TxnBody::Payment {
            receiver: Address([2u8; 32]),
            amount: 5,
            close_remainder_to: Address::ZERO,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["type"], "pay");
    }

    #[test]
    fn keytype_column_values() {
        assert_eq!(SigType::Sig.as_str(), "sig");
        assert_eq!(SigType::Msig.as_str(), "msig");
        assert_eq!(SigType::Lsig.as_str(), "lsig");
    }
}
