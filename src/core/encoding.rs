//! Canonical encoding of every persisted blob.
//!
//! Blobs are audit-friendly JSON: struct fields encode in declaration
//! order and maps are `BTreeMap`s, so the byte output is deterministic.
//! Codec failures are fatal to the current block.

use serde_json::Value;
use sha2::Digest;
use sha2::Sha512_256;

use super::types::AccountData;
use super::types::AccountTotals;
use super::types::AppLocalState;
use super::types::AppParams;
use super::types::AssetParams;
use super::types::BlockHeader;
use super::types::SignedTxnWithApplyData;
use super::types::SpecialAddresses;
use super::types::Transaction;
use super::types::TxnExtra;
use crate::error::Error;

/// Domain separation prefix for transaction ids.
const TXID_PREFIX: &[u8] = b"TX";

pub fn encode_block_header(header: &BlockHeader) -> Result<Value, Error> {
    serde_json::to_value(header).map_err(Error::encoding("encode_block_header()"))
}

pub fn decode_block_header(value: Value) -> Result<BlockHeader, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_block_header()"))
}

pub fn encode_special_addresses(addresses: &SpecialAddresses) -> Result<Value, Error> {
    serde_json::to_value(addresses).map_err(Error::encoding("encode_special_addresses()"))
}

pub fn decode_special_addresses(value: Value) -> Result<SpecialAddresses, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_special_addresses()"))
}

pub fn encode_account_totals(totals: &AccountTotals) -> Result<Value, Error> {
    serde_json::to_value(totals).map_err(Error::encoding("encode_account_totals()"))
}

pub fn decode_account_totals(value: Value) -> Result<AccountTotals, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_account_totals()"))
}

pub fn encode_asset_params(params: &AssetParams) -> Result<Value, Error> {
    serde_json::to_value(params).map_err(Error::encoding("encode_asset_params()"))
}

pub fn decode_asset_params(value: Value) -> Result<AssetParams, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_asset_params()"))
}

pub fn encode_app_params(params: &AppParams) -> Result<Value, Error> {
    serde_json::to_value(params).map_err(Error::encoding("encode_app_params()"))
}

pub fn decode_app_params(value: Value) -> Result<AppParams, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_app_params()"))
}

pub fn encode_app_local_state(state: &AppLocalState) -> Result<Value, Error> {
    serde_json::to_value(state).map_err(Error::encoding("encode_app_local_state()"))
}

pub fn decode_app_local_state(value: Value) -> Result<AppLocalState, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_app_local_state()"))
}

pub fn encode_signed_txn(stxn: &SignedTxnWithApplyData) -> Result<Value, Error> {
    serde_json::to_value(stxn).map_err(Error::encoding("encode_signed_txn()"))
}

pub fn decode_signed_txn(value: Value) -> Result<SignedTxnWithApplyData, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_signed_txn()"))
}

pub fn encode_txn_extra(extra: &TxnExtra) -> Result<Value, Error> {
    serde_json::to_value(extra).map_err(Error::encoding("encode_txn_extra()"))
}

pub fn decode_txn_extra(value: Value) -> Result<TxnExtra, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_txn_extra()"))
}

pub fn encode_trimmed_account_data(data: &AccountData) -> Result<Value, Error> {
    serde_json::to_value(data).map_err(Error::encoding("encode_trimmed_account_data()"))
}

pub fn decode_trimmed_account_data(value: Value) -> Result<AccountData, Error> {
    serde_json::from_value(value).map_err(Error::encoding("decode_trimmed_account_data()"))
}

/// Clears the per-creatable collections before storage. They live in the
/// `asset`, `account_asset`, `app` and `account_app` tables.
pub fn trim_account_data(mut data: AccountData) -> AccountData {
    data.asset_params.clear();
    data.assets.clear();
    data.app_params.clear();
    data.app_local_states.clear();
    data
}

/// Canonical transaction id: domain-separated SHA-512/256 over the
/// canonical transaction bytes, rendered as lowercase hex.
pub fn txid(txn: &Transaction) -> Result<String, Error> {
    let bytes = serde_json::to_vec(txn).map_err(Error::encoding("txid()"))?;
    let mut hasher = Sha512_256::new();
    hasher.update(TXID_PREFIX);
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::types::*;

    fn sample_transaction() -> Transaction {
        Transaction {
            sender: Address([1u8; 32]),
            fee: 1000,
            first_valid: 5,
            last_valid: 1005,
            genesis_id: "test-v1".to_string(),
            note: Some(HexBytes(vec![1, 2, 3])),
            rekey_to: Address::ZERO,
            body: TxnBody::Payment {
                receiver: Address([2u8; 32]),
                amount: 77,
                close_remainder_to: Address::ZERO,
            },
        }
    }

    #[test]
    fn block_header_roundtrip() {
        let header = BlockHeader {
            round: 2,
            timestamp: 333,
            genesis_id: "test-v1".to_string(),
            genesis_hash: Some(HexBytes(vec![9u8; 32])),
            prev: None,
            txn_counter: 4,
            rewards: RewardsState {
                fee_sink: Address([3u8; 32]),
                rewards_pool: Address([4u8; 32]),
                rewards_level: 111111,
                rewards_rate: 0,
                rewards_residue: 0,
            },
        };
        let decoded = decode_block_header(encode_block_header(&header).unwrap()).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn special_addresses_roundtrip() {
        let addresses = SpecialAddresses {
            fee_sink: Address([3u8; 32]),
            rewards_pool: Address([4u8; 32]),
        };
        let decoded =
            decode_special_addresses(encode_special_addresses(&addresses).unwrap()).unwrap();
        assert_eq!(addresses, decoded);
    }

    #[test]
    fn account_totals_roundtrip() {
        let totals = AccountTotals {
            online: AlgoCount {
                money: 33,
                reward_units: 2,
            },
            offline: AlgoCount::default(),
            not_participating: AlgoCount::default(),
            rewards_level: 7,
        };
        let decoded = decode_account_totals(encode_account_totals(&totals).unwrap()).unwrap();
        assert_eq!(totals, decoded);
    }

    #[test]
    fn asset_params_roundtrip() {
        let params = AssetParams {
            total: u64::MAX,
            decimals: 1,
            default_frozen: false,
            unit_name: "ma".to_string(),
            asset_name: "myasset".to_string(),
            url: "myasset.com".to_string(),
            metadata_hash: None,
            manager: Address([1u8; 32]),
            reserve: Address::ZERO,
            freeze: Address::ZERO,
            clawback: Address::ZERO,
        };
        let decoded = decode_asset_params(encode_asset_params(&params).unwrap()).unwrap();
        assert_eq!(params, decoded);
    }

    #[test]
    fn app_params_roundtrip() {
        let mut global_state = TealKeyValue::new();
        global_state.insert("total".to_string(), TealValue::Uint(3));
        let params = AppParams {
            approval_program: Some(HexBytes(vec![2, 32, 1, 1])),
            clear_state_program: Some(HexBytes(vec![2])),
            global_state_schema: StateSchema {
                num_uint: 1,
                num_byte_slice: 0,
            },
            local_state_schema: StateSchema::default(),
            global_state,
            extra_program_pages: 1,
        };
        let decoded = decode_app_params(encode_app_params(&params).unwrap()).unwrap();
        assert_eq!(params, decoded);
    }

    #[test]
    fn app_local_state_roundtrip() {
        let mut key_value = TealKeyValue::new();
        key_value.insert("counter".to_string(), TealValue::Uint(9));
        key_value.insert(
            "owner".to_string(),
            TealValue::Bytes(HexBytes(vec![1, 2, 3])),
        );
        let state = AppLocalState {
            schema: StateSchema {
                num_uint: 1,
                num_byte_slice: 1,
            },
            key_value,
        };
        let decoded = decode_app_local_state(encode_app_local_state(&state).unwrap()).unwrap();
        assert_eq!(state, decoded);
    }

    #[test]
    fn txn_extra_roundtrip() {
        let extra = TxnExtra {
            asset_close_amount: 3,
            root_txid: Some("abc".to_string()),
            root_intra: Some(0),
        };
        let value = encode_txn_extra(&extra).unwrap();
        assert_eq!(value["aca"], 3);
        assert_eq!(value["root-txid"], "abc");
        assert_eq!(value["root-intra"], 0);
        assert_eq!(extra, decode_txn_extra(value).unwrap());
    }

    #[test]
    fn empty_txn_extra_encodes_to_empty_object() {
        let value = encode_txn_extra(&TxnExtra::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn trim_clears_creatable_collections() {
        let mut data = AccountData {
            status: AccountStatus::Online,
            micro_algos: 100,
            rewards_base: 5,
            rewarded_micro_algos: 1,
            ..Default::default()
        };
        data.assets.insert(3, AssetHolding {
            amount: 7,
            frozen: false,
        });
        data.asset_params.insert(3, AssetParams::default());
        data.app_params.insert(4, AppParams::default());
        data.app_local_states.insert(4, AppLocalState::default());

        let trimmed = trim_account_data(data.clone());

        assert!(trimmed.assets.is_empty());
        assert!(trimmed.asset_params.is_empty());
        assert!(trimmed.app_params.is_empty());
        assert!(trimmed.app_local_states.is_empty());
        // Behaviorally significant fields survive.
        assert_eq!(trimmed.status, data.status);
        assert_eq!(trimmed.micro_algos, data.micro_algos);
        assert_eq!(trimmed.rewards_base, data.rewards_base);
        assert_eq!(trimmed.rewarded_micro_algos, data.rewarded_micro_algos);
    }

    #[test]
    fn trimmed_account_data_roundtrip() {
        let data = trim_account_data(AccountData {
            status: AccountStatus::Online,
            micro_algos: 100,
            ..Default::default()
        });
        let decoded =
            decode_trimmed_account_data(encode_trimmed_account_data(&data).unwrap()).unwrap();
        assert_eq!(data, decoded);
    }

    #[test]
    fn signed_txn_roundtrip() {
        let stxn = SignedTxnWithApplyData {
            signed_txn: SignedTxn {
                sig: Some(HexBytes(vec![5u8; 64])),
                msig: None,
                lsig: None,
                auth_addr: Address::ZERO,
                txn: sample_transaction(),
            },
            apply_data: ApplyData {
                closing_amount: 0,
                asset_closing_amount: 0,
                config_asset: 0,
                application_id: 0,
                inner_txns: vec![],
            },
        };
        let decoded = decode_signed_txn(encode_signed_txn(&stxn).unwrap()).unwrap();
        assert_eq!(stxn, decoded);
    }

    #[test]
    fn txid_is_stable_and_input_sensitive() {
        let txn = sample_transaction();
        let id = txid(&txn).unwrap();
        assert_eq!(id, txid(&txn).unwrap());
        assert_eq!(id.len(), 64);

        let mut other = txn;
        other.fee = 1001;
        assert_ne!(id, txid(&other).unwrap());
    }
}
