//! Projects account and creatable deltas onto their tables.

use std::collections::BTreeMap;
use std::collections::HashMap;

use rust_decimal::Decimal;

use super::batch::Batch;
use super::statements::Statements;
use crate::core::encoding;
use crate::core::types::AccountData;
use crate::core::types::Address;
use crate::core::types::AppId;
use crate::core::types::AssetId;
use crate::core::types::CreatableIndex;
use crate::core::types::CreatableType;
use crate::core::types::ModifiedCreatable;
use crate::core::types::Payset;
use crate::core::types::Round;
use crate::core::types::SigType;
use crate::error::Error;

/// Change to the `account.keytype` column derived from a block's senders.
///
/// Absence from the delta map is the third state: the column is left
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SigTypeDelta {
    /// A signature of this type was observed for the sender.
    Set(SigType),
    /// The sender was rekeyed; keytype becomes NULL.
    Clear,
}

/// Derives per-address keytype changes from the payset senders.
///
/// Later senders for the same address overwrite earlier ones.
pub(crate) fn sig_type_deltas(payset: &Payset) -> Result<HashMap<Address, SigTypeDelta>, Error> {
    let scope = "sig_type_deltas()";
    let mut res = HashMap::with_capacity(payset.len());

    for stxn in payset {
        let txn = &stxn.signed_txn.txn;
        if txn.rekey_to.is_zero() {
            let sigtype = stxn.signed_txn.sig_type(scope)?;
            res.insert(txn.sender, SigTypeDelta::Set(sigtype));
        } else {
            res.insert(txn.sender, SigTypeDelta::Clear);
        }
    }

    Ok(res)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeytypeUpdate {
    /// No sigtype delta for this address; the column is left unchanged.
    Keep,
    Set(Option<&'static str>),
}

/// What the `account` table statement for one delta entry looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccountOp {
    Upsert(KeytypeUpdate),
    Close(KeytypeUpdate),
}

pub(crate) fn account_op(data: &AccountData, delta: Option<&SigTypeDelta>) -> AccountOp {
    let keytype = match delta {
        None => KeytypeUpdate::Keep,
        Some(SigTypeDelta::Set(sigtype)) => KeytypeUpdate::Set(Some(sigtype.as_str())),
        Some(SigTypeDelta::Clear) => KeytypeUpdate::Set(None),
    };
    if data.is_zero() {
        AccountOp::Close(keytype)
    } else {
        AccountOp::Upsert(keytype)
    }
}

fn write_account(
    round: Round,
    address: &Address,
    data: &AccountData,
    delta: Option<&SigTypeDelta>,
    statements: &Statements,
    batch: &mut Batch,
) -> Result<(), Error> {
    let created_at = round as i64;

    // The creatable upserts intentionally revive previously deleted rows.
    for (assetid, params) in &data.asset_params {
        batch.queue(
            &statements.upsert_asset,
            vec![
                Box::new(*assetid as i64),
                Box::new(address.0.to_vec()),
                Box::new(encoding::encode_asset_params(params)?),
                Box::new(created_at),
            ],
        );
    }

    for (assetid, holding) in &data.assets {
        batch.queue(
            &statements.upsert_account_asset,
            vec![
                Box::new(address.0.to_vec()),
                Box::new(*assetid as i64),
                Box::new(Decimal::from(holding.amount)),
                Box::new(holding.frozen),
                Box::new(created_at),
            ],
        );
    }

    for (appid, params) in &data.app_params {
        batch.queue(
            &statements.upsert_app,
            vec![
                Box::new(*appid as i64),
                Box::new(address.0.to_vec()),
                Box::new(encoding::encode_app_params(params)?),
                Box::new(created_at),
            ],
        );
    }

    for (appid, state) in &data.app_local_states {
        batch.queue(
            &statements.upsert_account_app,
            vec![
                Box::new(address.0.to_vec()),
                Box::new(*appid as i64),
                Box::new(encoding::encode_app_local_state(state)?),
                Box::new(created_at),
            ],
        );
    }

    match account_op(data, delta) {
        AccountOp::Close(KeytypeUpdate::Keep) => {
            batch.queue(
                &statements.delete_account,
                vec![Box::new(address.0.to_vec()), Box::new(created_at)],
            );
        }
        AccountOp::Close(KeytypeUpdate::Set(keytype)) => {
            batch.queue(
                &statements.delete_account_update_keytype,
                vec![
                    Box::new(address.0.to_vec()),
                    Box::new(created_at),
                    Box::new(keytype),
                ],
            );
        }
        AccountOp::Upsert(keytype_update) => {
            let account_data =
                encoding::encode_trimmed_account_data(&encoding::trim_account_data(data.clone()))?;
            match keytype_update {
                KeytypeUpdate::Keep => {
                    batch.queue(
                        &statements.upsert_account,
                        vec![
                            Box::new(address.0.to_vec()),
                            Box::new(data.micro_algos as i64),
                            Box::new(data.rewards_base as i64),
                            Box::new(data.rewarded_micro_algos as i64),
                            Box::new(created_at),
                            Box::new(account_data),
                        ],
                    );
                }
                KeytypeUpdate::Set(keytype) => {
                    batch.queue(
                        &statements.upsert_account_with_keytype,
                        vec![
                            Box::new(address.0.to_vec()),
                            Box::new(data.micro_algos as i64),
                            Box::new(data.rewards_base as i64),
                            Box::new(data.rewarded_micro_algos as i64),
                            Box::new(created_at),
                            Box::new(keytype),
                            Box::new(account_data),
                        ],
                    );
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn write_accounts(
    round: Round,
    accts: &[(Address, AccountData)],
    sigtype_deltas: &HashMap<Address, SigTypeDelta>,
    statements: &Statements,
    batch: &mut Batch,
) -> Result<(), Error> {
    for (address, data) in accts {
        write_account(
            round,
            address,
            data,
            sigtype_deltas.get(address),
            statements,
            batch,
        )?;
    }
    Ok(())
}

pub(crate) fn write_deleted_creatables(
    round: Round,
    creatables: &BTreeMap<CreatableIndex, ModifiedCreatable>,
    statements: &Statements,
    batch: &mut Batch,
) {
    for (index, creatable) in creatables {
        if creatable.created {
            continue;
        }
        let statement = match creatable.ctype {
            CreatableType::Asset => &statements.delete_asset,
            CreatableType::App => &statements.delete_app,
        };
        batch.queue(
            statement,
            vec![
                Box::new(*index as i64),
                Box::new(creatable.creator.0.to_vec()),
                Box::new(round as i64),
            ],
        );
    }
}

pub(crate) fn write_deleted_asset_holdings(
    round: Round,
    modified_asset_holdings: &BTreeMap<(Address, AssetId), bool>,
    statements: &Statements,
    batch: &mut Batch,
) {
    for ((address, assetid), created) in modified_asset_holdings {
        if !created {
            batch.queue(
                &statements.delete_account_asset,
                vec![
                    Box::new(address.0.to_vec()),
                    Box::new(*assetid as i64),
                    Box::new(round as i64),
                ],
            );
        }
    }
}

pub(crate) fn write_deleted_app_local_states(
    round: Round,
    modified_app_local_states: &BTreeMap<(Address, AppId), bool>,
    statements: &Statements,
    batch: &mut Batch,
) {
    for ((address, appid), created) in modified_app_local_states {
        if !created {
            batch.queue(
                &statements.delete_account_app,
                vec![
                    Box::new(address.0.to_vec()),
                    Box::new(*appid as i64),
                    Box::new(round as i64),
                ],
            );
        }
    }
}
