//! Expands a payset into `txn` rows.
//!
//! Each outer signed transaction is walked depth-first over its inner
//! transaction tree; every node gets exactly one row with a block-unique
//! `intra` assigned in pre-order.

use serde_json::Value;
use tokio_postgres::Transaction as PgTransaction;

use crate::core::encoding;
use crate::core::types::Block;
use crate::core::types::Payset;
use crate::core::types::Round;
use crate::core::types::SignedTxnWithApplyData;
use crate::core::types::TxnBody;
use crate::core::types::TxnExtra;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TxnRow {
    pub round: Round,
    pub intra: i32,
    pub typeenum: i16,
    pub asset: u64,
    /// Empty for inner transactions.
    pub txid: String,
    pub txn: Value,
    pub extra: Value,
}

/// The effective creatable id for a transaction, resolved against its
/// apply data for creations.
fn transaction_asset(node: &SignedTxnWithApplyData, round: Round, intra: i32) -> Result<u64, Error> {
    let apply_data = &node.apply_data;
    match &node.signed_txn.txn.body {
        TxnBody::AssetConfig { config_asset, .. } => {
            let assetid = if *config_asset != 0 {
                *config_asset
            } else {
                apply_data.config_asset
            };
            if assetid == 0 {
                return Err(Error::MissingConfigAsset { round, intra });
            }
            Ok(assetid)
        }
        TxnBody::AssetTransfer { xfer_asset, .. } => Ok(*xfer_asset),
        TxnBody::AssetFreeze { freeze_asset, .. } => Ok(*freeze_asset),
        TxnBody::AppCall { application_id, .. } => {
            let appid = if *application_id != 0 {
                *application_id
            } else {
                apply_data.application_id
            };
            if appid == 0 {
                return Err(Error::MissingApplicationId { round, intra });
            }
            Ok(appid)
        }
        _ => Ok(0),
    }
}

fn expand_node(
    round: Round,
    node: &SignedTxnWithApplyData,
    root: Option<(&str, i32)>,
    outer_extra: TxnExtra,
    intra: &mut i32,
    rows: &mut Vec<TxnRow>,
) -> Result<(), Error> {
    let row_intra = *intra;
    *intra += 1;

    let typeenum = node.signed_txn.txn.body.txn_type().type_enum();
    let asset = transaction_asset(node, round, row_intra)?;

    let (txid, extra) = match root {
        None => (encoding::txid(&node.signed_txn.txn)?, outer_extra),
        Some((root_txid, root_intra)) => (
            String::new(),
            TxnExtra {
                asset_close_amount: 0,
                root_txid: Some(root_txid.to_string()),
                root_intra: Some(root_intra),
            },
        ),
    };

    // Inner transactions get their own rows, so the stored blob carries an
    // empty inner list.
    let mut pruned = node.clone();
    pruned.apply_data.inner_txns = Vec::new();
    let txn_blob = encoding::encode_signed_txn(&pruned)?;

    rows.push(TxnRow {
        round,
        intra: row_intra,
        typeenum,
        asset,
        txid: txid.clone(),
        txn: txn_blob,
        extra: encoding::encode_txn_extra(&extra)?,
    });

    // Descendants link back to their outermost ancestor.
    let (root_txid, root_intra) = match root {
        None => (txid, row_intra),
        Some((txid, intra)) => (txid.to_string(), intra),
    };
    for inner in &node.apply_data.inner_txns {
        expand_node(
            round,
            inner,
            Some((&root_txid, root_intra)),
            TxnExtra::default(),
            intra,
            rows,
        )?;
    }

    Ok(())
}

/// Flattens the block payset into `txn` rows.
///
/// `modified_txns` is the payset with externally supplied apply data
/// overlaid; an asset close amount present there but absent on-block is
/// merged into the outer row's extra.
pub(crate) fn expand_payset(block: &Block, modified_txns: &Payset) -> Result<Vec<TxnRow>, Error> {
    if !modified_txns.is_empty() && modified_txns.len() != block.payset.len() {
        return Err(Error::InvalidDelta {
            scope: "expand_payset()",
            msg: format!(
                "modified payset has {} transactions, block has {}",
                modified_txns.len(),
                block.payset.len()
            ),
        });
    }

    let round = block.round();
    let mut rows = Vec::new();
    let mut intra: i32 = 0;

    for (i, stxn) in block.payset.iter().enumerate() {
        let mut extra = TxnExtra::default();
        let modified_aca = modified_txns
            .get(i)
            .map(|m| m.apply_data.asset_closing_amount)
            .unwrap_or(0);
        if stxn.apply_data.asset_closing_amount == 0 && modified_aca != 0 {
            extra.asset_close_amount = modified_aca;
        }

        expand_node(round, stxn, None, extra, &mut intra, &mut rows)?;
    }

    Ok(rows)
}

/// Expands the payset and writes one `txn` row per node on the provided
/// transaction.
pub async fn add_transactions(
    block: &Block,
    modified_txns: &Payset,
    pgtx: &PgTransaction<'_>,
) -> Result<(), Error> {
    let scope = "add_transactions()";
    let rows = expand_payset(block, modified_txns)?;
    tracing::trace!("inserting {} txn rows for round {}", rows.len(), block.round());

    let sql = "
        insert into txn (round, intra, typeenum, asset, txid, txn, extra)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict do nothing;";
    let statement = pgtx.prepare(sql).await.map_err(Error::sql(scope))?;
    for row in &rows {
        pgtx.execute(
            &statement,
            &[
                &(row.round as i64),
                &row.intra,
                &row.typeenum,
                &(row.asset as i64),
                &row.txid,
                &row.txn,
                &row.extra,
            ],
        )
        .await
        .map_err(Error::sql(scope))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::types::*;

    fn signed(txn: Transaction) -> SignedTxn {
        SignedTxn {
            sig: Some(HexBytes(vec![5u8; 64])),
            msig: None,
            lsig: None,
            auth_addr: Address::ZERO,
            txn,
        }
    }

    fn transaction(sender: Address, body: TxnBody) -> Transaction {
        Transaction {
            sender,
            fee: 1000,
            first_valid: 1,
            last_valid: 1000,
            genesis_id: String::new(),
            note: None,
            rekey_to: Address::ZERO,
            body,
        }
    }

    fn pay(sender: Address, receiver: Address, amount: u64) -> SignedTxnWithApplyData {
        SignedTxnWithApplyData {
            signed_txn: signed(transaction(
                sender,
                TxnBody::Payment {
                    receiver,
                    amount,
                    close_remainder_to: Address::ZERO,
                },
            )),
            apply_data: ApplyData::default(),
        }
    }

    fn axfer(sender: Address, receiver: Address, asset: AssetId) -> SignedTxnWithApplyData {
        SignedTxnWithApplyData {
            signed_txn: signed(transaction(
                sender,
                TxnBody::AssetTransfer {
                    xfer_asset: asset,
                    amount: 1,
                    asset_sender: Address::ZERO,
                    asset_receiver: receiver,
                    asset_close_to: Address::ZERO,
                },
            )),
            apply_data: ApplyData::default(),
        }
    }

    fn asset_create(sender: Address, created: AssetId) -> SignedTxnWithApplyData {
        SignedTxnWithApplyData {
            signed_txn: signed(transaction(
                sender,
                TxnBody::AssetConfig {
                    config_asset: 0,
                    params: Some(AssetParams {
                        total: 100,
                        unit_name: "ma".to_string(),
                        asset_name: "myasset".to_string(),
                        url: "myasset.com".to_string(),
                        ..Default::default()
                    }),
                },
            )),
            apply_data: ApplyData {
                config_asset: created,
                ..Default::default()
            },
        }
    }

    fn app_create_with_inners(
        sender: Address,
        created: AppId,
        inner_txns: Vec<SignedTxnWithApplyData>,
    ) -> SignedTxnWithApplyData {
        SignedTxnWithApplyData {
            signed_txn: signed(transaction(
                sender,
                TxnBody::AppCall {
                    application_id: 0,
                    on_completion: 0,
                    args: vec![],
                    accounts: vec![],
                    foreign_apps: vec![],
                    foreign_assets: vec![],
                    approval_program: Some(HexBytes(vec![2])),
                    clear_state_program: Some(HexBytes(vec![3])),
                },
            )),
            apply_data: ApplyData {
                application_id: created,
                inner_txns,
                ..Default::default()
            },
        }
    }

    fn block_with(round: Round, payset: Payset) -> Block {
        Block {
            header: BlockHeader {
                round,
                timestamp: 333,
                ..Default::default()
            },
            payset,
        }
    }

    const A: Address = Address([1u8; 32]);
    const B: Address = Address([2u8; 32]);
    const C: Address = Address([3u8; 32]);
    const D: Address = Address([4u8; 32]);
    const APP_ADDR: Address = Address([99u8; 32]);

    // App call with three inner txns followed by a top level asset create:
    // five rows, intra 0..4, in DFS pre-order.
    #[test]
    fn inner_txns_flatten_in_dfs_preorder() {
        let app_call = app_create_with_inners(
            A,
            1,
            vec![pay(APP_ADDR, B, 10), pay(APP_ADDR, B, 10), axfer(APP_ADDR, C, 4)],
        );
        let block = block_with(1, vec![app_call, asset_create(D, 5)]);

        let rows = expand_payset(&block, &vec![]).unwrap();
        assert_eq!(rows.len(), 5);

        let intras: Vec<i32> = rows.iter().map(|r| r.intra).collect();
        assert_eq!(intras, vec![0, 1, 2, 3, 4]);

        let types: Vec<i16> = rows.iter().map(|r| r.typeenum).collect();
        assert_eq!(types, vec![6, 1, 1, 4, 3]);

        // Freshly allocated ids come from apply data.
        assert_eq!(rows[0].asset, 1);
        assert_eq!(rows[4].asset, 5);

        // Inner rows have no txid and link back to the outer.
        for row in &rows[1..4] {
            assert_eq!(row.txid, "");
            assert_eq!(row.extra["root-txid"], rows[0].txid.as_str());
            assert_eq!(row.extra["root-intra"], 0);
        }

        // Outer rows have a txid and empty extra.
        assert!(!rows[0].txid.is_empty());
        assert_eq!(rows[0].extra, serde_json::json!({}));
        assert_eq!(rows[4].extra, serde_json::json!({}));
    }

    #[test]
    fn inner_blobs_are_pruned() {
        let app_call =
            app_create_with_inners(A, 1, vec![pay(APP_ADDR, B, 10), axfer(APP_ADDR, C, 4)]);
        let block = block_with(1, vec![app_call]);

        let rows = expand_payset(&block, &vec![]).unwrap();
        assert_eq!(rows.len(), 3);

        for row in &rows {
            let stored = encoding::decode_signed_txn(row.txn.clone()).unwrap();
            assert!(stored.apply_data.inner_txns.is_empty());
            assert!(!row.txn.to_string().contains("inner_txns"));
        }
    }

    #[test]
    fn nested_inners_link_to_outermost_ancestor() {
        let grandchild = pay(APP_ADDR, B, 1);
        let child = app_create_with_inners(APP_ADDR, 2, vec![grandchild]);
        let root = app_create_with_inners(A, 1, vec![child, pay(APP_ADDR, C, 2)]);
        let block = block_with(7, vec![root]);

        let rows = expand_payset(&block, &vec![]).unwrap();
        assert_eq!(rows.len(), 4);

        // Descendants come before siblings.
        assert_eq!(rows[1].typeenum, 6);
        assert_eq!(rows[2].typeenum, 1);
        assert_eq!(rows[3].typeenum, 1);

        for row in &rows[1..] {
            assert_eq!(row.extra["root-txid"], rows[0].txid.as_str());
            assert_eq!(row.extra["root-intra"], 0);
        }
    }

    #[test]
    fn missing_config_asset_is_fatal() {
        let mut bad_inner = asset_create(B, 0);
        bad_inner.signed_txn.sig = None;
        let app_call = app_create_with_inners(A, 1, vec![bad_inner]);
        let block = block_with(1, vec![app_call]);

        let err = expand_payset(&block, &vec![]).unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing ConfigAsset for transaction: "));
    }

    #[test]
    fn missing_application_id_is_fatal() {
        let mut app_call = app_create_with_inners(A, 1, vec![]);
        app_call.apply_data.application_id = 0;
        let block = block_with(1, vec![app_call]);

        let err = expand_payset(&block, &vec![]).unwrap_err();
        assert!(err
            .to_string()
            .contains("Missing ApplicationID for transaction: "));
    }

    #[test]
    fn referenced_ids_take_precedence_over_apply_data() {
        let mut reconfigure = asset_create(A, 0);
        if let TxnBody::AssetConfig { config_asset, .. } =
            &mut reconfigure.signed_txn.txn.body
        {
            *config_asset = 42;
        }
        let block = block_with(1, vec![reconfigure]);

        let rows = expand_payset(&block, &vec![]).unwrap();
        assert_eq!(rows[0].asset, 42);
    }

    #[test]
    fn pay_and_keyreg_have_no_asset() {
        let block = block_with(1, vec![pay(A, B, 10)]);
        let rows = expand_payset(&block, &vec![]).unwrap();
        assert_eq!(rows[0].asset, 0);
    }

    // The overlay supplies an asset close amount the on-block apply data
    // lacks; the stored blob stays the on-block transaction.
    #[test]
    fn asset_close_amount_overlay() {
        let onblock = axfer(A, B, 2);
        let mut modified = onblock.clone();
        modified.apply_data.asset_closing_amount = 3;
        let block = block_with(1, vec![onblock.clone()]);

        let rows = expand_payset(&block, &vec![modified]).unwrap();
        assert_eq!(rows[0].extra, serde_json::json!({ "aca": 3 }));

        let stored = encoding::decode_signed_txn(rows[0].txn.clone()).unwrap();
        assert_eq!(stored, onblock);
    }

    #[test]
    fn onblock_close_amount_is_not_duplicated_into_extra() {
        let mut onblock = axfer(A, B, 2);
        onblock.apply_data.asset_closing_amount = 7;
        let block = block_with(1, vec![onblock.clone()]);

        let rows = expand_payset(&block, &vec![onblock]).unwrap();
        assert_eq!(rows[0].extra, serde_json::json!({}));
    }

    #[test]
    fn modified_payset_length_mismatch_is_fatal() {
        let block = block_with(1, vec![pay(A, B, 10)]);
        let modified = vec![pay(A, B, 10), pay(A, C, 11)];
        assert!(expand_payset(&block, &modified).is_err());
    }

    #[test]
    fn empty_payset_yields_no_rows() {
        let block = block_with(2, vec![]);
        assert!(expand_payset(&block, &vec![]).unwrap().is_empty());
    }
}
