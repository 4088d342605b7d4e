//! Maintains the `txn_participation` index: one row per address
//! semantically touched by a transaction.

use tokio_postgres::Transaction as PgTransaction;

use crate::core::types::Address;
use crate::core::types::Block;
use crate::core::types::Round;
use crate::core::types::SignedTxnWithApplyData;
use crate::core::types::Transaction;
use crate::core::types::TxnBody;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParticipationRow {
    pub addr: Address,
    pub round: Round,
    pub intra: i32,
}

fn add_address(addresses: &mut Vec<Address>, address: Address) {
    if !address.is_zero() && !addresses.contains(&address) {
        addresses.push(address);
    }
}

fn txn_addresses(txn: &Transaction, addresses: &mut Vec<Address>) {
    add_address(addresses, txn.sender);
    match &txn.body {
        TxnBody::Payment {
            receiver,
            close_remainder_to,
            ..
        } => {
            add_address(addresses, *receiver);
            add_address(addresses, *close_remainder_to);
        }
        TxnBody::AssetTransfer {
            asset_sender,
            asset_receiver,
            asset_close_to,
            ..
        } => {
            add_address(addresses, *asset_sender);
            add_address(addresses, *asset_receiver);
            add_address(addresses, *asset_close_to);
        }
        TxnBody::AssetFreeze { freeze_account, .. } => {
            add_address(addresses, *freeze_account);
        }
        TxnBody::AppCall { accounts, .. } => {
            for account in accounts {
                add_address(addresses, *account);
            }
        }
        TxnBody::Keyreg { .. } | TxnBody::AssetConfig { .. } => {}
    }
}

// A node's set covers its own addresses and every descendant's, so
// address queries find the outermost transaction.
fn subtree_addresses(node: &SignedTxnWithApplyData, addresses: &mut Vec<Address>) {
    txn_addresses(&node.signed_txn.txn, addresses);
    for inner in &node.apply_data.inner_txns {
        subtree_addresses(inner, addresses);
    }
}

// Mirrors the expander's pre-order intra assignment.
fn walk(
    round: Round,
    node: &SignedTxnWithApplyData,
    intra: &mut i32,
    rows: &mut Vec<ParticipationRow>,
) {
    let row_intra = *intra;
    *intra += 1;

    let mut addresses = Vec::new();
    subtree_addresses(node, &mut addresses);
    for addr in addresses {
        rows.push(ParticipationRow {
            addr,
            round,
            intra: row_intra,
        });
    }

    for inner in &node.apply_data.inner_txns {
        walk(round, inner, intra, rows);
    }
}

pub(crate) fn expand_participation(block: &Block) -> Vec<ParticipationRow> {
    let round = block.round();
    let mut rows = Vec::new();
    let mut intra: i32 = 0;
    for stxn in &block.payset {
        walk(round, stxn, &mut intra, &mut rows);
    }
    rows
}

/// Writes `txn_participation` rows for the block on the provided
/// transaction.
pub async fn add_transaction_participation(
    block: &Block,
    pgtx: &PgTransaction<'_>,
) -> Result<(), Error> {
    let scope = "add_transaction_participation()";
    let rows = expand_participation(block);
    tracing::trace!(
        "inserting {} participation rows for round {}",
        rows.len(),
        block.round()
    );

    let sql = "
        insert into txn_participation (addr, round, intra)
        values ($1, $2, $3)
        on conflict do nothing;";
    let statement = pgtx.prepare(sql).await.map_err(Error::sql(scope))?;
    for row in &rows {
        pgtx.execute(
            &statement,
            &[&row.addr.0.to_vec(), &(row.round as i64), &row.intra],
        )
        .await
        .map_err(Error::sql(scope))?;
    }

    Ok(())
}
