//! Writes blocks and accounting state deltas to the database.
//!
//! A [`Writer`] is bound to one serializable transaction: statements are
//! prepared on construction and released when it drops, so a writer must
//! never be reused across transactions. Transactions and participation
//! are written by free functions taking an existing transaction.

mod accounts;
mod batch;
mod participation;
mod statements;
mod transactions;

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tokio_postgres::Transaction as PgTransaction;

pub use participation::add_transaction_participation;
pub use transactions::add_transactions;

use crate::core::encoding;
use crate::core::types::Block;
use crate::core::types::StateDelta;
use crate::error::Error;
use batch::Batch;
use statements::Statements;

/// Header timestamp as UTC wall-clock time.
fn realtime(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}

pub struct Writer<'a, 'b> {
    pgtx: &'a PgTransaction<'b>,
    statements: Statements,
}

impl<'a, 'b> Writer<'a, 'b> {
    pub async fn new(pgtx: &'a PgTransaction<'b>) -> Result<Writer<'a, 'b>, Error> {
        let statements = Statements::prepare(pgtx).await?;
        Ok(Self { pgtx, statements })
    }

    /// Releases the prepared statements.
    pub fn close(self) {}

    fn queue_block_header(&self, block: &Block, batch: &mut Batch) -> Result<(), Error> {
        batch.queue(
            &self.statements.add_block_header,
            vec![
                Box::new(block.round() as i64),
                Box::new(realtime(block.header.timestamp)),
                Box::new(block.header.rewards.rewards_level as i64),
                Box::new(encoding::encode_block_header(&block.header)?),
            ],
        );
        Ok(())
    }

    fn queue_special_accounts(&self, block: &Block, batch: &mut Batch) -> Result<(), Error> {
        let addresses = block.special_addresses();
        batch.queue(
            &self.statements.set_special_accounts,
            vec![Box::new(encoding::encode_special_addresses(&addresses)?)],
        );
        Ok(())
    }

    /// Writes the genesis block: header and special addresses only, since
    /// no deltas exist yet.
    pub async fn add_block0(&self, block: &Block) -> Result<(), Error> {
        let mut batch = Batch::new();
        self.queue_block_header(block, &mut batch)?;
        self.queue_special_accounts(block, &mut batch)?;
        batch.flush(self.pgtx, "add_block0()").await
    }

    /// Writes the block header and accounting state delta, except for
    /// transactions and transaction participation. Those are written by
    /// [`add_transactions`] and [`add_transaction_participation`].
    pub async fn add_block(&self, block: &Block, delta: &StateDelta) -> Result<(), Error> {
        let round = block.round();
        tracing::trace!("writing block {round}");

        let mut batch = Batch::new();
        self.queue_block_header(block, &mut batch)?;
        self.queue_special_accounts(block, &mut batch)?;

        let sigtype_deltas = accounts::sig_type_deltas(&block.payset)?;
        accounts::write_accounts(
            round,
            &delta.accts,
            &sigtype_deltas,
            &self.statements,
            &mut batch,
        )?;
        accounts::write_deleted_creatables(round, &delta.creatables, &self.statements, &mut batch);
        accounts::write_deleted_asset_holdings(
            round,
            &delta.modified_asset_holdings,
            &self.statements,
            &mut batch,
        );
        accounts::write_deleted_app_local_states(
            round,
            &delta.modified_app_local_states,
            &self.statements,
            &mut batch,
        );
        batch.queue(
            &self.statements.update_account_totals,
            vec![Box::new(encoding::encode_account_totals(&delta.totals)?)],
        );

        batch.flush(self.pgtx, "add_block()").await
    }
}
