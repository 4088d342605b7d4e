//! Per-block transaction lifecycle.
//!
//! Blocks are written sequentially in round order, each inside one
//! serializable transaction, so readers never observe a partially
//! written block. Serialization conflicts restart the whole block with
//! a fresh transaction.

pub mod metastate;

use std::time::Duration;

use tokio_postgres::Client;
use tokio_postgres::IsolationLevel;
use tokio_postgres::NoTls;
use tokio_postgres::Transaction as PgTransaction;

use crate::config::PostgresConfig;
use crate::core::types::Block;
use crate::core::types::Payset;
use crate::core::types::Round;
use crate::core::types::StateDelta;
use crate::error::Error;
use crate::writer::add_transaction_participation;
use crate::writer::add_transactions;
use crate::writer::Writer;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_BASE_MS: u64 = 50;

/// Whether a failed attempt should be retried, and after how long.
fn retry_after(e: &Error, attempt: u32) -> Option<Duration> {
    if e.is_transient() && attempt + 1 < MAX_ATTEMPTS {
        Some(Duration::from_millis(BACKOFF_BASE_MS << attempt))
    } else {
        None
    }
}

pub struct Store {
    client: Client,
}

impl Store {
    /// Connects and brings up the schema if needed.
    pub async fn new(pgconf: &PostgresConfig) -> Result<Self, Error> {
        tracing::debug!("initializing store");
        let scope = "Store::new()";

        let (mut client, connection) = tokio_postgres::connect(&pgconf.connection_uri, NoTls)
            .await
            .map_err(Error::sql(scope))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("connection error: {e}");
            }
        });

        init_schema(&mut client).await?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The round the store expects next.
    pub async fn next_round(&self) -> Result<Round, Error> {
        metastate::next_round_to_account(&self.client)
            .await?
            .ok_or_else(|| Error::InvalidDelta {
                scope: "next_round()",
                msg: "schema not initialized".to_string(),
            })
    }

    /// Writes the genesis block: header and special addresses only, since
    /// no deltas exist yet.
    pub async fn add_block0(&mut self, block: &Block) -> Result<(), Error> {
        for attempt in 0u32.. {
            match self.try_add_block0(block).await {
                Ok(()) => return Ok(()),
                Err(e) => match retry_after(&e, attempt) {
                    Some(backoff) => {
                        tracing::warn!("add_block0() conflict, retrying in {backoff:?}: {e}");
                        tokio::time::sleep(backoff).await;
                    }
                    None => return Err(e),
                },
            }
        }
        unreachable!()
    }

    /// Atomically writes a block: header, special addresses, account and
    /// creatable projections, account totals, transactions and
    /// participation. On commit the block becomes visible as a whole.
    ///
    /// `modified_txns` is the payset with externally supplied apply data
    /// overlaid (notably the asset close amount).
    ///
    /// Dropping the returned future aborts at the next database round
    /// trip; the open transaction never commits and no partial write is
    /// visible.
    pub async fn add_block(
        &mut self,
        block: &Block,
        modified_txns: &Payset,
        delta: &StateDelta,
    ) -> Result<(), Error> {
        for attempt in 0u32.. {
            match self.try_add_block(block, modified_txns, delta).await {
                Ok(()) => return Ok(()),
                Err(e) => match retry_after(&e, attempt) {
                    Some(backoff) => {
                        tracing::warn!("add_block() conflict, retrying in {backoff:?}: {e}");
                        tokio::time::sleep(backoff).await;
                    }
                    None => return Err(e),
                },
            }
        }
        unreachable!()
    }

    async fn try_add_block0(&mut self, block: &Block) -> Result<(), Error> {
        let pgtx = self.serializable_tx("add_block0()").await?;
        check_round(&pgtx, block.round()).await?;

        let writer = Writer::new(&pgtx).await?;
        writer.add_block0(block).await?;
        writer.close();

        metastate::set_next_round_to_account(&pgtx, block.round() + 1).await?;
        pgtx.commit().await.map_err(Error::sql("add_block0()"))
    }

    async fn try_add_block(
        &mut self,
        block: &Block,
        modified_txns: &Payset,
        delta: &StateDelta,
    ) -> Result<(), Error> {
        let pgtx = self.serializable_tx("add_block()").await?;
        check_round(&pgtx, block.round()).await?;

        let writer = Writer::new(&pgtx).await?;
        writer.add_block(block, delta).await?;
        writer.close();

        add_transactions(block, modified_txns, &pgtx).await?;
        add_transaction_participation(block, &pgtx).await?;

        metastate::set_next_round_to_account(&pgtx, block.round() + 1).await?;
        pgtx.commit().await.map_err(Error::sql("add_block()"))
    }

    async fn serializable_tx(&mut self, scope: &'static str) -> Result<PgTransaction<'_>, Error> {
        self.client
            .build_transaction()
            .isolation_level(IsolationLevel::Serializable)
            .start()
            .await
            .map_err(Error::sql(scope))
    }
}

/// Enforces sequential rounds. Re-writing the previous round is allowed:
/// all block statements are idempotent, so a replay converges to the same
/// state.
async fn check_round(pgtx: &PgTransaction<'_>, round: Round) -> Result<(), Error> {
    if let Some(next) = metastate::next_round_to_account(pgtx).await? {
        if round != next && round + 1 != next {
            return Err(Error::InvalidDelta {
                scope: "check_round()",
                msg: format!("block round {round} does not match next round to account {next}"),
            });
        }
    }
    Ok(())
}

/// Loads the schema on first connect. Keyed on table presence since all
/// relations live in the public schema.
async fn init_schema(client: &mut Client) -> Result<(), Error> {
    let scope = "init_schema()";
    if table_exists(client, "block_header").await? {
        return Ok(());
    }
    tracing::debug!("loading schema");
    let pgtx = client.transaction().await.map_err(Error::sql(scope))?;
    pgtx.batch_execute(include_str!("store/schema.sql"))
        .await
        .map_err(Error::sql(scope))?;
    pgtx.commit().await.map_err(Error::sql(scope))
}

async fn table_exists(client: &Client, name: &str) -> Result<bool, Error> {
    let qry = "
    select exists(
        select table_name
        from information_schema.tables
        where table_schema = 'public' and table_name = $1
    );";
    let row = client
        .query_one(qry, &[&name])
        .await
        .map_err(Error::sql("table_exists()"))?;
    Ok(row.get(0))
}
