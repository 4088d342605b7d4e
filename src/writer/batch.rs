use futures::stream::FuturesOrdered;
use futures::StreamExt;
use tokio_postgres::types::ToSql;
use tokio_postgres::Statement;
use tokio_postgres::Transaction;

use crate::error::Error;

pub(crate) type SqlParam = Box<dyn ToSql + Send + Sync>;

/// Deferred statement invocations, submitted as one pipelined batch.
///
/// Statements are idempotent upserts keyed on their primary keys, so no
/// ordering guarantees are needed between different rows; for one row the
/// writer queues at most one statement per block.
pub(crate) struct Batch {
    items: Vec<(Statement, Vec<SqlParam>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn queue(&mut self, statement: &Statement, params: Vec<SqlParam>) {
        self.items.push((statement.clone(), params));
    }

    /// Submits all queued invocations and drains their results in order.
    ///
    /// Every result is drained even after a failure, so the connection is
    /// left clean; the first error wins and fails the whole batch.
    pub async fn flush(self, pgtx: &Transaction<'_>, scope: &'static str) -> Result<(), Error> {
        tracing::trace!("flushing batch of {} statements", self.len());

        let param_refs: Vec<Vec<&(dyn ToSql + Sync)>> = self
            .items
            .iter()
            .map(|(_, params)| {
                params
                    .iter()
                    .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                    .collect()
            })
            .collect();

        let mut pending: FuturesOrdered<_> = self
            .items
            .iter()
            .zip(param_refs.iter())
            .map(|((statement, _), refs)| pgtx.execute(statement, refs))
            .collect();

        let mut first_err = None;
        while let Some(result) = pending.next().await {
            if let Err(e) = result {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(source) => Err(Error::Sql { scope, source }),
            None => Ok(()),
        }
    }
}
