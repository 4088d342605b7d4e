//! Prepared statements backing the block writer.
//!
//! Deletion is modeled as an upsert whose payload zeroes the entity and
//! sets `deleted = true, closed_at = round`. This collapses create and
//! re-create into one primitive and makes a same-round create-then-delete
//! commute to the delete form, preserving `created_at = round`.

use tokio_postgres::Statement;
use tokio_postgres::Transaction;

use crate::error::Error;
use crate::store::metastate;

pub(crate) const ADD_BLOCK_HEADER: &str = "
    insert into block_header (round, realtime, rewards_level, header)
    values ($1, $2, $3, $4)
    on conflict do nothing;";

pub(crate) const UPSERT_ASSET: &str = "
    insert into asset (index, creator_addr, params, deleted, created_at)
    values ($1, $2, $3, false, $4)
    on conflict (index) do update
    set creator_addr = excluded.creator_addr
        , params = excluded.params
        , deleted = false;";

pub(crate) const UPSERT_ACCOUNT_ASSET: &str = "
    insert into account_asset (addr, assetid, amount, frozen, deleted, created_at)
    values ($1, $2, $3, $4, false, $5)
    on conflict (addr, assetid) do update
    set amount = excluded.amount
        , frozen = excluded.frozen
        , deleted = false;";

pub(crate) const UPSERT_APP: &str = "
    insert into app (index, creator, params, deleted, created_at)
    values ($1, $2, $3, false, $4)
    on conflict (index) do update
    set creator = excluded.creator
        , params = excluded.params
        , deleted = false;";

pub(crate) const UPSERT_ACCOUNT_APP: &str = "
    insert into account_app (addr, app, localstate, deleted, created_at)
    values ($1, $2, $3, false, $4)
    on conflict (addr, app) do update
    set localstate = excluded.localstate
        , deleted = false;";

pub(crate) const DELETE_ACCOUNT: &str = "
    insert into account
        (addr, microalgos, rewards_base, rewards_total, deleted, created_at, closed_at,
         account_data)
    values ($1, 0, 0, 0, true, $2, $2, 'null'::jsonb)
    on conflict (addr) do update
    set microalgos = excluded.microalgos
        , rewards_base = excluded.rewards_base
        , rewards_total = excluded.rewards_total
        , deleted = true
        , closed_at = excluded.closed_at
        , account_data = excluded.account_data;";

// Same as DELETE_ACCOUNT but also overwrites keytype.
pub(crate) const DELETE_ACCOUNT_UPDATE_KEYTYPE: &str = "
    insert into account
        (addr, microalgos, rewards_base, rewards_total, deleted, created_at, closed_at,
         keytype, account_data)
    values ($1, 0, 0, 0, true, $2, $2, $3, 'null'::jsonb)
    on conflict (addr) do update
    set microalgos = excluded.microalgos
        , rewards_base = excluded.rewards_base
        , rewards_total = excluded.rewards_total
        , deleted = true
        , closed_at = excluded.closed_at
        , keytype = excluded.keytype
        , account_data = excluded.account_data;";

pub(crate) const UPSERT_ACCOUNT: &str = "
    insert into account
        (addr, microalgos, rewards_base, rewards_total, deleted, created_at, account_data)
    values ($1, $2, $3, $4, false, $5, $6)
    on conflict (addr) do update
    set microalgos = excluded.microalgos
        , rewards_base = excluded.rewards_base
        , rewards_total = excluded.rewards_total
        , deleted = false
        , account_data = excluded.account_data;";

pub(crate) const UPSERT_ACCOUNT_WITH_KEYTYPE: &str = "
    insert into account
        (addr, microalgos, rewards_base, rewards_total, deleted, created_at, keytype,
         account_data)
    values ($1, $2, $3, $4, false, $5, $6, $7)
    on conflict (addr) do update
    set microalgos = excluded.microalgos
        , rewards_base = excluded.rewards_base
        , rewards_total = excluded.rewards_total
        , deleted = false
        , keytype = excluded.keytype
        , account_data = excluded.account_data;";

pub(crate) const DELETE_ASSET: &str = "
    insert into asset (index, creator_addr, params, deleted, created_at, closed_at)
    values ($1, $2, 'null'::jsonb, true, $3, $3)
    on conflict (index) do update
    set creator_addr = excluded.creator_addr
        , params = excluded.params
        , deleted = true
        , closed_at = excluded.closed_at;";

pub(crate) const DELETE_ACCOUNT_ASSET: &str = "
    insert into account_asset (addr, assetid, amount, frozen, deleted, created_at, closed_at)
    values ($1, $2, 0, false, true, $3, $3)
    on conflict (addr, assetid) do update
    set amount = excluded.amount
        , deleted = true
        , closed_at = excluded.closed_at;";

pub(crate) const DELETE_APP: &str = "
    insert into app (index, creator, params, deleted, created_at, closed_at)
    values ($1, $2, 'null'::jsonb, true, $3, $3)
    on conflict (index) do update
    set creator = excluded.creator
        , params = excluded.params
        , deleted = true
        , closed_at = excluded.closed_at;";

pub(crate) const DELETE_ACCOUNT_APP: &str = "
    insert into account_app (addr, app, localstate, deleted, created_at, closed_at)
    values ($1, $2, 'null'::jsonb, true, $3, $3)
    on conflict (addr, app) do update
    set localstate = excluded.localstate
        , deleted = true
        , closed_at = excluded.closed_at;";

fn set_special_accounts_sql() -> String {
    format!(
        "insert into metastate (k, v)
         values ('{}', $1)
         on conflict (k) do update set v = excluded.v;",
        metastate::SPECIAL_ACCOUNTS_KEY
    )
}

fn update_account_totals_sql() -> String {
    format!(
        "insert into metastate (k, v)
         values ('{}', $1)
         on conflict (k) do update set v = excluded.v;",
        metastate::ACCOUNT_TOTALS_KEY
    )
}

/// The writer's full statement set, bound to one transaction's lifetime.
///
/// Dropping the registry releases the prepared statements, so a registry
/// must never outlive the transaction it was prepared on.
pub(crate) struct Statements {
    pub add_block_header: Statement,
    pub set_special_accounts: Statement,
    pub upsert_asset: Statement,
    pub upsert_account_asset: Statement,
    pub upsert_app: Statement,
    pub upsert_account_app: Statement,
    pub delete_account: Statement,
    pub delete_account_update_keytype: Statement,
    pub upsert_account: Statement,
    pub upsert_account_with_keytype: Statement,
    pub delete_asset: Statement,
    pub delete_account_asset: Statement,
    pub delete_app: Statement,
    pub delete_account_app: Statement,
    pub update_account_totals: Statement,
}

impl Statements {
    pub async fn prepare(pgtx: &Transaction<'_>) -> Result<Self, Error> {
        let scope = "make_writer()";
        Ok(Self {
            add_block_header: pgtx
                .prepare(ADD_BLOCK_HEADER)
                .await
                .map_err(Error::sql(scope))?,
            set_special_accounts: pgtx
                .prepare(&set_special_accounts_sql())
                .await
                .map_err(Error::sql(scope))?,
            upsert_asset: pgtx.prepare(UPSERT_ASSET).await.map_err(Error::sql(scope))?,
            upsert_account_asset: pgtx
                .prepare(UPSERT_ACCOUNT_ASSET)
                .await
                .map_err(Error::sql(scope))?,
            upsert_app: pgtx.prepare(UPSERT_APP).await.map_err(Error::sql(scope))?,
            upsert_account_app: pgtx
                .prepare(UPSERT_ACCOUNT_APP)
                .await
                .map_err(Error::sql(scope))?,
            delete_account: pgtx
                .prepare(DELETE_ACCOUNT)
                .await
                .map_err(Error::sql(scope))?,
            delete_account_update_keytype: pgtx
                .prepare(DELETE_ACCOUNT_UPDATE_KEYTYPE)
                .await
                .map_err(Error::sql(scope))?,
            upsert_account: pgtx
                .prepare(UPSERT_ACCOUNT)
                .await
                .map_err(Error::sql(scope))?,
            upsert_account_with_keytype: pgtx
                .prepare(UPSERT_ACCOUNT_WITH_KEYTYPE)
                .await
                .map_err(Error::sql(scope))?,
            delete_asset: pgtx.prepare(DELETE_ASSET).await.map_err(Error::sql(scope))?,
            delete_account_asset: pgtx
                .prepare(DELETE_ACCOUNT_ASSET)
                .await
                .map_err(Error::sql(scope))?,
            delete_app: pgtx.prepare(DELETE_APP).await.map_err(Error::sql(scope))?,
            delete_account_app: pgtx
                .prepare(DELETE_ACCOUNT_APP)
                .await
                .map_err(Error::sql(scope))?,
            update_account_totals: pgtx
                .prepare(&update_account_totals_sql())
                .await
                .map_err(Error::sql(scope))?,
        })
    }
}
