//! Singleton key -> JSON store for global indexer state.

use serde_json::Value;
use tokio_postgres::GenericClient;

use crate::core::encoding;
use crate::core::types::AccountTotals;
use crate::core::types::Round;
use crate::core::types::SpecialAddresses;
use crate::error::Error;

pub const SPECIAL_ACCOUNTS_KEY: &str = "special_accounts";
pub const ACCOUNT_TOTALS_KEY: &str = "account_totals";
pub const NEXT_ROUND_KEY: &str = "next_round_to_account";

pub async fn get(client: &impl GenericClient, key: &str) -> Result<Option<Value>, Error> {
    tracing::trace!("get {key}");
    let qry = "select v from metastate where k = $1;";
    let row = client
        .query_opt(qry, &[&key])
        .await
        .map_err(Error::sql("metastate::get()"))?;
    Ok(row.map(|r| r.get(0)))
}

pub async fn set(client: &impl GenericClient, key: &str, value: &Value) -> Result<(), Error> {
    tracing::trace!("set {key}");
    let sql = "
        insert into metastate (k, v)
        values ($1, $2)
        on conflict (k) do update set v = excluded.v;";
    client
        .execute(sql, &[&key, value])
        .await
        .map_err(Error::sql("metastate::set()"))?;
    Ok(())
}

pub async fn special_addresses(
    client: &impl GenericClient,
) -> Result<Option<SpecialAddresses>, Error> {
    match get(client, SPECIAL_ACCOUNTS_KEY).await? {
        Some(value) => Ok(Some(encoding::decode_special_addresses(value)?)),
        None => Ok(None),
    }
}

pub async fn account_totals(client: &impl GenericClient) -> Result<Option<AccountTotals>, Error> {
    match get(client, ACCOUNT_TOTALS_KEY).await? {
        Some(value) => Ok(Some(encoding::decode_account_totals(value)?)),
        None => Ok(None),
    }
}

/// The round the writer expects next. None before schema bring-up.
pub async fn next_round_to_account(client: &impl GenericClient) -> Result<Option<Round>, Error> {
    match get(client, NEXT_ROUND_KEY).await? {
        Some(value) => {
            let round = value.as_u64().ok_or_else(|| Error::InvalidDelta {
                scope: "metastate::next_round_to_account()",
                msg: format!("malformed {NEXT_ROUND_KEY} value: {value}"),
            })?;
            Ok(Some(round))
        }
        None => Ok(None),
    }
}

pub async fn set_next_round_to_account(
    client: &impl GenericClient,
    round: Round,
) -> Result<(), Error> {
    set(client, NEXT_ROUND_KEY, &Value::from(round)).await
}
