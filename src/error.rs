use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::core::types::{Address, Round};

/// Failures surfaced by the block writer.
///
/// Only [`Error::is_transient`] failures may be recovered by retrying the
/// whole block; everything else aborts the block atomically.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{scope} encoding err: {source}")]
    Encoding {
        scope: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing ConfigAsset for transaction: round {round} intra {intra}")]
    MissingConfigAsset { round: Round, intra: i32 },

    #[error("Missing ApplicationID for transaction: round {round} intra {intra}")]
    MissingApplicationId { round: Round, intra: i32 },

    #[error("{scope} err: unable to determine the signature type of sender {sender}")]
    UnknownSigType {
        scope: &'static str,
        sender: Address,
    },

    /// Caller handed the writer inconsistent inputs. Never silently corrected.
    #[error("{scope} err: {msg}")]
    InvalidDelta { scope: &'static str, msg: String },

    #[error("{scope} sql err: {source}")]
    Sql {
        scope: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },
}

impl Error {
    /// Wraps a database error with the scope it occurred in.
    pub(crate) fn sql(scope: &'static str) -> impl FnOnce(tokio_postgres::Error) -> Error {
        move |source| Error::Sql { scope, source }
    }

    pub(crate) fn encoding(scope: &'static str) -> impl FnOnce(serde_json::Error) -> Error {
        move |source| Error::Encoding { scope, source }
    }

    /// True for serialization and deadlock failures, which are safe to
    /// retry with a fresh transaction.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Sql { source, .. } => matches!(
                source.code(),
                Some(code)
                    if *code == SqlState::T_R_SERIALIZATION_FAILURE
                        || *code == SqlState::T_R_DEADLOCK_DETECTED
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_asset_message() {
        let err = Error::MissingConfigAsset { round: 1, intra: 3 };
        assert!(err
            .to_string()
            .contains("Missing ConfigAsset for transaction: "));
    }

    #[test]
    fn missing_application_id_message() {
        let err = Error::MissingApplicationId { round: 1, intra: 0 };
        assert!(err
            .to_string()
            .contains("Missing ApplicationID for transaction: "));
    }

    #[test]
    fn invalid_delta_is_not_transient() {
        let err = Error::InvalidDelta {
            scope: "add_block()",
            msg: "round mismatch".to_string(),
        };
        assert!(!err.is_transient());
    }
}
