use rust_decimal::Decimal;
use thiserror::Error;

/// Domain outcomes of ledger and catalog operations that callers map onto
/// client-facing responses.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Wallet was modified concurrently, please retry")]
    Conflict,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// SQLITE_BUSY, SQLITE_LOCKED and SQLITE_BUSY_SNAPSHOT.
const SQLITE_CONTENTION_CODES: [&str; 3] = ["5", "6", "517"];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err
                    .code()
                    .is_some_and(|code| SQLITE_CONTENTION_CODES.contains(&&*code)) =>
            {
                StoreError::Conflict
            }
            _ => StoreError::Database(err),
        }
    }
}

impl StoreError {
    pub(crate) fn from_insert(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::Duplicate(what.into())
            }
            _ => StoreError::from(err),
        }
    }
}
