mod comic;
mod creator;
mod transaction;
mod wallet;

pub use comic::*;
pub use creator::*;
pub use transaction::*;
pub use wallet::*;

use rust_decimal::Decimal;
use sqlx::{Row, sqlite::SqliteRow};

/// Amounts are stored as fixed-scale TEXT so SQLite never rounds them.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    crate::parse_amount(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

pub(crate) fn enum_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: anyhow::Error| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}
