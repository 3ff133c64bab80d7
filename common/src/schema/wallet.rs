use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use super::{decimal_column, enum_column};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Phantom,
    Metamask,
    Solflare,
    Walletconnect,
    Other,
}

impl WalletType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletType::Phantom => "phantom",
            WalletType::Metamask => "metamask",
            WalletType::Solflare => "solflare",
            WalletType::Walletconnect => "walletconnect",
            WalletType::Other => "other",
        }
    }
}

impl FromStr for WalletType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phantom" => Ok(WalletType::Phantom),
            "metamask" => Ok(WalletType::Metamask),
            "solflare" => Ok(WalletType::Solflare),
            "walletconnect" => Ok(WalletType::Walletconnect),
            "other" => Ok(WalletType::Other),
            _ => Err(anyhow!("Unknown wallet type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: i64,
    pub user_id: String,
    pub nwt_balance: Decimal,
    pub total_earned: Decimal,
    pub total_spent: Decimal,
    pub connected_wallet_address: Option<String>,
    pub wallet_type: Option<WalletType>,
    #[serde(skip)]
    pub version: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for Wallet {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let wallet_type = match row.try_get::<Option<String>, _>("wallet_type")? {
            Some(_) => Some(enum_column(row, "wallet_type")?),
            None => None,
        };
        Ok(Wallet {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            nwt_balance: decimal_column(row, "nwt_balance")?,
            total_earned: decimal_column(row, "total_earned")?,
            total_spent: decimal_column(row, "total_spent")?,
            connected_wallet_address: row.try_get("connected_wallet_address")?,
            wallet_type,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Balance check recomputed from completed transactions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub wallet_id: i64,
    pub stored: Decimal,
    pub computed: Decimal,
    pub consistent: bool,
}
