use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use super::{decimal_column, enum_column};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Spend,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Spend => "spend",
        }
    }
}

impl FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "spend" => Ok(TransactionType::Spend),
            _ => Err(anyhow!("Unknown transaction type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            _ => Err(anyhow!("Unknown transaction status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Crypto,
    Wallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Crypto => "crypto",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "crypto" => Ok(PaymentMethod::Crypto),
            "wallet" => Ok(PaymentMethod::Wallet),
            _ => Err(anyhow!("Unknown payment method: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub wallet_id: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub external_transaction_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub description: Option<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub metadata: Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for Transaction {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let payment_method = match row.try_get::<Option<String>, _>("payment_method")? {
            Some(_) => Some(enum_column(row, "payment_method")?),
            None => None,
        };
        let raw_metadata: String = row.try_get("metadata")?;
        let metadata =
            serde_json::from_str(&raw_metadata).map_err(|e| sqlx::Error::ColumnDecode {
                index: "metadata".to_string(),
                source: Box::new(e),
            })?;

        Ok(Transaction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            wallet_id: row.try_get("wallet_id")?,
            kind: enum_column(row, "type")?,
            amount: decimal_column(row, "amount")?,
            status: enum_column(row, "status")?,
            external_transaction_id: row.try_get("external_transaction_id")?,
            payment_method,
            description: row.try_get("description")?,
            reference_id: row.try_get("reference_id")?,
            reference_type: row.try_get("reference_type")?,
            metadata,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Input for a purchase that waits for a payment provider to confirm it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchase {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub external_transaction_id: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSpend {
    pub amount: Decimal,
    pub description: String,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
}

/// What a payment provider reported for a pending purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl SettlementOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            SettlementOutcome::Completed => TransactionStatus::Completed,
            SettlementOutcome::Failed => TransactionStatus::Failed,
            SettlementOutcome::Cancelled => TransactionStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    /// False when the transaction had already left `pending`.
    pub applied: bool,
    pub transaction: Transaction,
    pub wallet: Option<super::Wallet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    #[serde(default, rename = "type")]
    pub kind: Option<TransactionType>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Shallow-merges `patch` into `base`; non-object values replace `base`.
pub fn merge_metadata(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (key, value) in patch {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, patch) => patch.clone(),
    }
}
