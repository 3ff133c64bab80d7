use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{StoreError, StoreResult, validate_wallet_address};

const MAX_NAME_LEN: usize = 100;
const MAX_BIO_LEN: usize = 2000;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub wallet_address: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCreator {
    pub name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

fn check_name(name: &str) -> StoreResult<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(StoreError::Validation(format!(
            "Creator name must be between 1 and {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn check_bio(bio: Option<&str>) -> StoreResult<()> {
    if bio.is_some_and(|b| b.chars().count() > MAX_BIO_LEN) {
        return Err(StoreError::Validation(format!(
            "Creator bio must be at most {} characters",
            MAX_BIO_LEN
        )));
    }
    Ok(())
}

fn check_wallet(address: Option<&str>) -> StoreResult<()> {
    if let Some(address) = address {
        if !validate_wallet_address(address)? {
            return Err(StoreError::Validation("Invalid wallet address".to_string()));
        }
    }
    Ok(())
}

impl NewCreator {
    pub fn validate(&self) -> StoreResult<()> {
        check_name(&self.name)?;
        check_bio(self.bio.as_deref())?;
        check_wallet(self.wallet_address.as_deref())
    }
}

impl CreatorUpdate {
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(name) = &self.name {
            check_name(name)?;
        }
        check_bio(self.bio.as_deref())?;
        check_wallet(self.wallet_address.as_deref())
    }
}
