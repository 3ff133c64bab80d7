use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, sqlite::SqliteRow};

use super::{decimal_column, enum_column};
use crate::{StoreError, StoreResult};

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComicStatus {
    Draft,
    Published,
    Archived,
}

impl ComicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComicStatus::Draft => "draft",
            ComicStatus::Published => "published",
            ComicStatus::Archived => "archived",
        }
    }
}

impl FromStr for ComicStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ComicStatus::Draft),
            "published" => Ok(ComicStatus::Published),
            "archived" => Ok(ComicStatus::Archived),
            _ => Err(anyhow!("Unknown comic status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comic {
    pub id: i64,
    pub creator_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub cover_url: Option<String>,
    pub genre: Option<String>,
    pub status: ComicStatus,
    pub price_nwt: Decimal,
    pub ipfs_cid: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for Comic {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Comic {
            id: row.try_get("id")?,
            creator_id: row.try_get("creator_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            cover_url: row.try_get("cover_url")?,
            genre: row.try_get("genre")?,
            status: enum_column(row, "status")?,
            price_nwt: decimal_column(row, "price_nwt")?,
            ipfs_cid: row.try_get("ipfs_cid")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComic {
    pub creator_id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub status: Option<ComicStatus>,
    #[serde(default)]
    pub price_nwt: Option<Decimal>,
    #[serde(default)]
    pub ipfs_cid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub status: Option<ComicStatus>,
    #[serde(default)]
    pub price_nwt: Option<Decimal>,
    #[serde(default)]
    pub ipfs_cid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicFilter {
    #[serde(default)]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub status: Option<ComicStatus>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

fn check_title(title: &str) -> StoreResult<()> {
    let len = title.trim().chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(StoreError::Validation(format!(
            "Comic title must be between 1 and {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn check_price(price: Option<Decimal>) -> StoreResult<()> {
    if price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
        return Err(StoreError::Validation(
            "Comic price must not be negative".to_string(),
        ));
    }
    Ok(())
}

impl NewComic {
    pub fn validate(&self) -> StoreResult<()> {
        check_title(&self.title)?;
        check_price(self.price_nwt)
    }
}

impl ComicUpdate {
    pub fn validate(&self) -> StoreResult<()> {
        if let Some(title) = &self.title {
            check_title(title)?;
        }
        check_price(self.price_nwt)
    }
}
