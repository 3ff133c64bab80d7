use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::error::{StoreError, StoreResult};
use crate::helpers::format_amount;
use crate::schema::{
    Comic, ComicFilter, ComicStatus, ComicUpdate, Creator, CreatorUpdate, NewComic, NewCreator,
    Transaction, TransactionFilter, Wallet, WalletType,
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Clamps optional paging parameters to `(limit, offset)`.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Failed to create SQLite connect options")?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database `{}`", database_url))?;
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same memory image.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Failed to create SQLite connect options")?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Database migration error")?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database is not reachable")?;
        Ok(())
    }

    // --- WALLETS ---

    /// Wallets are created lazily the first time a user touches them.
    pub async fn get_or_create_wallet(&self, user_id: &str) -> anyhow::Result<Wallet> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO wallets (user_id) VALUES (?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create wallet for user {}", user_id))?;
        if inserted.rows_affected() > 0 {
            log::info!("Created wallet for user {}", user_id);
        }

        self.get_wallet_by_user(user_id)
            .await?
            .with_context(|| format!("Wallet for user {} vanished after insert", user_id))
    }

    pub async fn get_wallet_by_user(&self, user_id: &str) -> anyhow::Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT * FROM wallets WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get wallet for user {}", user_id))?;
        Ok(wallet)
    }

    pub async fn connect_wallet(
        &self,
        user_id: &str,
        address: &str,
        wallet_type: WalletType,
    ) -> anyhow::Result<Wallet> {
        self.get_or_create_wallet(user_id).await?;
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET connected_wallet_address = ?,
                wallet_type = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?
            RETURNING *
            "#,
        )
        .bind(address)
        .bind(wallet_type.as_str())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to connect wallet for user {}", user_id))?;
        log::info!(
            "Connected {} wallet {} for user {}",
            wallet_type.as_str(),
            address,
            user_id
        );
        Ok(wallet)
    }

    // --- TRANSACTIONS ---

    pub async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> anyhow::Result<Vec<Transaction>> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM transactions WHERE user_id = ");
        query.push_bind(user_id);
        if let Some(kind) = filter.kind {
            query.push(" AND type = ").push_bind(kind.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let transactions = query
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to get transactions for user {}", user_id))?;
        Ok(transactions)
    }

    pub async fn get_transaction_by_external_id(
        &self,
        external_id: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions WHERE external_transaction_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get transaction {}", external_id))?;
        Ok(transaction)
    }

    // --- CREATORS ---

    pub async fn create_creator(&self, user_id: &str, creator: &NewCreator) -> StoreResult<Creator> {
        creator.validate()?;
        let saved = sqlx::query_as::<_, Creator>(
            r#"
            INSERT INTO creators (user_id, name, bio, avatar_url, wallet_address)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(creator.name.trim())
        .bind(&creator.bio)
        .bind(&creator.avatar_url)
        .bind(&creator.wallet_address)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert(e, format!("Creator profile for user {}", user_id)))?;
        log::info!("Created creator {} for user {}", saved.id, user_id);
        Ok(saved)
    }

    pub async fn get_creator(&self, creator_id: i64) -> anyhow::Result<Option<Creator>> {
        let creator = sqlx::query_as::<_, Creator>(
            r#"
            SELECT * FROM creators WHERE id = ?
            "#,
        )
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get creator with id {}", creator_id))?;
        Ok(creator)
    }

    pub async fn list_creators(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> anyhow::Result<Vec<Creator>> {
        let (limit, offset) = page_bounds(limit, offset);
        let creators = sqlx::query_as::<_, Creator>(
            r#"
            SELECT * FROM creators ORDER BY id DESC LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to get creators")?;
        Ok(creators)
    }

    pub async fn update_creator(
        &self,
        creator_id: i64,
        update: &CreatorUpdate,
    ) -> StoreResult<Creator> {
        update.validate()?;
        let creator = sqlx::query_as::<_, Creator>(
            r#"
            UPDATE creators
            SET name = COALESCE(?, name),
                bio = COALESCE(?, bio),
                avatar_url = COALESCE(?, avatar_url),
                wallet_address = COALESCE(?, wallet_address),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(update.name.as_deref().map(str::trim))
        .bind(&update.bio)
        .bind(&update.avatar_url)
        .bind(&update.wallet_address)
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Creator {}", creator_id)))?;
        Ok(creator)
    }

    // --- COMICS ---

    pub async fn create_comic(&self, comic: &NewComic) -> StoreResult<Comic> {
        comic.validate()?;
        let price = comic.price_nwt.unwrap_or_default();
        let status = comic.status.unwrap_or(ComicStatus::Draft);
        let saved = sqlx::query_as::<_, Comic>(
            r#"
            INSERT INTO comics (
                creator_id, title, description, cover_url, genre, status, price_nwt, ipfs_cid
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(comic.creator_id)
        .bind(comic.title.trim())
        .bind(&comic.description)
        .bind(&comic.cover_url)
        .bind(&comic.genre)
        .bind(status.as_str())
        .bind(format_amount(price))
        .bind(&comic.ipfs_cid)
        .fetch_one(&self.pool)
        .await?;
        log::info!("Created comic {} for creator {}", saved.id, saved.creator_id);
        Ok(saved)
    }

    pub async fn get_comic(&self, comic_id: i64) -> anyhow::Result<Option<Comic>> {
        let comic = sqlx::query_as::<_, Comic>(
            r#"
            SELECT * FROM comics WHERE id = ?
            "#,
        )
        .bind(comic_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get comic with id {}", comic_id))?;
        Ok(comic)
    }

    pub async fn list_comics(&self, filter: &ComicFilter) -> anyhow::Result<Vec<Comic>> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM comics WHERE 1 = 1");
        if let Some(creator_id) = filter.creator_id {
            query.push(" AND creator_id = ").push_bind(creator_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(genre) = &filter.genre {
            query.push(" AND genre = ").push_bind(genre.clone());
        }
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let comics = query
            .build_query_as::<Comic>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to get comics")?;
        Ok(comics)
    }

    pub async fn update_comic(&self, comic_id: i64, update: &ComicUpdate) -> StoreResult<Comic> {
        update.validate()?;
        let comic = sqlx::query_as::<_, Comic>(
            r#"
            UPDATE comics
            SET title = COALESCE(?, title),
                description = COALESCE(?, description),
                cover_url = COALESCE(?, cover_url),
                genre = COALESCE(?, genre),
                status = COALESCE(?, status),
                price_nwt = COALESCE(?, price_nwt),
                ipfs_cid = COALESCE(?, ipfs_cid),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(update.title.as_deref().map(str::trim))
        .bind(&update.description)
        .bind(&update.cover_url)
        .bind(&update.genre)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.price_nwt.map(format_amount))
        .bind(&update.ipfs_cid)
        .bind(comic_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Comic {}", comic_id)))?;
        Ok(comic)
    }
    pub async fn record_upload(
        &self,
        storage_key: &str,
        user_id: &str,
        size: usize,
        content_type: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (storage_key, user_id, size, content_type)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(storage_key)
        .bind(user_id)
        .bind(size as i64)
        .bind(content_type)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to record upload {}", storage_key))?;
        Ok(())
    }

    /// User that uploaded `storage_key`, if the key was stored by this service.
    pub async fn get_upload_owner(&self, storage_key: &str) -> anyhow::Result<Option<String>> {
        let owner = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM uploads WHERE storage_key = ?",
        )
        .bind(storage_key)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to get owner of upload {}", storage_key))?;
        Ok(owner)
    }

    pub async fn delete_upload(&self, storage_key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM uploads WHERE storage_key = ?")
            .bind(storage_key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete upload record {}", storage_key))?;
        Ok(())
    }
}
