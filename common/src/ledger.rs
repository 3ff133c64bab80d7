use rust_decimal::Decimal;
use serde_json::{Value, json};
use sqlx::SqliteConnection;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::helpers::{MAX_AMOUNT, MAX_TOTAL, format_amount, normalize_amount};
use crate::schema::{
    NewPurchase, NewSpend, PaymentMethod, Reconciliation, Settlement, SettlementOutcome,
    Transaction, TransactionStatus, TransactionType, Wallet, merge_metadata,
};

/// Lost compare-and-swap races are retried this many times before the
/// caller sees [`StoreError::Conflict`].
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, serde::Serialize)]
pub struct SpendReceipt {
    pub wallet: Wallet,
    pub transaction: Transaction,
}

fn positive_amount(amount: Decimal) -> StoreResult<Decimal> {
    let amount = normalize_amount(amount);
    if amount <= Decimal::ZERO {
        return Err(StoreError::InvalidAmount);
    }
    if amount > MAX_AMOUNT {
        return Err(StoreError::Validation(format!(
            "amount must not exceed {} NWT",
            MAX_AMOUNT
        )));
    }
    Ok(amount)
}

fn add_to_total(total: Decimal, amount: Decimal) -> StoreResult<Decimal> {
    total
        .checked_add(amount)
        .filter(|sum| *sum <= MAX_TOTAL)
        .ok_or_else(|| {
            StoreError::Validation(format!("wallet totals must not exceed {} NWT", MAX_TOTAL))
        })
}

fn subtract_from_total(total: Decimal, amount: Decimal) -> StoreResult<Decimal> {
    total
        .checked_sub(amount)
        .ok_or_else(|| StoreError::Validation("wallet total underflowed".to_string()))
}

async fn fetch_wallet(conn: &mut SqliteConnection, wallet_id: i64) -> StoreResult<Wallet> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = ?")
        .bind(wallet_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Wallet {}", wallet_id)))
}

/// Writes new balance totals only if nobody else touched the wallet since
/// `wallet` was read.
async fn write_wallet_totals(
    conn: &mut SqliteConnection,
    wallet: &Wallet,
    balance: Decimal,
    total_earned: Decimal,
    total_spent: Decimal,
) -> StoreResult<Wallet> {
    sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET nwt_balance = ?,
            total_earned = ?,
            total_spent = ?,
            version = version + 1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND version = ?
        RETURNING *
        "#,
    )
    .bind(format_amount(balance))
    .bind(format_amount(total_earned))
    .bind(format_amount(total_spent))
    .bind(wallet.id)
    .bind(wallet.version)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::Conflict)
}

impl Database {
    /// Records a purchase that stays `pending` until its payment provider
    /// confirms it through [`Database::settle_purchase`].
    pub async fn create_purchase(
        &self,
        user_id: &str,
        purchase: &NewPurchase,
    ) -> StoreResult<Transaction> {
        let amount = positive_amount(purchase.amount)?;
        let external_id = purchase.external_transaction_id.trim();
        if external_id.is_empty() {
            return Err(StoreError::Validation(
                "externalTransactionId must not be empty".to_string(),
            ));
        }
        if purchase.payment_method == PaymentMethod::Wallet {
            return Err(StoreError::Validation(
                "purchases must be paid by card or crypto".to_string(),
            ));
        }

        let wallet = self.get_or_create_wallet(user_id).await?;
        let metadata = purchase.metadata.clone().unwrap_or_else(|| json!({}));

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                user_id, wallet_id, type, amount, status,
                external_transaction_id, payment_method, metadata
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(wallet.id)
        .bind(TransactionType::Purchase.as_str())
        .bind(format_amount(amount))
        .bind(TransactionStatus::Pending.as_str())
        .bind(external_id)
        .bind(purchase.payment_method.as_str())
        .bind(metadata.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            StoreError::from_insert(e, format!("Transaction with external id {}", external_id))
        })?;

        log::info!(
            "Created pending {} purchase {} of {} NWT for user {}",
            purchase.payment_method.as_str(),
            external_id,
            transaction.amount,
            user_id
        );
        Ok(transaction)
    }

    /// Moves a pending purchase to its final status. Completion credits the
    /// wallet in the same database transaction as the status change.
    /// Transactions that already left `pending` are returned untouched with
    /// `applied == false`.
    pub async fn settle_purchase(
        &self,
        external_id: &str,
        outcome: SettlementOutcome,
        metadata: &Value,
    ) -> StoreResult<Settlement> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.try_settle_purchase(external_id, outcome, metadata).await {
                Err(StoreError::Conflict) => {
                    log::warn!(
                        "Settlement of {} lost a write race (attempt {}/{})",
                        external_id,
                        attempt,
                        MAX_WRITE_ATTEMPTS
                    );
                }
                other => return other,
            }
        }
        Err(StoreError::Conflict)
    }

    async fn try_settle_purchase(
        &self,
        external_id: &str,
        outcome: SettlementOutcome,
        metadata: &Value,
    ) -> StoreResult<Settlement> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE external_transaction_id = ?",
        )
        .bind(external_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("Transaction {}", external_id)))?;

        if transaction.status != TransactionStatus::Pending {
            log::info!(
                "Ignoring settlement of {}: status is already {}",
                external_id,
                transaction.status.as_str()
            );
            return Ok(Settlement {
                applied: false,
                transaction,
                wallet: None,
            });
        }

        let merged = merge_metadata(&transaction.metadata, metadata);
        let claimed = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = ?, metadata = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(outcome.status().as_str())
        .bind(merged.to_string())
        .bind(transaction.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(claimed) = claimed else {
            return Ok(Settlement {
                applied: false,
                transaction,
                wallet: None,
            });
        };

        let wallet = match outcome {
            SettlementOutcome::Completed => {
                let wallet = fetch_wallet(&mut tx, claimed.wallet_id).await?;
                let balance = add_to_total(wallet.nwt_balance, claimed.amount)?;
                let earned = add_to_total(wallet.total_earned, claimed.amount)?;
                let updated =
                    write_wallet_totals(&mut tx, &wallet, balance, earned, wallet.total_spent)
                        .await?;
                Some(updated)
            }
            SettlementOutcome::Failed | SettlementOutcome::Cancelled => None,
        };

        tx.commit().await?;

        match &wallet {
            Some(wallet) => log::info!(
                "Settled purchase {}: credited {} NWT, balance now {}",
                external_id,
                claimed.amount,
                wallet.nwt_balance
            ),
            None => log::info!(
                "Purchase {} finished as {}",
                external_id,
                claimed.status.as_str()
            ),
        }

        Ok(Settlement {
            applied: true,
            transaction: claimed,
            wallet,
        })
    }

    /// Debits the wallet and records a completed spend atomically.
    pub async fn spend(&self, user_id: &str, spend: &NewSpend) -> StoreResult<SpendReceipt> {
        let amount = positive_amount(spend.amount)?;
        if spend.description.trim().is_empty() {
            return Err(StoreError::Validation(
                "description must not be empty".to_string(),
            ));
        }

        let wallet = self.get_or_create_wallet(user_id).await?;
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.try_spend(wallet.id, user_id, amount, spend).await {
                Err(StoreError::Conflict) => {
                    log::warn!(
                        "Spend for user {} lost a write race (attempt {}/{})",
                        user_id,
                        attempt,
                        MAX_WRITE_ATTEMPTS
                    );
                }
                other => return other,
            }
        }
        Err(StoreError::Conflict)
    }

    async fn try_spend(
        &self,
        wallet_id: i64,
        user_id: &str,
        amount: Decimal,
        spend: &NewSpend,
    ) -> StoreResult<SpendReceipt> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let wallet = fetch_wallet(&mut tx, wallet_id).await?;
        if wallet.nwt_balance < amount {
            return Err(StoreError::InsufficientBalance {
                available: wallet.nwt_balance,
                requested: amount,
            });
        }

        let balance = subtract_from_total(wallet.nwt_balance, amount)?;
        let spent = add_to_total(wallet.total_spent, amount)?;
        let wallet =
            write_wallet_totals(&mut tx, &wallet, balance, wallet.total_earned, spent).await?;

        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                user_id, wallet_id, type, amount, status, payment_method,
                description, reference_id, reference_type
            ) VALUES (?, ?, ?, ?, ?, 'wallet', ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(wallet.id)
        .bind(TransactionType::Spend.as_str())
        .bind(format_amount(amount))
        .bind(TransactionStatus::Completed.as_str())
        .bind(spend.description.trim())
        .bind(&spend.reference_id)
        .bind(&spend.reference_type)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        log::info!(
            "User {} spent {} NWT on {:?}/{:?}, balance now {}",
            user_id,
            amount,
            spend.reference_type,
            spend.reference_id,
            wallet.nwt_balance
        );
        Ok(SpendReceipt {
            wallet,
            transaction,
        })
    }

    /// Recomputes the balance from completed transactions.
    pub async fn reconcile_wallet(&self, user_id: &str) -> StoreResult<Reconciliation> {
        let wallet = self
            .get_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Wallet for user {}", user_id)))?;

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT type, amount FROM transactions
            WHERE wallet_id = ? AND status = 'completed'
            "#,
        )
        .bind(wallet.id)
        .fetch_all(&self.pool)
        .await?;

        let mut computed = Decimal::ZERO;
        for (kind, amount) in rows {
            let amount = crate::parse_amount(&amount)?;
            let next = match kind.parse::<TransactionType>()? {
                TransactionType::Purchase => computed.checked_add(amount),
                TransactionType::Spend => computed.checked_sub(amount),
            };
            computed = next.ok_or_else(|| {
                StoreError::Validation(format!(
                    "ledger of wallet {} does not fit a decimal",
                    wallet.id
                ))
            })?;
        }
        let computed = normalize_amount(computed);

        let consistent = computed == wallet.nwt_balance;
        if !consistent {
            log::warn!(
                "Wallet {} is out of balance: stored {}, computed {}",
                wallet.id,
                wallet.nwt_balance,
                computed
            );
        }
        Ok(Reconciliation {
            wallet_id: wallet.id,
            stored: wallet.nwt_balance,
            computed,
            consistent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(external_id: &str, amount: &str) -> NewPurchase {
        NewPurchase {
            amount: amount.parse().unwrap(),
            payment_method: PaymentMethod::Card,
            external_transaction_id: external_id.to_string(),
            metadata: Some(json!({"source": "test"})),
        }
    }

    fn spend(amount: &str) -> NewSpend {
        NewSpend {
            amount: amount.parse().unwrap(),
            description: "Unlock issue".to_string(),
            reference_id: Some("42".to_string()),
            reference_type: Some("comic".to_string()),
        }
    }

    async fn funded(db: &Database, user_id: &str, amount: &str) {
        let external_id = format!("fund-{}", user_id);
        db.create_purchase(user_id, &purchase(&external_id, amount))
            .await
            .unwrap();
        db.settle_purchase(&external_id, SettlementOutcome::Completed, &Value::Null)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn n_completed_purchases_credit_n_times_amount() {
        let db = Database::in_memory().await.unwrap();
        for i in 0..5 {
            let external_id = format!("pi_{}", i);
            db.create_purchase("alice", &purchase(&external_id, "12.5"))
                .await
                .unwrap();
            let settlement = db
                .settle_purchase(
                    &external_id,
                    SettlementOutcome::Completed,
                    &json!({"charge": i}),
                )
                .await
                .unwrap();
            assert!(settlement.applied);
            assert_eq!(settlement.transaction.status, TransactionStatus::Completed);
            assert_eq!(settlement.transaction.metadata["source"], "test");
            assert_eq!(settlement.transaction.metadata["charge"], i);
        }

        let wallet = db.get_wallet_by_user("alice").await.unwrap().unwrap();
        assert_eq!(wallet.nwt_balance.to_string(), "62.50000000");
        assert_eq!(wallet.total_earned.to_string(), "62.50000000");
        assert!(db.reconcile_wallet("alice").await.unwrap().consistent);
    }

    #[tokio::test]
    async fn second_settlement_is_a_no_op() {
        let db = Database::in_memory().await.unwrap();
        db.create_purchase("bob", &purchase("helio_1", "10"))
            .await
            .unwrap();

        let first = db
            .settle_purchase("helio_1", SettlementOutcome::Completed, &Value::Null)
            .await
            .unwrap();
        let again = db
            .settle_purchase("helio_1", SettlementOutcome::Completed, &Value::Null)
            .await
            .unwrap();
        let late_failure = db
            .settle_purchase("helio_1", SettlementOutcome::Failed, &Value::Null)
            .await
            .unwrap();

        assert!(first.applied);
        assert!(!again.applied);
        assert!(!late_failure.applied);
        assert_eq!(late_failure.transaction.status, TransactionStatus::Completed);

        let wallet = db.get_wallet_by_user("bob").await.unwrap().unwrap();
        assert_eq!(wallet.nwt_balance, Decimal::from(10));
    }

    #[tokio::test]
    async fn failed_purchase_leaves_balance_alone() {
        let db = Database::in_memory().await.unwrap();
        db.create_purchase("carol", &purchase("pi_fail", "10"))
            .await
            .unwrap();
        let settlement = db
            .settle_purchase("pi_fail", SettlementOutcome::Failed, &json!({"reason": "declined"}))
            .await
            .unwrap();
        assert!(settlement.applied);
        assert!(settlement.wallet.is_none());
        assert_eq!(settlement.transaction.status, TransactionStatus::Failed);

        let wallet = db.get_wallet_by_user("carol").await.unwrap().unwrap();
        assert!(wallet.nwt_balance.is_zero());
    }

    #[tokio::test]
    async fn unknown_and_duplicate_external_ids() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(
            db.settle_purchase("missing", SettlementOutcome::Completed, &Value::Null)
                .await,
            Err(StoreError::NotFound(_))
        ));

        db.create_purchase("dave", &purchase("pi_dup", "1"))
            .await
            .unwrap();
        assert!(matches!(
            db.create_purchase("dave", &purchase("pi_dup", "1")).await,
            Err(StoreError::Duplicate(_))
        ));
        assert!(matches!(
            db.create_purchase("dave", &purchase("pi_zero", "0")).await,
            Err(StoreError::InvalidAmount)
        ));
    }

    #[tokio::test]
    async fn spend_checks_amount_and_balance() {
        let db = Database::in_memory().await.unwrap();
        funded(&db, "erin", "5").await;

        assert!(matches!(
            db.spend("erin", &spend("0")).await,
            Err(StoreError::InvalidAmount)
        ));
        assert!(matches!(
            db.spend("erin", &spend("-2")).await,
            Err(StoreError::InvalidAmount)
        ));
        assert!(matches!(
            db.spend("erin", &spend("5.00000001")).await,
            Err(StoreError::InsufficientBalance { .. })
        ));

        let receipt = db.spend("erin", &spend("3.25")).await.unwrap();
        assert_eq!(receipt.wallet.nwt_balance.to_string(), "1.75000000");
        assert_eq!(receipt.wallet.total_spent.to_string(), "3.25000000");
        assert_eq!(receipt.transaction.kind, TransactionType::Spend);
        assert_eq!(receipt.transaction.status, TransactionStatus::Completed);
        assert_eq!(receipt.transaction.reference_type.as_deref(), Some("comic"));

        let reconciliation = db.reconcile_wallet("erin").await.unwrap();
        assert!(reconciliation.consistent);
        assert_eq!(reconciliation.computed.to_string(), "1.75000000");
    }

    #[tokio::test]
    async fn stale_wallet_version_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        funded(&db, "frank", "10").await;
        let stale = db.get_wallet_by_user("frank").await.unwrap().unwrap();
        db.spend("frank", &spend("1")).await.unwrap();

        let mut conn = db.pool.acquire().await.unwrap();
        let result = write_wallet_totals(
            &mut conn,
            &stale,
            Decimal::from(100),
            stale.total_earned,
            stale.total_spent,
        )
        .await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn amounts_above_the_cap_are_rejected() {
        let db = Database::in_memory().await.unwrap();
        funded(&db, "hank", "5").await;

        let huge = "50000000000000000000000000000";
        assert!(matches!(
            db.create_purchase("hank", &purchase("pi_huge", huge)).await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.create_purchase("hank", &purchase("pi_cap", "1000000000.00000001"))
                .await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.spend("hank", &spend(huge)).await,
            Err(StoreError::Validation(_))
        ));
        db.create_purchase("hank", &purchase("pi_max", "1000000000"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn settlement_past_the_total_ceiling_rolls_back() {
        let db = Database::in_memory().await.unwrap();
        funded(&db, "ivy", "1").await;
        sqlx::query(
            "UPDATE wallets SET nwt_balance = ?, total_earned = ?, total_spent = ? WHERE user_id = ?",
        )
        .bind("999999999999999999.00000000")
        .bind("999999999999999999.00000000")
        .bind("999999999999999999.50000000")
        .bind("ivy")
        .execute(&db.pool)
        .await
        .unwrap();
        let before = db.get_wallet_by_user("ivy").await.unwrap().unwrap();

        db.create_purchase("ivy", &purchase("pi_over", "5"))
            .await
            .unwrap();
        assert!(matches!(
            db.settle_purchase("pi_over", SettlementOutcome::Completed, &Value::Null)
                .await,
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.spend("ivy", &spend("1")).await,
            Err(StoreError::Validation(_))
        ));

        let pending = db
            .get_transaction_by_external_id("pi_over")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);
        let after = db.get_wallet_by_user("ivy").await.unwrap().unwrap();
        assert_eq!(after.nwt_balance, before.nwt_balance);
        assert_eq!(after.total_spent, before.total_spent);
        assert_eq!(after.version, before.version);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_spends_on_a_shared_file_never_overdraw() {
        let path = std::env::temp_dir().join(format!("nwt-ledger-{}.sqlite", uuid::Uuid::new_v4()));
        let db = Database::new(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        db.migrate().await.unwrap();
        let db = std::sync::Arc::new(db);
        funded(&db, "gina", "100").await;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let db = db.clone();
            handles.push(tokio::spawn(
                async move { db.spend("gina", &spend("3")).await },
            ));
        }
        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(StoreError::InsufficientBalance { .. }) => {}
                Err(other) => panic!("unexpected spend failure: {other}"),
            }
        }

        assert_eq!(succeeded, 33);
        let wallet = db.get_wallet_by_user("gina").await.unwrap().unwrap();
        assert_eq!(wallet.nwt_balance.to_string(), "1.00000000");
        assert_eq!(wallet.total_spent.to_string(), "99.00000000");
        assert!(db.reconcile_wallet("gina").await.unwrap().consistent);

        db.pool.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
