use actix_web::{HttpRequest, HttpResponse, get, post, put, web};
use chrono::Utc;
use common::{NewPurchase, NewSpend, PaymentMethod, SettlementOutcome, TransactionFilter, WalletType};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{UserId, bearer_matches};
use crate::error::ApiError;
use crate::response::{created, success};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectWalletRequest {
    pub address: String,
    pub wallet_type: WalletType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPurchaseRequest {
    pub external_transaction_id: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[get("/wallet")]
pub async fn get_wallet(
    user: UserId,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let wallet = app_state
        .db
        .get_or_create_wallet(&user.0)
        .await
        .map_err(|e| ApiError::internal("Failed to get wallet", e))?;
    Ok(success(wallet))
}

#[put("/wallet/connect")]
pub async fn connect_wallet(
    user: UserId,
    body: web::Json<ConnectWalletRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let address = body.address.trim();
    if !common::validate_wallet_address(address)? {
        log::warn!("User {} sent invalid wallet address {}", user.0, address);
        return Err(ApiError::BadRequest("Invalid wallet address".to_string()));
    }

    let wallet = app_state
        .db
        .connect_wallet(&user.0, address, body.wallet_type)
        .await
        .map_err(|e| ApiError::internal("Failed to connect wallet", e))?;
    Ok(success(wallet))
}

/// Records a pending purchase; the balance moves once the payment settles.
#[post("/wallet/purchase")]
pub async fn create_purchase(
    user: UserId,
    body: web::Json<NewPurchase>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let transaction = app_state.db.create_purchase(&user.0, &body).await?;
    Ok(created(transaction))
}

/// Synchronous confirmation of a succeeded card charge, called by the
/// checkout backend with `PAYMENT_CONFIRM_TOKEN`. Crypto purchases settle
/// through their webhook only.
#[post("/wallet/purchase/confirm")]
pub async fn confirm_purchase(
    req: HttpRequest,
    user: UserId,
    body: web::Json<ConfirmPurchaseRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let Some(token) = app_state.payment_confirm_token.as_deref() else {
        log::warn!(
            "User {} tried to confirm a purchase while confirmation is disabled",
            user.0
        );
        return Err(ApiError::Unauthorized(
            "Purchase confirmation is not enabled".to_string(),
        ));
    };
    if !bearer_matches(&req, token) {
        log::warn!(
            "Rejected purchase confirmation for user {} with a wrong token",
            user.0
        );
        return Err(ApiError::Unauthorized("Invalid confirmation token".to_string()));
    }

    let external_id = body.external_transaction_id.trim();
    let not_found = || ApiError::NotFound(format!("Transaction {} not found", external_id));

    let transaction = app_state
        .db
        .get_transaction_by_external_id(external_id)
        .await
        .map_err(|e| ApiError::internal("Failed to get transaction", e))?
        .ok_or_else(not_found)?;
    if transaction.user_id != user.0 {
        log::warn!(
            "User {} tried to confirm transaction {} of another user",
            user.0,
            external_id
        );
        return Err(not_found());
    }
    if transaction.payment_method != Some(PaymentMethod::Card) {
        return Err(ApiError::BadRequest(
            "Only card purchases can be confirmed directly".to_string(),
        ));
    }

    let metadata = json!({
        "confirmation": {
            "source": "checkout",
            "confirmedAt": Utc::now().to_rfc3339(),
            "details": body.metadata.clone().unwrap_or(Value::Null),
        }
    });
    let settlement = app_state
        .db
        .settle_purchase(external_id, SettlementOutcome::Completed, &metadata)
        .await?;
    Ok(success(settlement))
}

#[post("/wallet/spend")]
pub async fn spend(
    user: UserId,
    body: web::Json<NewSpend>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let receipt = app_state.db.spend(&user.0, &body).await?;
    Ok(success(receipt))
}

#[get("/wallet/transactions")]
pub async fn get_transactions(
    user: UserId,
    query: web::Query<TransactionFilter>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let transactions = app_state
        .db
        .list_transactions(&user.0, &query)
        .await
        .map_err(|e| ApiError::internal("Failed to get transactions", e))?;
    Ok(success(transactions))
}

#[get("/wallet/reconcile")]
pub async fn reconcile_wallet(
    user: UserId,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let report = app_state.db.reconcile_wallet(&user.0).await?;
    Ok(success(report))
}
