use actix_web::{HttpRequest, HttpResponse, post, web};
use common::{SettlementOutcome, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::bearer_matches;
use crate::error::ApiError;
use crate::response::success;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl WebhookAck {
    fn ignored() -> Self {
        WebhookAck {
            received: true,
            applied: false,
            status: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelioWebhook {
    pub event: String,
    pub transaction_object: HelioTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelioTransaction {
    pub id: String,
    #[serde(default)]
    pub paylink_id: Option<String>,
    #[serde(default)]
    pub meta: HelioMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelioMeta {
    #[serde(default)]
    pub transaction_status: Option<String>,
}

impl HelioWebhook {
    /// Purchases are stored under the paylink id when Helio sends one.
    pub fn external_id(&self) -> &str {
        self.transaction_object
            .paylink_id
            .as_deref()
            .unwrap_or(&self.transaction_object.id)
    }

    pub fn outcome(&self) -> Option<SettlementOutcome> {
        let status = match &self.transaction_object.meta.transaction_status {
            Some(status) => status.to_ascii_uppercase(),
            None if self.event.eq_ignore_ascii_case("CREATED") => "SUCCESS".to_string(),
            None => return None,
        };
        match status.as_str() {
            "SUCCESS" | "COMPLETED" => Some(SettlementOutcome::Completed),
            "FAILED" => Some(SettlementOutcome::Failed),
            "CANCELED" | "CANCELLED" => Some(SettlementOutcome::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

impl StripeEvent {
    pub fn outcome(&self) -> Option<SettlementOutcome> {
        match self.kind.as_str() {
            "payment_intent.succeeded" => Some(SettlementOutcome::Completed),
            "payment_intent.payment_failed" => Some(SettlementOutcome::Failed),
            "payment_intent.canceled" => Some(SettlementOutcome::Cancelled),
            _ => None,
        }
    }

    pub fn payment_intent_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(Value::as_str)
    }
}

fn check_bearer(req: &HttpRequest, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    if !bearer_matches(req, expected) {
        log::warn!("Rejected webhook with missing or wrong token");
        return Err(ApiError::Unauthorized("Invalid webhook token".to_string()));
    }
    Ok(())
}

async fn settle_from_webhook(
    app_state: &AppState,
    provider: &str,
    external_id: &str,
    outcome: SettlementOutcome,
    payload: Value,
) -> Result<WebhookAck, ApiError> {
    let metadata = json!({ provider: payload });
    match app_state
        .db
        .settle_purchase(external_id, outcome, &metadata)
        .await
    {
        Ok(settlement) => Ok(WebhookAck {
            received: true,
            applied: settlement.applied,
            status: Some(settlement.transaction.status.as_str().to_string()),
        }),
        // Providers retry non-2xx answers; an unknown id will never match.
        Err(StoreError::NotFound(_)) => {
            log::warn!("{} webhook for unknown transaction {}", provider, external_id);
            Ok(WebhookAck::ignored())
        }
        Err(e) => Err(e.into()),
    }
}

#[post("/webhooks/helio")]
pub async fn helio_webhook(
    req: HttpRequest,
    body: web::Json<Value>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    check_bearer(&req, app_state.helio_webhook_token.as_deref())?;

    let payload = body.into_inner();
    let event: HelioWebhook = serde_json::from_value(payload.clone())
        .map_err(|e| ApiError::BadRequest(format!("Invalid Helio webhook payload: {}", e)))?;
    log::debug!("Helio webhook {} for {}", event.event, event.external_id());

    let Some(outcome) = event.outcome() else {
        log::info!(
            "Ignoring Helio event {} with status {:?}",
            event.event,
            event.transaction_object.meta.transaction_status
        );
        return Ok(success(WebhookAck::ignored()));
    };

    let ack = settle_from_webhook(&app_state, "helio", event.external_id(), outcome, payload).await?;
    Ok(success(ack))
}

#[post("/webhooks/stripe")]
pub async fn stripe_webhook(
    body: web::Json<Value>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let payload = body.into_inner();
    let event: StripeEvent = serde_json::from_value(payload.clone())
        .map_err(|e| ApiError::BadRequest(format!("Invalid Stripe event payload: {}", e)))?;

    let Some(outcome) = event.outcome() else {
        log::debug!("Ignoring Stripe event {} of type {}", event.id, event.kind);
        return Ok(success(WebhookAck::ignored()));
    };
    let intent_id = event
        .payment_intent_id()
        .ok_or_else(|| ApiError::BadRequest("Stripe event has no payment intent id".to_string()))?;

    let ack = settle_from_webhook(&app_state, "stripe", intent_id, outcome, payload).await?;
    Ok(success(ack))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helio(event: &str, status: Option<&str>, paylink: Option<&str>) -> HelioWebhook {
        let mut value = json!({
            "event": event,
            "transactionObject": { "id": "tx_1", "meta": {} }
        });
        if let Some(status) = status {
            value["transactionObject"]["meta"]["transactionStatus"] = json!(status);
        }
        if let Some(paylink) = paylink {
            value["transactionObject"]["paylinkId"] = json!(paylink);
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn helio_status_mapping() {
        assert_eq!(
            helio("CREATED", Some("SUCCESS"), None).outcome(),
            Some(SettlementOutcome::Completed)
        );
        assert_eq!(
            helio("CREATED", None, None).outcome(),
            Some(SettlementOutcome::Completed)
        );
        assert_eq!(
            helio("UPDATED", Some("failed"), None).outcome(),
            Some(SettlementOutcome::Failed)
        );
        assert_eq!(
            helio("UPDATED", Some("CANCELED"), None).outcome(),
            Some(SettlementOutcome::Cancelled)
        );
        assert_eq!(helio("UPDATED", Some("PENDING"), None).outcome(), None);
        assert_eq!(helio("UPDATED", None, None).outcome(), None);
    }

    #[test]
    fn helio_prefers_paylink_id() {
        assert_eq!(helio("CREATED", None, Some("pl_9")).external_id(), "pl_9");
        assert_eq!(helio("CREATED", None, None).external_id(), "tx_1");
    }

    #[test]
    fn stripe_event_mapping() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "payment_intent.canceled",
            "data": { "object": { "id": "pi_1", "amount": 500 } }
        }))
        .unwrap();
        assert_eq!(event.outcome(), Some(SettlementOutcome::Cancelled));
        assert_eq!(event.payment_intent_id(), Some("pi_1"));
    }
}
