// E-invoice vendor client
//
// Thin HTTP client against the invoicing vendor. Issuance failures surface
// to the operator but never roll back the order; issuance at close runs
// through the outbox.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::middleware::AuthenticatedUser;

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("Invoice service request failed: {0}")]
    Request(String),

    #[error("Invoice service rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl axum::response::IntoResponse for InvoiceError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            InvoiceError::Request(msg) => {
                tracing::error!("Invoice vendor unreachable: {}", msg);
                (StatusCode::BAD_GATEWAY, "發票服務暫時無法使用".to_string())
            }
            InvoiceError::Rejected(msg) => (StatusCode::BAD_REQUEST, msg),
            InvoiceError::InvalidPayload(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// A consumer (B2C) invoice request.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2cInvoiceRequest {
    pub order_number: String,
    pub buyer_email: String,
    pub amount: rust_decimal::Decimal,
    #[serde(default)]
    pub carrier: Option<String>,
}

/// A business (B2B) invoice request with a tax ID.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct B2bInvoiceRequest {
    pub order_number: String,
    pub buyer_tax_id: String,
    pub buyer_name: String,
    pub amount: rust_decimal::Decimal,
}

/// Vendor response for a successful issuance.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResult {
    pub invoice_code: String,
    #[serde(default)]
    pub random_number: Option<String>,
}

/// Client for the e-invoice vendor API
pub struct EInvoiceClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl EInvoiceClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("EINVOICE_API_URL")
                .unwrap_or_else(|_| "https://einvoice.example.com".to_string()),
            std::env::var("EINVOICE_API_KEY").unwrap_or_default(),
        )
    }

    pub async fn create_b2c(&self, request: &B2cInvoiceRequest) -> Result<InvoiceResult, InvoiceError> {
        self.post("/invoices/b2c", request).await
    }

    pub async fn create_b2b(&self, request: &B2bInvoiceRequest) -> Result<InvoiceResult, InvoiceError> {
        self.post("/invoices/b2b", request).await
    }

    pub async fn print(&self, code: &str) -> Result<(), InvoiceError> {
        let _: serde_json::Value = self.post(&format!("/invoices/{}/print", code), &json!({})).await?;
        Ok(())
    }

    pub async fn cancel(&self, code: &str) -> Result<(), InvoiceError> {
        let _: serde_json::Value = self
            .post(&format!("/invoices/{}/cancel", code), &json!({}))
            .await?;
        Ok(())
    }

    /// Outbox adapter for invoice issuance at order close. The queued
    /// payload carries the order snapshot; the invoice total is the net
    /// value of its items minus the points discount.
    pub async fn issue_from_payload(&self, payload: &serde_json::Value) -> Result<(), InvoiceError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct IssuePayload {
            order_number: String,
            buyer_email: String,
            items: Vec<crate::orders::models::ServiceItem>,
            #[serde(default)]
            points_deduct_amount: rust_decimal::Decimal,
        }

        let p: IssuePayload = serde_json::from_value(payload.clone())
            .map_err(|e| InvoiceError::InvalidPayload(e.to_string()))?;
        let amount: rust_decimal::Decimal =
            p.items.iter().map(|i| i.subtotal()).sum::<rust_decimal::Decimal>()
                - p.points_deduct_amount;

        if amount <= rust_decimal::Decimal::ZERO {
            tracing::info!("Order {} nets to zero, no invoice issued", p.order_number);
            return Ok(());
        }

        self.create_b2c(&B2cInvoiceRequest {
            order_number: p.order_number,
            buyer_email: p.buyer_email,
            amount,
            carrier: None,
        })
        .await?;
        Ok(())
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, InvoiceError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| InvoiceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(InvoiceError::Rejected(message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| InvoiceError::Rejected(e.to_string()))
    }
}

/// Handler for POST /api/invoices/b2c
pub async fn create_b2c_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<B2cInvoiceRequest>,
) -> Result<Json<InvoiceResult>, InvoiceError> {
    let result = state.invoice_client.create_b2c(&request).await?;
    Ok(Json(result))
}

/// Handler for POST /api/invoices/b2b
pub async fn create_b2b_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<B2bInvoiceRequest>,
) -> Result<Json<InvoiceResult>, InvoiceError> {
    let result = state.invoice_client.create_b2b(&request).await?;
    Ok(Json(result))
}

/// Handler for POST /api/invoices/{code}/print
pub async fn print_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<StatusCode, InvoiceError> {
    state.invoice_client.print(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/invoices/{code}/cancel
pub async fn cancel_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<StatusCode, InvoiceError> {
    state.invoice_client.cancel(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_issue_payload_amount_shape() {
        let payload = json!({
            "orderNumber": "SO2506010001",
            "buyerEmail": "a@b.c",
            "items": [
                { "name": "冷氣清洗", "quantity": 2, "unit_price": "1500" },
            ],
            "pointsDeductAmount": "250",
        });
        // Shape check only; the network call is exercised against a stub in
        // integration environments.
        let items: Vec<crate::orders::models::ServiceItem> =
            serde_json::from_value(payload["items"].clone()).unwrap();
        let total: rust_decimal::Decimal = items.iter().map(|i| i.subtotal()).sum();
        assert_eq!(total, dec!(3000));
    }
}
