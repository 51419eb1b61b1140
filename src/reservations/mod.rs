// Public reservation intake
//
// The storefront and third-party landing pages post here. The contract is
// extreme fail-soft: the endpoint always answers HTTP 200, whatever happens
// inside, because a thrown error on the thank-you page costs the business a
// real booking. Success and failure are reported in the body instead.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Fields accepted from the public form. Everything is optional at the wire
/// level; whatever arrives is stored and staff clean it up in the draft.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_start: Option<NaiveTime>,
    pub preferred_time_end: Option<NaiveTime>,
    #[serde(default)]
    pub note: String,
}

/// Which path created the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeSource {
    Rpc,
    Fallback,
}

/// Service wrapping the two creation paths.
#[derive(Clone)]
pub struct ReservationService {
    pool: PgPool,
}

impl ReservationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a draft order for the reservation. Tries the database-side
    /// RPC first, falls back to a raw insert when the function is missing
    /// or fails.
    pub async fn create(
        &self,
        request: &ReservationRequest,
    ) -> Result<(Uuid, IntakeSource), sqlx::Error> {
        match self.create_via_rpc(request).await {
            Ok(id) => Ok((id, IntakeSource::Rpc)),
            Err(e) => {
                tracing::warn!("Reservation RPC failed, using fallback insert: {}", e);
                let id = self.create_via_insert(request).await?;
                Ok((id, IntakeSource::Fallback))
            }
        }
    }

    async fn create_via_rpc(&self, request: &ReservationRequest) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT create_reservation($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(&request.name)
            .bind(&request.phone)
            .bind(&request.email)
            .bind(&request.address)
            .bind(request.preferred_date)
            .bind(request.preferred_time_start)
            .bind(request.preferred_time_end)
            .bind(&request.note)
            .fetch_one(&self.pool)
            .await
    }

    async fn create_via_insert(&self, request: &ReservationRequest) -> Result<Uuid, sqlx::Error> {
        let order_number = crate::orders::repository::generate_order_number();
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO orders (
                order_number, customer_name, customer_phone, customer_email,
                customer_address, preferred_date, preferred_time_start,
                preferred_time_end, note
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&order_number)
        .bind(&request.name)
        .bind(&request.phone)
        .bind(&request.email)
        .bind(&request.address)
        .bind(request.preferred_date)
        .bind(request.preferred_time_start)
        .bind(request.preferred_time_end)
        .bind(&request.note)
        .fetch_one(&self.pool)
        .await
    }
}

/// Handler for GET /api/orders/reservations
/// Accepts the form fields as query parameters.
pub async fn intake_get_handler(
    State(state): State<crate::AppState>,
    Query(request): Query<ReservationRequest>,
) -> Json<serde_json::Value> {
    intake(&state, request).await
}

/// Handler for POST /api/orders/reservations
/// Takes the raw body so a malformed payload still gets a 200: whatever
/// fails to parse is treated as an empty form.
pub async fn intake_post_handler(
    State(state): State<crate::AppState>,
    body: Bytes,
) -> Json<serde_json::Value> {
    let request = match serde_json::from_slice::<ReservationRequest>(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Unparseable reservation payload ({} bytes): {}", body.len(), e);
            ReservationRequest::default()
        }
    };
    intake(&state, request).await
}

async fn intake(state: &crate::AppState, request: ReservationRequest) -> Json<serde_json::Value> {
    match state.reservation_service.create(&request).await {
        Ok((id, source)) => Json(json!({
            "ok": true,
            "source": source,
            "orderId": id,
        })),
        Err(e) => {
            tracing::error!("Reservation intake failed entirely: {}", e);
            Json(json!({ "ok": false }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_payload_parses_to_default() {
        let parsed = serde_json::from_slice::<ReservationRequest>(b"{not json").ok();
        assert!(parsed.is_none());
        let fallback = ReservationRequest::default();
        assert!(fallback.name.is_empty());
        assert!(fallback.preferred_date.is_none());
    }

    #[test]
    fn test_partial_payload_is_accepted() {
        let parsed: ReservationRequest =
            serde_json::from_value(json!({ "name": "王小明", "phone": "0912345678" })).unwrap();
        assert_eq!(parsed.name, "王小明");
        assert!(parsed.email.is_empty());
    }

    #[test]
    fn test_intake_source_serialization() {
        assert_eq!(serde_json::to_value(IntakeSource::Rpc).unwrap(), "rpc");
        assert_eq!(
            serde_json::to_value(IntakeSource::Fallback).unwrap(),
            "fallback"
        );
    }
}
