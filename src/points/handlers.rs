// HTTP handlers for points endpoints
//
// Every endpoint here answers 200 with a `success` flag instead of an HTTP
// error. Points are an enrichment to the order flow, not part of it, so a
// broken ledger must never block checkout or close.

use axum::{extract::State, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::auth::middleware::AuthenticatedUser;
use crate::orders::models::ServiceItem;
use crate::points::identity::MemberKeys;

/// Request for POST /api/points/use-on-create
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsePointsRequest {
    #[serde(flatten)]
    pub keys: MemberKeys,
    pub points: i32,
    pub order_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request for POST /api/points/apply-order
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOrderRequest {
    #[serde(flatten)]
    pub keys: MemberKeys,
    pub order_id: String,
    #[serde(default)]
    pub items: Vec<ServiceItem>,
    #[serde(default)]
    pub points_deduct_amount: Decimal,
}

/// Request for POST /api/points/refund-order
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOrderRequest {
    #[serde(flatten)]
    pub keys: MemberKeys,
    pub order_id: String,
}

/// Request for POST /api/points-admin-adjust
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAdjustRequest {
    #[serde(flatten)]
    pub keys: MemberKeys,
    pub set_to: Option<i32>,
    pub delta: Option<i32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Handler for POST /api/points/balance
/// Looks up a member balance by any identity key. Unknown members and
/// database failures both answer zero.
pub async fn balance_handler(
    State(state): State<crate::AppState>,
    Json(keys): Json<MemberKeys>,
) -> Json<serde_json::Value> {
    match state.points_service.get_balance(&keys).await {
        Ok((member, points)) => Json(json!({
            "success": true,
            "memberId": member.id,
            "memberCode": member.code,
            "points": points,
        })),
        Err(e) => {
            tracing::warn!("Balance lookup failed: {}", e);
            Json(json!({ "success": false, "points": 0 }))
        }
    }
}

/// Handler for POST /api/points/history
/// Full ledger history for a member, newest entries first.
pub async fn history_handler(
    State(state): State<crate::AppState>,
    Json(keys): Json<MemberKeys>,
) -> Json<serde_json::Value> {
    match state.points_service.history(&keys).await {
        Ok((member, entries)) => Json(json!({
            "success": true,
            "memberId": member.id,
            "points": member.points,
            "entries": entries,
        })),
        Err(e) => {
            tracing::warn!("Ledger history lookup failed: {}", e);
            Json(json!({ "success": false, "entries": [] }))
        }
    }
}

/// Handler for POST /api/points/use-on-create
/// Deducts points when an order is created with a points discount.
pub async fn use_on_create_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<UsePointsRequest>,
) -> Json<serde_json::Value> {
    let reason = request
        .reason
        .unwrap_or_else(|| "訂單折抵".to_string());
    match state
        .points_service
        .deduct(&request.keys, request.points, &request.order_id, &reason)
        .await
    {
        Ok(member) => Json(json!({
            "success": true,
            "memberId": member.id,
        })),
        Err(e) => {
            tracing::warn!("Points deduction failed: {}", e);
            Json(json!({ "success": false, "error": e.to_string() }))
        }
    }
}

/// Handler for POST /api/points/apply-order
/// Stages the pending credit for a closed order.
pub async fn apply_order_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<ApplyOrderRequest>,
) -> Json<serde_json::Value> {
    match state
        .points_service
        .credit_pending(
            &request.keys,
            &request.order_id,
            &request.items,
            request.points_deduct_amount,
        )
        .await
    {
        Ok(points) => Json(json!({ "success": true, "points": points })),
        Err(e) => {
            tracing::warn!("Pending credit failed: {}", e);
            Json(json!({ "success": false, "error": e.to_string() }))
        }
    }
}

/// Handler for POST /api/points/refund-order
/// Returns whatever was deducted against a canceled order.
pub async fn refund_order_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<RefundOrderRequest>,
) -> Json<serde_json::Value> {
    match state
        .points_service
        .refund(&request.keys, &request.order_id)
        .await
    {
        Ok(points) => Json(json!({ "success": true, "refunded": points })),
        Err(e) => {
            tracing::warn!("Points refund failed: {}", e);
            Json(json!({ "success": false, "refunded": 0 }))
        }
    }
}

/// Handler for POST /api/points-admin-adjust
/// Operator balance correction. Requires an authenticated session.
pub async fn admin_adjust_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<AdminAdjustRequest>,
) -> Json<serde_json::Value> {
    let reason = request
        .reason
        .unwrap_or_else(|| format!("後台調整 by {}", user.email));
    match state
        .points_service
        .admin_adjust(&request.keys, request.set_to, request.delta, &reason)
        .await
    {
        Ok(member) => Json(json!({
            "success": true,
            "memberId": member.id,
            "points": member.points,
        })),
        Err(e) => {
            tracing::warn!("Admin adjust failed: {}", e);
            Json(json!({ "success": false, "error": e.to_string() }))
        }
    }
}
