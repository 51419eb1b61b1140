// HTTP handlers for order endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthenticatedUser;
use crate::orders::lifecycle::OrderEvent;
use crate::orders::models::{
    AddPhotosRequest, CashConfirmRequest, CloseReadiness, CreateOrderRequest, Order, OrderStatus,
    SaveSignatureRequest, TransferReportRequest, UnserviceRequest, UpdateOrderRequest,
    UpdatePaymentRequest,
};
use crate::orders::OrderError;

/// Query parameters for the order list
#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub date: Option<chrono::NaiveDate>,
}

/// Handler for POST /api/orders
pub async fn create_order_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), OrderError> {
    request
        .validate()
        .map_err(|e| OrderError::ValidationError(e.to_string()))?;

    let order = state
        .order_service
        .create_order(request, Some(&user.email))
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Handler for GET /api/orders
pub async fn list_orders_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<Order>>, OrderError> {
    let orders = match query.date {
        Some(date) => state.order_service.list_for_date(date).await?,
        None => state.order_service.list_orders(query.status).await?,
    };
    Ok(Json(orders))
}

/// Handler for GET /api/orders/{id}
pub async fn get_order_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state.order_service.get_order(id).await?;
    Ok(Json(order))
}

/// Handler for PUT /api/orders/{id}
pub async fn update_order_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state.order_service.update_order(id, request).await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/confirm
pub async fn confirm_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .transition(id, OrderEvent::Confirm, &user.email)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/start-work
pub async fn start_work_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .transition(id, OrderEvent::StartWork, &user.email)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/complete-work
pub async fn complete_work_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .transition(id, OrderEvent::CompleteWork, &user.email)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/close
pub async fn close_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .transition(id, OrderEvent::Close, &user.email)
        .await?;
    Ok(Json(order))
}

/// Handler for GET /api/orders/{id}/close-readiness
pub async fn close_readiness_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CloseReadiness>, OrderError> {
    let readiness = state.order_service.close_readiness(id).await?;
    Ok(Json(readiness))
}

/// Handler for POST /api/orders/{id}/cancel
pub async fn cancel_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .transition(id, OrderEvent::Cancel, &user.email)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/unservice
pub async fn unservice_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UnserviceRequest>,
) -> Result<Json<Order>, OrderError> {
    request
        .validate()
        .map_err(|e| OrderError::ValidationError(e.to_string()))?;

    let order = state
        .order_service
        .transition(id, OrderEvent::MarkUnservice(request), &user.email)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/payment/cash-confirm
pub async fn cash_confirm_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<CashConfirmRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .confirm_cash(id, &request.technician_signature)
        .await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/payment/transfer-report
pub async fn transfer_report_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<TransferReportRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state
        .order_service
        .report_transfer(id, request.amount, &request.last_five_digits)
        .await?;
    Ok(Json(order))
}

/// Handler for PUT /api/orders/{id}/payment
pub async fn update_payment_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePaymentRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state.order_service.update_payment(id, request).await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/photos
pub async fn add_photos_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<AddPhotosRequest>,
) -> Result<Json<Order>, OrderError> {
    let order = state.order_service.add_photos(id, request).await?;
    Ok(Json(order))
}

/// Handler for POST /api/orders/{id}/signature
pub async fn save_signature_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<SaveSignatureRequest>,
) -> Result<Json<Order>, OrderError> {
    request
        .validate()
        .map_err(|e| OrderError::ValidationError(e.to_string()))?;

    let order = state
        .order_service
        .save_signature(id, request.party, &request.data_url)
        .await?;
    Ok(Json(order))
}
