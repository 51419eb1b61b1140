// HTTP handlers for dispatch endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::middleware::AuthenticatedUser;
use crate::dispatch::models::{
    AssignRequest, AvailabilityQuery, AvailabilityReport, SaveLeaveRequest,
    SaveSupportShiftRequest, SupportShift, TechnicianLeave, WorkAssignment,
};
use crate::dispatch::DispatchError;

/// Query parameters for schedule listings
#[derive(Debug, Deserialize)]
pub struct ScheduleRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Handler for POST /api/dispatch/availability
pub async fn availability_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Json(query): Json<AvailabilityQuery>,
) -> Result<Json<AvailabilityReport>, DispatchError> {
    let report = state.dispatch_service.availability(&query).await?;
    Ok(Json(report))
}

/// Handler for POST /api/orders/{id}/assign
pub async fn assign_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(request): Json<AssignRequest>,
) -> Result<Json<Vec<String>>, DispatchError> {
    let names = state
        .dispatch_service
        .assign(order_id, &request.technician_emails)
        .await?;
    Ok(Json(names))
}

/// Handler for GET /api/dispatch/work
pub async fn list_work_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Query(range): Query<ScheduleRangeQuery>,
) -> Result<Json<Vec<WorkAssignment>>, DispatchError> {
    let work = state
        .schedule_repo
        .list_work(range.start, range.end)
        .await?;
    Ok(Json(work))
}

/// Handler for GET /api/dispatch/leaves
pub async fn list_leaves_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Query(range): Query<ScheduleRangeQuery>,
) -> Result<Json<Vec<TechnicianLeave>>, DispatchError> {
    let leaves = state
        .schedule_repo
        .list_technician_leaves(range.start, range.end)
        .await?;
    Ok(Json(leaves))
}

/// Handler for POST /api/dispatch/leaves
pub async fn save_leave_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<SaveLeaveRequest>,
) -> Result<(StatusCode, Json<TechnicianLeave>), DispatchError> {
    let leave = state.schedule_repo.save_technician_leave(&request).await?;
    Ok((StatusCode::CREATED, Json(leave)))
}

/// Handler for GET /api/dispatch/support-shifts
pub async fn list_support_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<SupportShift>>, DispatchError> {
    let shifts = state.schedule_repo.list_support().await?;
    Ok(Json(shifts))
}

/// Handler for POST /api/dispatch/support-shifts
pub async fn save_support_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<SaveSupportShiftRequest>,
) -> Result<(StatusCode, Json<SupportShift>), DispatchError> {
    let shift = state.schedule_repo.save_support_shift(&request).await?;
    Ok((StatusCode::CREATED, Json(shift)))
}
