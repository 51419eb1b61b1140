pub mod auth;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod invoices;
pub mod media;
pub mod notifications;
pub mod orders;
pub mod outbox;
pub mod points;
pub mod reservations;
pub mod settings;
pub mod validation;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use auth::middleware::AuthenticatedUser;
use auth::{AuthService, Role, TokenService, UserRepository};
use dispatch::{
    DispatchService, ScheduleRepository, Technician, TechnicianRepository,
    UpsertTechnicianRequest,
};
use error::ApiError;
use invoices::EInvoiceClient;
use notifications::NotificationService;
use orders::{OrderRepository, OrderService};
use outbox::{OutboxRepository, OutboxWorker};
use points::{LedgerRepository, MemberRepository, PointsService};
use reservations::ReservationService;
use settings::SettingsStore;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        get_technicians,
        upsert_technician,
        delete_technician,
    ),
    components(
        schemas(Technician, UpsertTechnicianRequest, dispatch::Region, dispatch::TechnicianStatus)
    ),
    tags(
        (name = "technicians", description = "Technician management endpoints")
    ),
    info(
        title = "Dispatch API",
        version = "1.0.0",
        description = "Order lifecycle, technician dispatch and loyalty points backend",
    )
)]
struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub order_service: OrderService,
    pub dispatch_service: DispatchService,
    pub technician_repo: TechnicianRepository,
    pub schedule_repo: ScheduleRepository,
    pub points_service: PointsService,
    pub notification_service: NotificationService,
    pub invoice_client: Arc<EInvoiceClient>,
    pub reservation_service: ReservationService,
    pub auth_service: Arc<AuthService>,
    pub settings: Arc<SettingsStore>,
    pub outbox_repo: OutboxRepository,
}

// The AuthenticatedUser extractor pulls the token validator from state.
impl axum::extract::FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth_service.clone()
    }
}

/// Wire the full service graph over one pool.
pub fn build_state(db: PgPool) -> AppState {
    let settings = Arc::new(SettingsStore::new(db.clone()));
    let outbox_repo = OutboxRepository::new(db.clone());
    let order_repo = OrderRepository::new(db.clone());
    let technician_repo = TechnicianRepository::new(db.clone());
    let schedule_repo = ScheduleRepository::new(db.clone());
    let points_service = PointsService::new(
        MemberRepository::new(db.clone()),
        LedgerRepository::new(db.clone()),
    );
    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using a development-only secret");
        "dev-secret".to_string()
    });

    AppState {
        order_service: OrderService::new(
            order_repo.clone(),
            outbox_repo.clone(),
            settings.clone(),
        ),
        dispatch_service: DispatchService::new(
            technician_repo.clone(),
            schedule_repo.clone(),
            order_repo,
        ),
        technician_repo,
        schedule_repo,
        points_service,
        notification_service: NotificationService::new(db.clone()),
        invoice_client: Arc::new(EInvoiceClient::from_env()),
        reservation_service: ReservationService::new(db.clone()),
        auth_service: Arc::new(AuthService::new(
            UserRepository::new(db.clone()),
            TokenService::new(jwt_secret),
        )),
        settings,
        outbox_repo,
        db,
    }
}

/// Handler for GET /api/technicians
#[utoipa::path(
    get,
    path = "/api/technicians",
    responses(
        (status = 200, description = "List of all technicians", body = Vec<Technician>),
        (status = 500, description = "Internal server error", body = String, example = json!({"error": "Database error"}))
    ),
    tag = "technicians"
)]
async fn get_technicians(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<Technician>>, ApiError> {
    let technicians = state.technician_repo.list().await?;
    Ok(Json(technicians))
}

/// Handler for POST /api/technicians
/// Creates or updates a technician, keyed by email.
#[utoipa::path(
    post,
    path = "/api/technicians",
    request_body = UpsertTechnicianRequest,
    responses(
        (status = 200, description = "Technician saved", body = Technician),
        (status = 400, description = "Invalid input data", body = String, example = json!({"error": "email is required"})),
        (status = 500, description = "Internal server error", body = String, example = json!({"error": "Database error"}))
    ),
    tag = "technicians"
)]
async fn upsert_technician(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpsertTechnicianRequest>,
) -> Result<Json<Technician>, ApiError> {
    user.require_role(Role::Support)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;
    if payload.email.trim().is_empty() || payload.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "email and display_name are required".to_string(),
        ));
    }

    let technician = state.technician_repo.upsert(&payload).await?;
    tracing::info!("Saved technician {}", technician.email);
    Ok(Json(technician))
}

/// Handler for DELETE /api/technicians/:id
#[utoipa::path(
    delete,
    path = "/api/technicians/{id}",
    params(
        ("id" = Uuid, Path, description = "Technician ID")
    ),
    responses(
        (status = 204, description = "Technician deleted"),
        (status = 404, description = "Technician not found", body = String, example = json!({"error": "Technician not found"})),
        (status = 500, description = "Internal server error", body = String, example = json!({"error": "Database error"}))
    ),
    tag = "technicians"
)]
async fn delete_technician(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require_role(Role::Admin)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;
    state.technician_repo.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/settings/:key
async fn get_setting(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(key): Path<String>,
) -> Json<serde_json::Value> {
    let value = state.settings.get(&key).await;
    Json(serde_json::json!({ "key": key, "value": value }))
}

#[derive(serde::Deserialize)]
struct SetSettingRequest {
    value: String,
}

/// Handler for PUT /api/settings/:key
async fn set_setting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(key): Path<String>,
    Json(request): Json<SetSettingRequest>,
) -> Result<StatusCode, ApiError> {
    user.require_role(Role::Admin)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;
    state.settings.set(&key, &request.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /api/outbox/failed
/// Parked side-effect intents, for operator inspection.
async fn list_failed_intents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<outbox::OutboxRow>>, ApiError> {
    user.require_role(Role::Admin)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;
    let rows = state.outbox_repo.list_failed().await?;
    Ok(Json(rows))
}

/// Creates and configures the application router
pub fn create_router(state: AppState) -> Router {
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Auth
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/me", get(auth::me_handler))
        // Orders
        .route("/api/orders", post(orders::handlers::create_order_handler))
        .route("/api/orders", get(orders::handlers::list_orders_handler))
        .route("/api/orders/:id", get(orders::handlers::get_order_handler))
        .route("/api/orders/:id", put(orders::handlers::update_order_handler))
        .route("/api/orders/:id/confirm", post(orders::handlers::confirm_handler))
        .route("/api/orders/:id/start-work", post(orders::handlers::start_work_handler))
        .route(
            "/api/orders/:id/complete-work",
            post(orders::handlers::complete_work_handler),
        )
        .route("/api/orders/:id/close", post(orders::handlers::close_handler))
        .route(
            "/api/orders/:id/close-readiness",
            get(orders::handlers::close_readiness_handler),
        )
        .route("/api/orders/:id/cancel", post(orders::handlers::cancel_handler))
        .route("/api/orders/:id/unservice", post(orders::handlers::unservice_handler))
        .route(
            "/api/orders/:id/payment/cash-confirm",
            post(orders::handlers::cash_confirm_handler),
        )
        .route(
            "/api/orders/:id/payment/transfer-report",
            post(orders::handlers::transfer_report_handler),
        )
        .route("/api/orders/:id/payment", put(orders::handlers::update_payment_handler))
        .route("/api/orders/:id/photos", post(orders::handlers::add_photos_handler))
        .route("/api/orders/:id/signature", post(orders::handlers::save_signature_handler))
        .route("/api/orders/:id/assign", post(dispatch::handlers::assign_handler))
        // Public reservation intake
        .route(
            "/api/orders/reservations",
            get(reservations::intake_get_handler).post(reservations::intake_post_handler),
        )
        // Dispatch
        .route(
            "/api/dispatch/availability",
            post(dispatch::handlers::availability_handler),
        )
        .route("/api/dispatch/work", get(dispatch::handlers::list_work_handler))
        .route("/api/dispatch/leaves", get(dispatch::handlers::list_leaves_handler))
        .route("/api/dispatch/leaves", post(dispatch::handlers::save_leave_handler))
        .route(
            "/api/dispatch/support-shifts",
            get(dispatch::handlers::list_support_handler),
        )
        .route(
            "/api/dispatch/support-shifts",
            post(dispatch::handlers::save_support_handler),
        )
        // Technicians
        .route("/api/technicians", get(get_technicians))
        .route("/api/technicians", post(upsert_technician))
        .route("/api/technicians/:id", delete(delete_technician))
        // Points
        .route("/api/points/balance", post(points::handlers::balance_handler))
        .route(
            "/api/points/use-on-create",
            post(points::handlers::use_on_create_handler),
        )
        .route("/api/points/history", post(points::handlers::history_handler))
        .route("/api/points/apply-order", post(points::handlers::apply_order_handler))
        .route(
            "/api/points/refund-order",
            post(points::handlers::refund_order_handler),
        )
        .route(
            "/api/points-admin-adjust",
            post(points::handlers::admin_adjust_handler),
        )
        // Notifications
        .route("/api/notifications", post(notifications::push_handler))
        .route("/api/notifications", get(notifications::list_handler))
        .route("/api/notifications/:id/read", post(notifications::mark_read_handler))
        // Invoices
        .route("/api/invoices/b2c", post(invoices::create_b2c_handler))
        .route("/api/invoices/b2b", post(invoices::create_b2b_handler))
        .route("/api/invoices/:code/print", post(invoices::print_handler))
        .route("/api/invoices/:code/cancel", post(invoices::cancel_handler))
        // Settings and operations
        .route("/api/settings/:key", get(get_setting))
        .route("/api/settings/:key", put(set_setting))
        .route("/api/outbox/failed", get(list_failed_intents))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Dispatch API - Starting...");

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in environment");
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&database_url)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    let state = build_state(db_pool);

    // Background outbox drain: notifications, points ledger and invoice
    // issuance converge here even after partial failures.
    let worker = OutboxWorker::new(
        state.outbox_repo.clone(),
        state.notification_service.clone(),
        state.points_service.clone(),
        state.invoice_client.clone(),
    );
    tokio::spawn(worker.run(Duration::from_secs(5)));

    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Dispatch API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await.expect("Server error");
}

#[cfg(test)]
mod tests;
