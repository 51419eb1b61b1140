// Orders module
//
// The order lifecycle: draft through close, the compound close gate, the
// unservice flow and the payment sub-flow. Pure rules live in lifecycle,
// payment and unservice; persistence and side effects live in the service.

pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod payment;
pub mod repository;
pub mod service;
pub mod unservice;

pub use error::OrderError;
pub use lifecycle::{close_gate, cooldown_remaining, CloseBlock, LifecycleContext, OrderEvent};
pub use models::{
    AddPhotosRequest, CarFare, CashConfirmRequest, CloseReadiness, CreateOrderRequest, Order,
    OrderStatus, PaymentMethod, PaymentStatus, PhotoPhase, SaveSignatureRequest, ServiceItem,
    SignatureParty, Signatures, TransferReportRequest, UnserviceRequest, UpdateOrderRequest,
    UpdatePaymentRequest, MAX_PHOTOS,
};
pub use repository::OrderRepository;
pub use service::OrderService;
