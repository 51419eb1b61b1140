// Points module
//
// Member identity, the points ledger, and the always-200 HTTP surface the
// storefront calls around order creation, close and cancel.

pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod repository;
pub mod service;

pub use error::PointsError;
pub use identity::MemberKeys;
pub use models::{CreditPayload, DeductPayload, LedgerKind, Member, RefundPayload};
pub use repository::{LedgerRepository, MemberRepository};
pub use service::{credit_points, PointsService};
