use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::orders::models::ServiceItem;
use crate::points::identity::MemberKeys;

/// A loyalty member. Created lazily the first time an order or registration
/// touches a given email/phone.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub code: String,
    pub email: String,
    pub phone: String,
    pub points: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ledger entry kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Deduct,
    PendingCredit,
    Refund,
    Adjust,
}

impl LedgerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Deduct => "deduct",
            LedgerKind::PendingCredit => "pending_credit",
            LedgerKind::Refund => "refund",
            LedgerKind::Adjust => "adjust",
        }
    }
}

/// One row of the points ledger. `(order_id, ref)` is unique; a retried
/// operation lands on the same ref and becomes a no-op.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub member_id: Uuid,
    pub order_id: String,
    #[sqlx(rename = "ref")]
    #[serde(rename = "ref")]
    pub entry_ref: String,
    pub kind: LedgerKind,
    pub points: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Outbox payload for a points deduction
#[derive(Debug, Serialize, Deserialize)]
pub struct DeductPayload {
    pub keys: MemberKeys,
    pub points: i32,
    pub order_id: String,
    pub reason: String,
}

/// Outbox payload for staging a pending credit
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditPayload {
    pub keys: MemberKeys,
    pub order_id: String,
    pub items: Vec<ServiceItem>,
    pub points_deduct_amount: Decimal,
}

/// Outbox payload for a refund
#[derive(Debug, Serialize, Deserialize)]
pub struct RefundPayload {
    pub keys: MemberKeys,
    pub order_id: String,
}
