use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Maximum photos per evidence list (before/after).
pub const MAX_PHOTOS: usize = 24;

/// Order status enum representing the lifecycle of a service order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    InProgress,
    Completed,
    Closed,
    Canceled,
    Unservice,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Closed => "closed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Unservice => "unservice",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(OrderStatus::Draft),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            "closed" => Ok(OrderStatus::Closed),
            "canceled" => Ok(OrderStatus::Canceled),
            "unservice" => Ok(OrderStatus::Unservice),
            _ => Err(format!("Invalid order status: {}", s)),
        }
    }

    /// Terminal states admit no further lifecycle events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Closed | OrderStatus::Canceled | OrderStatus::Unservice
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Draft
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment method for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Online,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Online => "online",
        };
        write!(f, "{}", s)
    }
}

/// Payment status for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Nopay,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Nopay => "nopay",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single commercial line on an order. The unservice flow synthesizes
/// negative-quantity mirror lines (`減項：`) and fare lines (`車馬費`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl ServiceItem {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Captured signatures, stored as image data URLs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
}

/// The order aggregate. Customer fields are a denormalized snapshot, and
/// `assigned_technicians` holds display names rather than ids; renaming a
/// technician does not retroactively touch past orders.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    pub customer_address: String,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_start: Option<NaiveTime>,
    pub preferred_time_end: Option<NaiveTime>,
    #[sqlx(json)]
    pub service_items: Vec<ServiceItem>,
    pub points_used: i32,
    pub points_deduct_amount: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: PaymentStatus,
    #[sqlx(json)]
    pub assigned_technicians: Vec<String>,
    pub signature_technician: Option<String>,
    #[sqlx(json)]
    pub signatures: Signatures,
    #[sqlx(json)]
    pub photos_before: Vec<String>,
    #[sqlx(json)]
    pub photos_after: Vec<String>,
    pub work_started_at: Option<DateTime<Utc>>,
    pub work_completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub note: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Net commercial value: Σ(unit_price × quantity) − points deduction.
    pub fn net_value(&self) -> Decimal {
        let gross: Decimal = self.service_items.iter().map(|i| i.subtotal()).sum();
        gross - self.points_deduct_amount
    }
}

/// Request DTO for creating a draft order
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default)]
    pub customer_address: String,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_start: Option<NaiveTime>,
    pub preferred_time_end: Option<NaiveTime>,
    #[serde(default)]
    pub service_items: Vec<ServiceItem>,
    #[serde(default)]
    pub points_used: i32,
    #[serde(default)]
    pub points_deduct_amount: Decimal,
    #[serde(default)]
    pub note: String,
}

/// Request DTO for partial order edits (non-lifecycle fields)
#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub preferred_date: Option<NaiveDate>,
    pub preferred_time_start: Option<NaiveTime>,
    pub preferred_time_end: Option<NaiveTime>,
    pub service_items: Option<Vec<ServiceItem>>,
    pub note: Option<String>,
    pub signature_technician: Option<String>,
}

/// Car-fare decision taken when an order cannot be serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarFare {
    None,
    Fare400,
}

/// Request DTO for the unservice flow
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UnserviceRequest {
    #[validate(length(min = 1, message = "Unservice reason is required"))]
    pub reason: String,
    pub car_fare: CarFare,
    #[validate(length(min = 1, message = "Customer signature is required"))]
    pub customer_signature: String,
}

/// Request DTO for the cash payment confirmation flow
#[derive(Debug, Deserialize, Validate)]
pub struct CashConfirmRequest {
    #[validate(length(min = 1, message = "Technician signature is required"))]
    pub technician_signature: String,
}

/// Request DTO for a customer-reported bank transfer
#[derive(Debug, Deserialize, Validate)]
pub struct TransferReportRequest {
    pub amount: Decimal,
    #[validate(length(min = 5, max = 5, message = "Last five digits required"))]
    pub last_five_digits: String,
}

/// Request DTO for changing payment method/status via the selector path
#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
}

/// Request DTO for appending evidence photos
#[derive(Debug, Deserialize)]
pub struct AddPhotosRequest {
    pub phase: PhotoPhase,
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoPhase {
    Before,
    After,
}

/// Request DTO for saving a signature
#[derive(Debug, Deserialize, Validate)]
pub struct SaveSignatureRequest {
    pub party: SignatureParty,
    #[validate(length(min = 1, message = "Signature data is required"))]
    pub data_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureParty {
    Technician,
    Customer,
}

/// Summary of whether an order may be closed, and if not, why.
/// Drives the close button's disabled-state tooltip.
#[derive(Debug, Serialize)]
pub struct CloseReadiness {
    pub can_close: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<String>,
    pub cooldown_remaining_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_round_trip() {
        for s in [
            OrderStatus::Draft,
            OrderStatus::Confirmed,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Closed,
            OrderStatus::Canceled,
            OrderStatus::Unservice,
        ] {
            assert_eq!(OrderStatus::from_str(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn test_status_from_str_invalid() {
        assert!(OrderStatus::from_str("shipped").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Closed.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Unservice.is_terminal());
        assert!(!OrderStatus::Completed.is_terminal());
        assert!(!OrderStatus::Draft.is_terminal());
    }

    #[test]
    fn test_service_item_subtotal() {
        let item = ServiceItem {
            name: "冷氣清洗".to_string(),
            quantity: 3,
            unit_price: dec!(1200),
            product_id: None,
        };
        assert_eq!(item.subtotal(), dec!(3600));
    }

    #[test]
    fn test_negative_quantity_subtotal() {
        let item = ServiceItem {
            name: "減項：冷氣清洗".to_string(),
            quantity: -3,
            unit_price: dec!(1200),
            product_id: None,
        };
        assert_eq!(item.subtotal(), dec!(-3600));
    }
}
