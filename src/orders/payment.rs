//! Payment sub-flow rules.
//!
//! Not a separate state machine; a set of guarded field updates. The one hard
//! invariant: once an order is cash + paid, neither the method nor the status
//! may change again through the selector path.

use rust_decimal::Decimal;

use crate::orders::models::{Order, PaymentMethod, PaymentStatus};
use crate::validation;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("現金付款已完成，無法變更付款方式或狀態")]
    Locked,

    #[error("{0}")]
    Validation(String),
}

/// Field changes produced by a payment action.
#[derive(Debug, Default, Clone)]
pub struct PaymentPatch {
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub technician_signature: Option<String>,
    pub note_append: Option<String>,
}

/// Cash that has physically changed hands must not be reversible from the UI.
pub fn is_locked(order: &Order) -> bool {
    order.payment_method == Some(PaymentMethod::Cash)
        && order.payment_status == PaymentStatus::Paid
}

/// Selector-path change of method and/or status.
pub fn change(
    order: &Order,
    method: Option<PaymentMethod>,
    status: Option<PaymentStatus>,
) -> Result<PaymentPatch, PaymentError> {
    if is_locked(order) {
        return Err(PaymentError::Locked);
    }
    Ok(PaymentPatch {
        payment_method: method,
        payment_status: status,
        ..PaymentPatch::default()
    })
}

/// Cash confirmation: a technician signature captured for payment atomically
/// flips the order to paid.
pub fn confirm_cash(order: &Order, technician_signature: &str) -> Result<PaymentPatch, PaymentError> {
    if is_locked(order) {
        return Err(PaymentError::Locked);
    }
    if technician_signature.trim().is_empty() {
        return Err(PaymentError::Validation("請先取得技師簽名".to_string()));
    }
    Ok(PaymentPatch {
        payment_method: Some(PaymentMethod::Cash),
        payment_status: Some(PaymentStatus::Paid),
        technician_signature: Some(technician_signature.to_string()),
        ..PaymentPatch::default()
    })
}

/// Transfer report: amount plus the last five digits of the remitting
/// account. Moves the order to pending; reconciliation stays manual.
pub fn report_transfer(
    order: &Order,
    amount: Decimal,
    last_five_digits: &str,
) -> Result<PaymentPatch, PaymentError> {
    if is_locked(order) {
        return Err(PaymentError::Locked);
    }
    if amount <= Decimal::ZERO {
        return Err(PaymentError::Validation("請填寫正確的匯款金額".to_string()));
    }
    if !validation::is_last_five_digits(last_five_digits) {
        return Err(PaymentError::Validation("請填寫帳號末五碼".to_string()));
    }
    Ok(PaymentPatch {
        payment_method: Some(PaymentMethod::Transfer),
        payment_status: Some(PaymentStatus::Pending),
        note_append: Some(format!("匯款回報：${} 末五碼 {}", amount, last_five_digits)),
        ..PaymentPatch::default()
    })
}
