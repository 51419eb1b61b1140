//! Order lifecycle engine.
//!
//! One explicit transition table (state × event → next state) plus per-event
//! guards, consumed uniformly by every call site. The engine is a pure
//! function of (order, event, context) and emits a field patch; persistence
//! and side effects stay in the service layer.

use chrono::{DateTime, Duration, Utc};

use crate::orders::models::{
    CarFare, Order, OrderStatus, PaymentStatus, ServiceItem, Signatures, UnserviceRequest,
};
use crate::orders::unservice;

/// Lifecycle events an operator can fire against an order.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    Confirm,
    StartWork,
    CompleteWork,
    Close,
    Cancel,
    MarkUnservice(UnserviceRequest),
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Confirm => "confirm",
            OrderEvent::StartWork => "start_work",
            OrderEvent::CompleteWork => "complete_work",
            OrderEvent::Close => "close",
            OrderEvent::Cancel => "cancel",
            OrderEvent::MarkUnservice(_) => "mark_unservice",
        }
    }
}

/// One row of the transition table.
pub struct Transition {
    pub event: &'static str,
    pub from: &'static [OrderStatus],
    pub to: OrderStatus,
}

/// The complete legal-transition table. Guards are applied on top of this;
/// anything not listed here is an illegal transition.
pub const TRANSITIONS: &[Transition] = &[
    Transition {
        event: "confirm",
        from: &[OrderStatus::Draft],
        to: OrderStatus::Confirmed,
    },
    Transition {
        event: "start_work",
        from: &[OrderStatus::Confirmed],
        to: OrderStatus::InProgress,
    },
    Transition {
        event: "complete_work",
        from: &[OrderStatus::InProgress],
        to: OrderStatus::Completed,
    },
    Transition {
        event: "close",
        from: &[OrderStatus::Completed],
        to: OrderStatus::Closed,
    },
    Transition {
        event: "cancel",
        from: &[
            OrderStatus::Draft,
            OrderStatus::Confirmed,
            OrderStatus::InProgress,
        ],
        to: OrderStatus::Canceled,
    },
    Transition {
        event: "mark_unservice",
        from: &[OrderStatus::Confirmed, OrderStatus::InProgress],
        to: OrderStatus::Unservice,
    },
];

fn lookup(event: &str, from: OrderStatus) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.event == event && t.from.contains(&from))
}

/// Context handed to the engine on every call: the clock, the configured
/// cooldown, and the acting user. Nothing is read from ambient state.
#[derive(Debug, Clone)]
pub struct LifecycleContext {
    pub now: DateTime<Utc>,
    pub cooldown_minutes: i64,
    pub actor: String,
}

/// Why an order cannot be closed. Variants are ordered by reporting
/// precedence: earlier blocks mask later ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseBlock {
    NotStarted,
    NotFinished,
    CooldownRemaining { remaining_secs: i64 },
    MissingSignatures,
    MissingPhotos,
    Unpaid,
}

impl CloseBlock {
    /// User-facing reason, shown on the disabled close button.
    pub fn reason(&self) -> String {
        match self {
            CloseBlock::NotStarted => "尚未開始施工".to_string(),
            CloseBlock::NotFinished => "尚未完成施工".to_string(),
            CloseBlock::CooldownRemaining { remaining_secs } => {
                format!("冷卻時間未到，還剩 {} 秒", remaining_secs)
            }
            CloseBlock::MissingSignatures => "缺少技師或客戶簽名".to_string(),
            CloseBlock::MissingPhotos => "缺少施工前後照片".to_string(),
            CloseBlock::Unpaid => "尚未完成付款".to_string(),
        }
    }
}

/// Errors surfaced to the operator; every rejection carries a reason string,
/// never a silent no-op.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid transition: cannot {event} from {from}")]
    IllegalTransition { from: OrderStatus, event: &'static str },

    #[error("{0}")]
    Validation(String),

    #[error("{}", .0.reason())]
    Blocked(CloseBlock),
}

/// Field changes produced by a lifecycle event. `None` means "leave as is".
#[derive(Debug, Default, Clone)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub work_started_at: Option<DateTime<Utc>>,
    pub work_completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub service_items: Option<Vec<ServiceItem>>,
    pub signatures: Option<Signatures>,
    pub note: Option<String>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.work_started_at.is_none()
            && self.work_completed_at.is_none()
            && self.closed_at.is_none()
            && self.created_by.is_none()
            && self.service_items.is_none()
            && self.signatures.is_none()
            && self.note.is_none()
    }
}

/// Remaining cooldown measured from `work_started_at`, floored at zero.
/// Computed live on every call; never cached.
pub fn cooldown_remaining(order: &Order, now: DateTime<Utc>, cooldown_minutes: i64) -> Duration {
    if cooldown_minutes <= 0 {
        return Duration::zero();
    }
    match order.work_started_at {
        Some(started) => {
            let deadline = started + Duration::minutes(cooldown_minutes);
            (deadline - now).max(Duration::zero())
        }
        None => Duration::zero(),
    }
}

/// The compound close gate. Checks every condition in precedence order
/// (not-started > not-finished > cooldown > signatures > photos > payment)
/// and reports the first failing one.
pub fn close_gate(
    order: &Order,
    now: DateTime<Utc>,
    cooldown_minutes: i64,
) -> Result<(), CloseBlock> {
    if order.work_started_at.is_none() {
        return Err(CloseBlock::NotStarted);
    }
    if order.work_completed_at.is_none() {
        return Err(CloseBlock::NotFinished);
    }
    let remaining = cooldown_remaining(order, now, cooldown_minutes);
    if remaining > Duration::zero() {
        return Err(CloseBlock::CooldownRemaining {
            remaining_secs: remaining.num_seconds(),
        });
    }
    if order.signatures.technician.is_none() || order.signatures.customer.is_none() {
        return Err(CloseBlock::MissingSignatures);
    }
    if order.photos_before.is_empty() || order.photos_after.is_empty() {
        return Err(CloseBlock::MissingPhotos);
    }
    if order.payment_status != PaymentStatus::Paid {
        return Err(CloseBlock::Unpaid);
    }
    Ok(())
}

/// Apply a lifecycle event to an order, returning the resulting field patch.
pub fn apply(
    order: &Order,
    event: &OrderEvent,
    ctx: &LifecycleContext,
) -> Result<OrderPatch, LifecycleError> {
    // complete_work while already completed is a no-op rather than an error;
    // the UI disables the action but may race a double click.
    if matches!(event, OrderEvent::CompleteWork) && order.status == OrderStatus::Completed {
        return Ok(OrderPatch::default());
    }

    let transition = lookup(event.name(), order.status).ok_or({
        LifecycleError::IllegalTransition {
            from: order.status,
            event: event.name(),
        }
    })?;

    let mut patch = OrderPatch {
        status: Some(transition.to),
        ..OrderPatch::default()
    };

    match event {
        OrderEvent::Confirm => {
            guard_confirm(order)?;
            if order.created_by.is_none() {
                patch.created_by = Some(ctx.actor.clone());
            }
        }
        OrderEvent::StartWork => {
            patch.work_started_at = Some(ctx.now);
        }
        OrderEvent::CompleteWork => {
            let remaining = cooldown_remaining(order, ctx.now, ctx.cooldown_minutes);
            if remaining > Duration::zero() {
                return Err(LifecycleError::Blocked(CloseBlock::CooldownRemaining {
                    remaining_secs: remaining.num_seconds(),
                }));
            }
            patch.work_completed_at = Some(ctx.now);
        }
        OrderEvent::Close => {
            close_gate(order, ctx.now, ctx.cooldown_minutes).map_err(LifecycleError::Blocked)?;
            patch.closed_at = Some(ctx.now);
        }
        OrderEvent::Cancel => {}
        OrderEvent::MarkUnservice(req) => {
            if req.reason.trim().is_empty() {
                return Err(LifecycleError::Validation("請填寫無法服務原因".to_string()));
            }
            if req.customer_signature.trim().is_empty() {
                return Err(LifecycleError::Validation("請先取得客戶簽名".to_string()));
            }
            patch.service_items = Some(unservice::apply_unservice(
                &order.service_items,
                req.car_fare,
            ));
            patch.note = Some(unservice::append_unservice_note(&order.note, &req.reason));
            patch.signatures = Some(Signatures {
                customer: Some(req.customer_signature.clone()),
                ..order.signatures.clone()
            });
            patch.closed_at = Some(ctx.now);
        }
    }

    Ok(patch)
}

fn guard_confirm(order: &Order) -> Result<(), LifecycleError> {
    if order.customer_name.trim().is_empty() {
        return Err(LifecycleError::Validation("請填寫客戶姓名".to_string()));
    }
    if order.customer_phone.trim().is_empty() {
        return Err(LifecycleError::Validation("請填寫客戶電話".to_string()));
    }
    if order.service_items.is_empty() {
        return Err(LifecycleError::Validation(
            "請新增至少一個服務項目".to_string(),
        ));
    }
    if order.preferred_date.is_none()
        || order.preferred_time_start.is_none()
        || order.preferred_time_end.is_none()
    {
        return Err(LifecycleError::Validation(
            "請選擇預約日期與時段".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    pub fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    pub fn ctx(cooldown_minutes: i64) -> LifecycleContext {
        LifecycleContext {
            now: fixed_now(),
            cooldown_minutes,
            actor: "staff@example.com".to_string(),
        }
    }

    pub fn base_order(status: OrderStatus) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: "SO2506010001".to_string(),
            status,
            customer_name: "王小明".to_string(),
            customer_phone: "0912345678".to_string(),
            customer_email: "wang@example.com".to_string(),
            customer_address: "台北市".to_string(),
            preferred_date: Some(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            preferred_time_start: chrono::NaiveTime::from_hms_opt(9, 0, 0),
            preferred_time_end: chrono::NaiveTime::from_hms_opt(12, 0, 0),
            service_items: vec![ServiceItem {
                name: "冷氣清洗".to_string(),
                quantity: 1,
                unit_price: dec!(2000),
                product_id: None,
            }],
            points_used: 0,
            points_deduct_amount: dec!(0),
            payment_method: None,
            payment_status: PaymentStatus::Unpaid,
            assigned_technicians: vec!["張技師".to_string()],
            signature_technician: Some("張技師".to_string()),
            signatures: Signatures::default(),
            photos_before: vec![],
            photos_after: vec![],
            work_started_at: None,
            work_completed_at: None,
            closed_at: None,
            note: String::new(),
            created_by: None,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    /// An order satisfying every close-gate condition.
    pub fn closeable_order() -> Order {
        let mut order = base_order(OrderStatus::Completed);
        order.work_started_at = Some(fixed_now() - Duration::hours(2));
        order.work_completed_at = Some(fixed_now() - Duration::hours(1));
        order.signatures = Signatures {
            technician: Some("data:image/png;base64,tech".to_string()),
            customer: Some("data:image/png;base64,cust".to_string()),
        };
        order.photos_before = vec!["data:image/jpeg;base64,b".to_string()];
        order.photos_after = vec!["data:image/jpeg;base64,a".to_string()];
        order.payment_method = Some(crate::orders::models::PaymentMethod::Cash);
        order.payment_status = PaymentStatus::Paid;
        order
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_start_work_from_confirmed() {
        let order = base_order(OrderStatus::Confirmed);
        let patch = apply(&order, &OrderEvent::StartWork, &ctx(0)).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::InProgress));
        assert_eq!(patch.work_started_at, Some(fixed_now()));
    }

    #[test]
    fn test_start_work_rejected_outside_confirmed() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::InProgress,
            OrderStatus::Completed,
            OrderStatus::Closed,
            OrderStatus::Canceled,
            OrderStatus::Unservice,
        ] {
            let order = base_order(status);
            let result = apply(&order, &OrderEvent::StartWork, &ctx(0));
            assert!(
                matches!(result, Err(LifecycleError::IllegalTransition { .. })),
                "start_work from {} should be rejected",
                status
            );
        }
    }

    #[test]
    fn test_confirm_requires_service_items() {
        let mut order = base_order(OrderStatus::Draft);
        order.service_items.clear();
        let err = apply(&order, &OrderEvent::Confirm, &ctx(0)).unwrap_err();
        match err {
            LifecycleError::Validation(msg) => assert_eq!(msg, "請新增至少一個服務項目"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_confirm_requires_schedule_window() {
        let mut order = base_order(OrderStatus::Draft);
        order.preferred_time_end = None;
        assert!(matches!(
            apply(&order, &OrderEvent::Confirm, &ctx(0)),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn test_confirm_sets_created_by_once() {
        let order = base_order(OrderStatus::Draft);
        let patch = apply(&order, &OrderEvent::Confirm, &ctx(0)).unwrap();
        assert_eq!(patch.created_by.as_deref(), Some("staff@example.com"));

        let mut seeded = base_order(OrderStatus::Draft);
        seeded.created_by = Some("original@example.com".to_string());
        let patch = apply(&seeded, &OrderEvent::Confirm, &ctx(0)).unwrap();
        assert!(patch.created_by.is_none());
    }

    #[test]
    fn test_complete_work_blocked_by_cooldown() {
        let mut order = base_order(OrderStatus::InProgress);
        order.work_started_at = Some(fixed_now() - Duration::minutes(10));
        let err = apply(&order, &OrderEvent::CompleteWork, &ctx(30)).unwrap_err();
        match err {
            LifecycleError::Blocked(CloseBlock::CooldownRemaining { remaining_secs }) => {
                assert_eq!(remaining_secs, 20 * 60);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_complete_work_after_cooldown() {
        let mut order = base_order(OrderStatus::InProgress);
        order.work_started_at = Some(fixed_now() - Duration::minutes(31));
        let patch = apply(&order, &OrderEvent::CompleteWork, &ctx(30)).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::Completed));
        assert_eq!(patch.work_completed_at, Some(fixed_now()));
    }

    #[test]
    fn test_complete_work_idempotent_when_completed() {
        let order = closeable_order();
        let patch = apply(&order, &OrderEvent::CompleteWork, &ctx(30)).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_zero_cooldown_disables_timer() {
        let mut order = base_order(OrderStatus::InProgress);
        order.work_started_at = Some(fixed_now());
        assert!(apply(&order, &OrderEvent::CompleteWork, &ctx(0)).is_ok());
    }

    #[test]
    fn test_close_happy_path() {
        let order = closeable_order();
        let patch = apply(&order, &OrderEvent::Close, &ctx(30)).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::Closed));
        assert_eq!(patch.closed_at, Some(fixed_now()));
    }

    #[test]
    fn test_close_gate_precedence() {
        let now = fixed_now();

        // Nothing done yet: not-started wins over everything else.
        let mut order = closeable_order();
        order.work_started_at = None;
        order.work_completed_at = None;
        order.payment_status = PaymentStatus::Unpaid;
        assert_eq!(close_gate(&order, now, 30), Err(CloseBlock::NotStarted));

        // Started but not finished: not-finished masks cooldown and later.
        let mut order = closeable_order();
        order.work_started_at = Some(now - Duration::minutes(1));
        order.work_completed_at = None;
        assert_eq!(close_gate(&order, now, 30), Err(CloseBlock::NotFinished));

        // Cooldown masks signatures.
        let mut order = closeable_order();
        order.work_started_at = Some(now - Duration::minutes(1));
        order.signatures = Signatures::default();
        assert!(matches!(
            close_gate(&order, now, 30),
            Err(CloseBlock::CooldownRemaining { .. })
        ));

        // Signatures mask photos.
        let mut order = closeable_order();
        order.signatures.customer = None;
        order.photos_after.clear();
        assert_eq!(
            close_gate(&order, now, 30),
            Err(CloseBlock::MissingSignatures)
        );

        // Photos mask payment.
        let mut order = closeable_order();
        order.photos_before.clear();
        order.payment_status = PaymentStatus::Pending;
        assert_eq!(close_gate(&order, now, 30), Err(CloseBlock::MissingPhotos));

        // Payment is last.
        let mut order = closeable_order();
        order.payment_status = PaymentStatus::Pending;
        assert_eq!(close_gate(&order, now, 30), Err(CloseBlock::Unpaid));
    }

    #[test]
    fn test_cooldown_remaining_is_live() {
        let mut order = base_order(OrderStatus::InProgress);
        order.work_started_at = Some(fixed_now());
        let r1 = cooldown_remaining(&order, fixed_now() + Duration::minutes(10), 30);
        let r2 = cooldown_remaining(&order, fixed_now() + Duration::minutes(29), 30);
        assert_eq!(r1, Duration::minutes(20));
        assert_eq!(r2, Duration::minutes(1));
        let r3 = cooldown_remaining(&order, fixed_now() + Duration::minutes(31), 30);
        assert_eq!(r3, Duration::zero());
    }

    #[test]
    fn test_cancel_paths() {
        for status in [
            OrderStatus::Draft,
            OrderStatus::Confirmed,
            OrderStatus::InProgress,
        ] {
            let order = base_order(status);
            let patch = apply(&order, &OrderEvent::Cancel, &ctx(0)).unwrap();
            assert_eq!(patch.status, Some(OrderStatus::Canceled));
        }
        for status in [OrderStatus::Completed, OrderStatus::Closed] {
            let order = base_order(status);
            assert!(apply(&order, &OrderEvent::Cancel, &ctx(0)).is_err());
        }
    }

    #[test]
    fn test_unservice_requires_reason_and_signature() {
        let order = base_order(OrderStatus::Confirmed);
        let event = OrderEvent::MarkUnservice(UnserviceRequest {
            reason: "  ".to_string(),
            car_fare: CarFare::Fare400,
            customer_signature: "sig".to_string(),
        });
        assert!(matches!(
            apply(&order, &event, &ctx(0)),
            Err(LifecycleError::Validation(_))
        ));

        let event = OrderEvent::MarkUnservice(UnserviceRequest {
            reason: "機型不符".to_string(),
            car_fare: CarFare::Fare400,
            customer_signature: String::new(),
        });
        assert!(matches!(
            apply(&order, &event, &ctx(0)),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[test]
    fn test_unservice_patch_shape() {
        let order = base_order(OrderStatus::Confirmed);
        let event = OrderEvent::MarkUnservice(UnserviceRequest {
            reason: "現場無法施作".to_string(),
            car_fare: CarFare::Fare400,
            customer_signature: "data:image/png;base64,cust".to_string(),
        });
        let patch = apply(&order, &event, &ctx(0)).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::Unservice));
        assert_eq!(patch.closed_at, Some(fixed_now()));
        let items = patch.service_items.unwrap();
        assert!(items.iter().any(|i| i.name.starts_with("減項：")));
        assert!(items.iter().any(|i| i.name == "車馬費$400"));
        assert!(patch.note.unwrap().contains("[無法服務] 現場無法施作"));
        assert!(patch.signatures.unwrap().customer.is_some());
    }
}

#[cfg(test)]
mod property_tests {
    use super::test_support::*;
    use super::*;
    use proptest::prelude::*;

    fn order_status_strategy() -> impl Strategy<Value = OrderStatus> {
        prop_oneof![
            Just(OrderStatus::Draft),
            Just(OrderStatus::Confirmed),
            Just(OrderStatus::InProgress),
            Just(OrderStatus::Completed),
            Just(OrderStatus::Closed),
            Just(OrderStatus::Canceled),
            Just(OrderStatus::Unservice),
        ]
    }

    /// Terminal states admit no lifecycle events at all.
    #[test]
    fn prop_terminal_states_reject_everything() {
        for status in [
            OrderStatus::Closed,
            OrderStatus::Canceled,
            OrderStatus::Unservice,
        ] {
            let order = base_order(status);
            for event in [
                OrderEvent::Confirm,
                OrderEvent::StartWork,
                OrderEvent::CompleteWork,
                OrderEvent::Close,
                OrderEvent::Cancel,
            ] {
                assert!(
                    apply(&order, &event, &ctx(0)).is_err(),
                    "{} from {} should fail",
                    event.name(),
                    status
                );
            }
        }
    }

    /// The close gate passes iff all six sub-conditions hold, and the
    /// reported block matches the documented precedence order.
    #[test]
    fn prop_close_gate_truth_table() {
        proptest!(|(
            started in any::<bool>(),
            finished in any::<bool>(),
            cooling in any::<bool>(),
            tech_sig in any::<bool>(),
            cust_sig in any::<bool>(),
            before in any::<bool>(),
            after in any::<bool>(),
            paid in any::<bool>(),
        )| {
            let now = fixed_now();
            let mut order = closeable_order();
            // Cooldown 30min: "cooling" means work started 10 minutes ago.
            order.work_started_at = if started {
                Some(if cooling { now - Duration::minutes(10) } else { now - Duration::hours(2) })
            } else {
                None
            };
            order.work_completed_at = if finished { order.work_started_at } else { None };
            order.signatures = Signatures {
                technician: tech_sig.then(|| "t".to_string()),
                customer: cust_sig.then(|| "c".to_string()),
            };
            order.photos_before = if before { vec!["b".to_string()] } else { vec![] };
            order.photos_after = if after { vec!["a".to_string()] } else { vec![] };
            order.payment_status = if paid { PaymentStatus::Paid } else { PaymentStatus::Unpaid };

            let result = close_gate(&order, now, 30);
            let all_ok = started && finished && !cooling && tech_sig && cust_sig && before && after && paid;
            prop_assert_eq!(result.is_ok(), all_ok);

            if let Err(block) = result {
                let expected = if !started {
                    CloseBlock::NotStarted
                } else if !finished {
                    CloseBlock::NotFinished
                } else if cooling {
                    let remaining = cooldown_remaining(&order, now, 30);
                    CloseBlock::CooldownRemaining { remaining_secs: remaining.num_seconds() }
                } else if !tech_sig || !cust_sig {
                    CloseBlock::MissingSignatures
                } else if !before || !after {
                    CloseBlock::MissingPhotos
                } else {
                    CloseBlock::Unpaid
                };
                prop_assert_eq!(block, expected);
            }
        });
    }

    /// apply() never succeeds for a (state, event) pair missing from the table.
    #[test]
    fn prop_apply_respects_transition_table() {
        proptest!(|(status in order_status_strategy())| {
            let order = closeable_order_with_status(status);
            for event in [
                OrderEvent::Confirm,
                OrderEvent::StartWork,
                OrderEvent::CompleteWork,
                OrderEvent::Close,
                OrderEvent::Cancel,
            ] {
                let legal = lookup(event.name(), status).is_some()
                    || (matches!(event, OrderEvent::CompleteWork)
                        && status == OrderStatus::Completed);
                let result = apply(&order, &event, &ctx(0));
                if !legal {
                    prop_assert!(result.is_err());
                }
            }
        });
    }

    fn closeable_order_with_status(status: OrderStatus) -> Order {
        let mut order = closeable_order();
        order.status = status;
        order
    }
}
