// Business logic for order lifecycle and payment flows
//
// The service always re-reads the order before applying an event, runs the
// pure rules, then persists with a status guard so concurrent transitions
// cannot both win. Side effects go through the outbox, never inline.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::media;
use crate::orders::error::OrderError;
use crate::orders::lifecycle::{self, LifecycleContext, OrderEvent, OrderPatch};
use crate::orders::models::{
    AddPhotosRequest, CloseReadiness, CreateOrderRequest, Order, OrderStatus, PhotoPhase,
    SignatureParty, UpdateOrderRequest, UpdatePaymentRequest, MAX_PHOTOS,
};
use crate::orders::payment::{self, PaymentPatch};
use crate::outbox::{IntentKind, OutboxRepository};
use crate::points::identity::MemberKeys;
use crate::points::models::{CreditPayload, DeductPayload, RefundPayload};
use crate::orders::repository::OrderRepository;
use crate::settings::SettingsStore;

/// Ledger reason for a points discount taken on an order. The deduction ref
/// is derived from this string, so the create-time intent, the storefront
/// call, and the close-time replay all land on the same ledger row.
const DEDUCT_REASON: &str = "訂單折抵";

/// Service for order business logic
#[derive(Clone)]
pub struct OrderService {
    repo: OrderRepository,
    outbox: OutboxRepository,
    settings: Arc<SettingsStore>,
}

impl OrderService {
    pub fn new(repo: OrderRepository, outbox: OutboxRepository, settings: Arc<SettingsStore>) -> Self {
        Self {
            repo,
            outbox,
            settings,
        }
    }

    /// Create a draft order. A points discount taken at creation is staged
    /// as a deduction intent; the ledger converges even if the storefront
    /// call never arrives.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        actor: Option<&str>,
    ) -> Result<Order, OrderError> {
        let order = self.repo.create(&request, actor).await?;

        if order.points_used > 0 {
            let payload = DeductPayload {
                keys: MemberKeys::from_email_phone(&order.customer_email, &order.customer_phone),
                points: order.points_used,
                order_id: order.order_number.clone(),
                reason: DEDUCT_REASON.to_string(),
            };
            self.enqueue(IntentKind::PointsDeduct, &payload).await;
        }

        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, OrderError> {
        self.repo.find_by_id(id).await?.ok_or(OrderError::NotFound)
    }

    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, OrderError> {
        self.repo.list(status).await
    }

    pub async fn list_for_date(
        &self,
        date: chrono::NaiveDate,
    ) -> Result<Vec<Order>, OrderError> {
        self.repo.list_for_date(date).await
    }

    /// Apply a lifecycle event. Reads fresh state, runs the rules, persists
    /// behind a status guard, then stages the event's side effects.
    pub async fn transition(
        &self,
        id: Uuid,
        event: OrderEvent,
        actor: &str,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(id).await?;
        let ctx = LifecycleContext {
            now: Utc::now(),
            cooldown_minutes: self.settings.cooldown_minutes().await,
            actor: actor.to_string(),
        };

        let patch = lifecycle::apply(&order, &event, &ctx)?;
        if patch.is_empty() {
            return Ok(order);
        }

        let expected = order.status;
        let mut merged = order;
        merge_lifecycle_patch(&mut merged, patch);

        let saved = self
            .repo
            .save(&merged, expected)
            .await?
            .ok_or_else(|| {
                OrderError::InvalidTransition("order was modified concurrently".to_string())
            })?;

        self.stage_side_effects(&saved, &event).await;
        Ok(saved)
    }

    /// Whether the order can be closed right now, and the first blocking
    /// reason when it cannot.
    pub async fn close_readiness(&self, id: Uuid) -> Result<CloseReadiness, OrderError> {
        let order = self.get_order(id).await?;
        let now = Utc::now();
        let cooldown_minutes = self.settings.cooldown_minutes().await;

        let remaining = lifecycle::cooldown_remaining(&order, now, cooldown_minutes);
        Ok(match lifecycle::close_gate(&order, now, cooldown_minutes) {
            Ok(()) if order.status == OrderStatus::Completed => CloseReadiness {
                can_close: true,
                blocked_by: None,
                cooldown_remaining_secs: 0,
            },
            Ok(()) => CloseReadiness {
                can_close: false,
                blocked_by: Some(format!("訂單狀態為 {}", order.status)),
                cooldown_remaining_secs: 0,
            },
            Err(block) => CloseReadiness {
                can_close: false,
                blocked_by: Some(block.reason()),
                cooldown_remaining_secs: remaining.num_seconds().max(0),
            },
        })
    }

    /// Edit order details. Closed and canceled orders are immutable.
    pub async fn update_order(
        &self,
        id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(id).await?;
        if order.status.is_terminal() {
            return Err(OrderError::ValidationError(
                "已結束的訂單無法編輯".to_string(),
            ));
        }

        let expected = order.status;
        let mut merged = order;
        if let Some(v) = request.customer_name {
            merged.customer_name = v;
        }
        if let Some(v) = request.customer_phone {
            merged.customer_phone = v;
        }
        if let Some(v) = request.customer_email {
            merged.customer_email = v;
        }
        if let Some(v) = request.customer_address {
            merged.customer_address = v;
        }
        if let Some(v) = request.preferred_date {
            merged.preferred_date = Some(v);
        }
        if let Some(v) = request.preferred_time_start {
            merged.preferred_time_start = Some(v);
        }
        if let Some(v) = request.preferred_time_end {
            merged.preferred_time_end = Some(v);
        }
        if let Some(v) = request.service_items {
            merged.service_items = v;
        }
        if let Some(v) = request.note {
            merged.note = v;
        }
        if let Some(v) = request.signature_technician {
            merged.signature_technician = Some(v);
        }

        self.repo
            .save(&merged, expected)
            .await?
            .ok_or(OrderError::NotFound)
    }

    pub async fn confirm_cash(
        &self,
        id: Uuid,
        technician_signature: &str,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(id).await?;
        let patch = payment::confirm_cash(&order, technician_signature)?;
        self.save_payment(order, patch).await
    }

    pub async fn report_transfer(
        &self,
        id: Uuid,
        amount: rust_decimal::Decimal,
        last_five_digits: &str,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(id).await?;
        let patch = payment::report_transfer(&order, amount, last_five_digits)?;
        self.save_payment(order, patch).await
    }

    pub async fn update_payment(
        &self,
        id: Uuid,
        request: UpdatePaymentRequest,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(id).await?;
        let patch = payment::change(&order, request.payment_method, request.payment_status)?;
        self.save_payment(order, patch).await
    }

    /// Append evidence photos, recompressing each one on the way in.
    pub async fn add_photos(
        &self,
        id: Uuid,
        request: AddPhotosRequest,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(id).await?;
        let expected = order.status;
        let mut merged = order;

        let target = match request.phase {
            PhotoPhase::Before => &mut merged.photos_before,
            PhotoPhase::After => &mut merged.photos_after,
        };
        if target.len() + request.photos.len() > MAX_PHOTOS {
            return Err(OrderError::PhotoLimit(MAX_PHOTOS));
        }
        for photo in &request.photos {
            target.push(media::compress_data_url(photo, media::DEFAULT_MAX_KB));
        }

        self.repo
            .save(&merged, expected)
            .await?
            .ok_or(OrderError::NotFound)
    }

    pub async fn save_signature(
        &self,
        id: Uuid,
        party: SignatureParty,
        data_url: &str,
    ) -> Result<Order, OrderError> {
        if data_url.trim().is_empty() {
            return Err(OrderError::ValidationError("請先完成簽名".to_string()));
        }
        let order = self.get_order(id).await?;
        let expected = order.status;
        let mut merged = order;
        let stored = media::compress_data_url(data_url, media::DEFAULT_MAX_KB);
        match party {
            SignatureParty::Technician => merged.signatures.technician = Some(stored),
            SignatureParty::Customer => merged.signatures.customer = Some(stored),
        }

        self.repo
            .save(&merged, expected)
            .await?
            .ok_or(OrderError::NotFound)
    }

    async fn save_payment(
        &self,
        order: Order,
        patch: PaymentPatch,
    ) -> Result<Order, OrderError> {
        let expected = order.status;
        let mut merged = order;
        if let Some(method) = patch.payment_method {
            merged.payment_method = Some(method);
        }
        if let Some(status) = patch.payment_status {
            merged.payment_status = status;
        }
        if let Some(signature) = patch.technician_signature {
            merged.signatures.technician = Some(signature);
        }
        if let Some(line) = patch.note_append {
            if merged.note.is_empty() {
                merged.note = line;
            } else {
                merged.note = format!("{}\n{}", merged.note, line);
            }
        }

        self.repo
            .save(&merged, expected)
            .await?
            .ok_or(OrderError::NotFound)
    }

    /// Stage the side effects of a committed transition. All best-effort.
    async fn stage_side_effects(&self, order: &Order, event: &OrderEvent) {
        for (kind, payload) in side_effect_intents(order, event) {
            self.outbox.enqueue(kind, payload).await;
        }
    }

    async fn enqueue<T: serde::Serialize>(&self, kind: IntentKind, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(value) => self.outbox.enqueue(kind, value).await,
            Err(e) => tracing::warn!("Could not serialize {} payload: {}", kind.as_str(), e),
        }
    }
}

/// The outbox intents a committed transition produces, in enqueue order.
fn side_effect_intents(order: &Order, event: &OrderEvent) -> Vec<(IntentKind, serde_json::Value)> {
    let keys = MemberKeys::from_email_phone(&order.customer_email, &order.customer_phone);
    let mut intents = Vec::new();
    let mut push = |kind: IntentKind, payload: Result<serde_json::Value, serde_json::Error>| {
        match payload {
            Ok(value) => intents.push((kind, value)),
            Err(e) => tracing::warn!("Could not serialize {} payload: {}", kind.as_str(), e),
        }
    };

    match event {
        OrderEvent::Confirm => {
            // Orders taken over the phone may have no email; those fall back
            // to the member feed.
            let notify = if order.customer_email.is_empty() {
                json!({
                    "target": "member",
                    "title": "訂單已確認",
                    "body": format!("訂單 {} 已確認", order.order_number),
                })
            } else {
                json!({
                    "target": "user",
                    "target_user_email": order.customer_email,
                    "title": "訂單已確認",
                    "body": format!("訂單 {} 已確認", order.order_number),
                })
            };
            push(IntentKind::Notify, Ok(notify));
        }
        OrderEvent::Close => {
            // Replay the deduction before crediting. The ledger ref makes
            // this a no-op when the create-time intent already landed.
            if order.points_used > 0 {
                let deduct = DeductPayload {
                    keys: keys.clone(),
                    points: order.points_used,
                    order_id: order.order_number.clone(),
                    reason: DEDUCT_REASON.to_string(),
                };
                push(IntentKind::PointsDeduct, serde_json::to_value(&deduct));
            }
            let credit = CreditPayload {
                keys: keys.clone(),
                order_id: order.order_number.clone(),
                items: order.service_items.clone(),
                points_deduct_amount: order.points_deduct_amount,
            };
            push(IntentKind::PointsCredit, serde_json::to_value(&credit));
            push(
                IntentKind::InvoiceIssue,
                Ok(json!({
                    "orderNumber": order.order_number,
                    "buyerEmail": order.customer_email,
                    "items": order.service_items,
                    "pointsDeductAmount": order.points_deduct_amount,
                })),
            );
        }
        OrderEvent::Cancel => {
            if order.points_used > 0 {
                let refund = RefundPayload {
                    keys,
                    order_id: order.order_number.clone(),
                };
                push(IntentKind::PointsRefund, serde_json::to_value(&refund));
            }
        }
        OrderEvent::MarkUnservice(_) => {
            push(
                IntentKind::Notify,
                Ok(json!({
                    "target": "support",
                    "title": "無法服務",
                    "body": format!("訂單 {} 標記為無法服務", order.order_number),
                })),
            );
        }
        OrderEvent::StartWork | OrderEvent::CompleteWork => {}
    }

    intents
}

fn merge_lifecycle_patch(order: &mut Order, patch: OrderPatch) {
    if let Some(status) = patch.status {
        order.status = status;
    }
    if let Some(ts) = patch.work_started_at {
        order.work_started_at = Some(ts);
    }
    if let Some(ts) = patch.work_completed_at {
        order.work_completed_at = Some(ts);
    }
    if let Some(ts) = patch.closed_at {
        order.closed_at = Some(ts);
    }
    if let Some(actor) = patch.created_by {
        order.created_by = Some(actor);
    }
    if let Some(items) = patch.service_items {
        order.service_items = items;
    }
    if let Some(signatures) = patch.signatures {
        order.signatures = signatures;
    }
    if let Some(note) = patch.note {
        order.note = note;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::lifecycle::test_support::{base_order, fixed_now};
    use crate::orders::models::Signatures;

    #[test]
    fn test_merge_lifecycle_patch_overwrites_only_set_fields() {
        let mut order = base_order(OrderStatus::Confirmed);
        order.note = "原始備註".to_string();

        let patch = OrderPatch {
            status: Some(OrderStatus::InProgress),
            work_started_at: Some(fixed_now()),
            ..OrderPatch::default()
        };
        merge_lifecycle_patch(&mut order, patch);

        assert_eq!(order.status, OrderStatus::InProgress);
        assert_eq!(order.work_started_at, Some(fixed_now()));
        assert_eq!(order.note, "原始備註");
        assert!(order.work_completed_at.is_none());
    }

    #[test]
    fn test_close_replays_deduction_alongside_credit_and_invoice() {
        let mut order = base_order(OrderStatus::Closed);
        order.points_used = 250;

        let intents = side_effect_intents(&order, &OrderEvent::Close);
        let kinds: Vec<IntentKind> = intents.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![
                IntentKind::PointsDeduct,
                IntentKind::PointsCredit,
                IntentKind::InvoiceIssue,
            ]
        );

        // Same order and reason as the create-time intent, so both resolve
        // to the same ledger row.
        let deduct: DeductPayload = serde_json::from_value(intents[0].1.clone()).unwrap();
        assert_eq!(deduct.order_id, order.order_number);
        assert_eq!(deduct.reason, DEDUCT_REASON);
        assert_eq!(deduct.points, 250);
    }

    #[test]
    fn test_close_without_discount_skips_deduction() {
        let order = base_order(OrderStatus::Closed);

        let kinds: Vec<IntentKind> = side_effect_intents(&order, &OrderEvent::Close)
            .iter()
            .map(|(kind, _)| *kind)
            .collect();
        assert_eq!(
            kinds,
            vec![IntentKind::PointsCredit, IntentKind::InvoiceIssue]
        );
    }

    #[test]
    fn test_confirm_notifies_the_customer() {
        let order = base_order(OrderStatus::Confirmed);

        let intents = side_effect_intents(&order, &OrderEvent::Confirm);
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].0, IntentKind::Notify);
        assert_eq!(intents[0].1["target"], "user");
        assert_eq!(intents[0].1["target_user_email"], order.customer_email);
    }

    #[test]
    fn test_confirm_without_email_falls_back_to_member_feed() {
        let mut order = base_order(OrderStatus::Confirmed);
        order.customer_email = String::new();

        let intents = side_effect_intents(&order, &OrderEvent::Confirm);
        assert_eq!(intents[0].1["target"], "member");
        assert!(intents[0].1.get("target_user_email").is_none());
    }

    #[test]
    fn test_merge_lifecycle_patch_replaces_signatures_wholesale() {
        let mut order = base_order(OrderStatus::InProgress);
        order.signatures.technician = Some("tech-sig".to_string());

        let patch = OrderPatch {
            signatures: Some(Signatures {
                technician: Some("tech-sig".to_string()),
                customer: Some("customer-sig".to_string()),
            }),
            ..OrderPatch::default()
        };
        merge_lifecycle_patch(&mut order, patch);

        assert_eq!(order.signatures.customer.as_deref(), Some("customer-sig"));
        assert_eq!(order.signatures.technician.as_deref(), Some("tech-sig"));
    }
}
