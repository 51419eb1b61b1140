use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::orders::models::ServiceItem;
use crate::points::error::PointsError;
use crate::points::identity::MemberKeys;
use crate::points::models::{
    CreditPayload, DeductPayload, LedgerEntry, LedgerKind, Member, RefundPayload,
};
use crate::points::repository::{LedgerRepository, MemberRepository};

/// Net dollars required to earn one point.
const DOLLARS_PER_POINT: Decimal = Decimal::ONE_HUNDRED;

/// Service for member identity and the points ledger
#[derive(Clone)]
pub struct PointsService {
    members: MemberRepository,
    ledger: LedgerRepository,
}

impl PointsService {
    pub fn new(members: MemberRepository, ledger: LedgerRepository) -> Self {
        Self { members, ledger }
    }

    /// Resolve the member for a set of keys, creating one lazily when only
    /// email/phone are known.
    pub async fn ensure_profile(&self, keys: &MemberKeys) -> Result<Member, PointsError> {
        if keys.is_empty() {
            return Err(PointsError::NoIdentity);
        }
        if let Some(member) = self.members.resolve(keys).await? {
            return Ok(member);
        }
        let email = keys.email.as_deref().unwrap_or("");
        let phone = keys.phone.as_deref().unwrap_or("");
        if email.is_empty() && phone.is_empty() {
            return Err(PointsError::MemberNotFound);
        }
        self.members.create(email, phone).await
    }

    /// Current balance for a member, or an error if no key resolves.
    pub async fn get_balance(&self, keys: &MemberKeys) -> Result<(Member, i32), PointsError> {
        let member = self
            .members
            .resolve(keys)
            .await?
            .ok_or(PointsError::MemberNotFound)?;
        let points = member.points;
        Ok((member, points))
    }

    /// Deduct points from a member against an order. Replays with the same
    /// reason are no-ops.
    pub async fn deduct(
        &self,
        keys: &MemberKeys,
        points: i32,
        order_id: &str,
        reason: &str,
    ) -> Result<Member, PointsError> {
        if points <= 0 {
            return Err(PointsError::InvalidPayload(
                "points must be positive".to_string(),
            ));
        }
        let member = self.ensure_profile(keys).await?;
        let entry_ref = deduct_ref(reason);
        self.ledger
            .apply_idempotent(
                member.id,
                order_id,
                &entry_ref,
                LedgerKind::Deduct,
                points,
                reason,
                -points,
            )
            .await?;
        Ok(member)
    }

    /// Stage the credit earned by a closed order. Pending credits do not move
    /// the balance until an operator confirms them.
    pub async fn credit_pending(
        &self,
        keys: &MemberKeys,
        order_id: &str,
        items: &[ServiceItem],
        points_deduct_amount: Decimal,
    ) -> Result<i32, PointsError> {
        let points = credit_points(items, points_deduct_amount);
        if points == 0 {
            return Ok(0);
        }
        let member = self.ensure_profile(keys).await?;
        self.ledger
            .apply_idempotent(
                member.id,
                order_id,
                "close-credit",
                LedgerKind::PendingCredit,
                points,
                "訂單結案回饋",
                0,
            )
            .await?;
        Ok(points)
    }

    /// Return everything deducted against an order. Idempotent per order.
    pub async fn refund(&self, keys: &MemberKeys, order_id: &str) -> Result<i32, PointsError> {
        let member = self
            .members
            .resolve(keys)
            .await?
            .ok_or(PointsError::MemberNotFound)?;
        let deducted = self.ledger.total_deducted(member.id, order_id).await?;
        if deducted <= 0 {
            return Ok(0);
        }
        self.ledger
            .apply_idempotent(
                member.id,
                order_id,
                "cancel-refund",
                LedgerKind::Refund,
                deducted,
                "訂單取消退還",
                deducted,
            )
            .await?;
        Ok(deducted)
    }

    /// Ledger history for a member, newest entries first.
    pub async fn history(
        &self,
        keys: &MemberKeys,
    ) -> Result<(Member, Vec<LedgerEntry>), PointsError> {
        let member = self
            .members
            .resolve(keys)
            .await?
            .ok_or(PointsError::MemberNotFound)?;
        let entries = self.ledger.list_for_member(member.id).await?;
        Ok((member, entries))
    }

    /// Operator adjustment: either set the balance to an absolute value or
    /// apply a signed delta.
    pub async fn admin_adjust(
        &self,
        keys: &MemberKeys,
        set_to: Option<i32>,
        delta: Option<i32>,
        reason: &str,
    ) -> Result<Member, PointsError> {
        let member = self.ensure_profile(keys).await?;
        let applied_delta = match (set_to, delta) {
            (Some(target), _) => target - member.points,
            (None, Some(d)) => d,
            (None, None) => {
                return Err(PointsError::InvalidPayload(
                    "setTo or delta is required".to_string(),
                ))
            }
        };
        if applied_delta == 0 {
            return Ok(member);
        }
        let entry_ref = format!("adjust-{}", chrono::Utc::now().timestamp_millis());
        self.ledger
            .apply_idempotent(
                member.id,
                "admin",
                &entry_ref,
                LedgerKind::Adjust,
                applied_delta,
                reason,
                applied_delta,
            )
            .await?;
        self.members
            .get(member.id)
            .await?
            .ok_or(PointsError::MemberNotFound)
    }

    // Outbox adapters. Payloads were serialized by the order service; a parse
    // failure here means a bug, not a transient condition, but the worker
    // treats both the same way.

    pub async fn deduct_from_payload(
        &self,
        payload: &serde_json::Value,
    ) -> Result<(), PointsError> {
        let p: DeductPayload = serde_json::from_value(payload.clone())?;
        self.deduct(&p.keys, p.points, &p.order_id, &p.reason)
            .await?;
        Ok(())
    }

    pub async fn credit_from_payload(
        &self,
        payload: &serde_json::Value,
    ) -> Result<(), PointsError> {
        let p: CreditPayload = serde_json::from_value(payload.clone())?;
        self.credit_pending(&p.keys, &p.order_id, &p.items, p.points_deduct_amount)
            .await?;
        Ok(())
    }

    pub async fn refund_from_payload(
        &self,
        payload: &serde_json::Value,
    ) -> Result<(), PointsError> {
        let p: RefundPayload = serde_json::from_value(payload.clone())?;
        match self.refund(&p.keys, &p.order_id).await {
            Ok(_) => Ok(()),
            // Nothing to refund for an unknown member.
            Err(PointsError::MemberNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Credit earned by an order: one point per full hundred dollars of net value
/// (item subtotals minus the points discount), never negative.
pub fn credit_points(items: &[ServiceItem], points_deduct_amount: Decimal) -> i32 {
    let gross: Decimal = items.iter().map(|item| item.subtotal()).sum();
    let net = gross - points_deduct_amount;
    if net <= Decimal::ZERO {
        return 0;
    }
    (net / DOLLARS_PER_POINT)
        .floor()
        .to_i32()
        .unwrap_or(0)
        .max(0)
}

/// Stable idempotency ref for a deduction, derived from its reason.
fn deduct_ref(reason: &str) -> String {
    let digest = Sha256::digest(reason.as_bytes());
    format!("deduct-{:x}", digest)[..23].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(price: Decimal, qty: i32) -> ServiceItem {
        ServiceItem {
            name: "冷氣清洗".to_string(),
            quantity: qty,
            unit_price: price,
            product_id: None,
        }
    }

    #[test]
    fn test_credit_points_floors_net_value() {
        let items = vec![item(dec!(1500), 2), item(dec!(250), 1)];
        // 3250 gross, 250 discount, net 3000 => 30 points
        assert_eq!(credit_points(&items, dec!(250)), 30);
    }

    #[test]
    fn test_credit_points_sub_hundred_net() {
        let items = vec![item(dec!(99), 1)];
        assert_eq!(credit_points(&items, Decimal::ZERO), 0);
    }

    #[test]
    fn test_credit_points_never_negative() {
        let items = vec![item(dec!(100), 1)];
        assert_eq!(credit_points(&items, dec!(500)), 0);
        assert_eq!(credit_points(&[], Decimal::ZERO), 0);
    }

    #[test]
    fn test_credit_points_ignores_sign_of_mirror_lines() {
        // An unserviced order nets to the fare only.
        let items = vec![item(dec!(1500), 1), item(dec!(1500), -1), item(dec!(400), 1)];
        assert_eq!(credit_points(&items, Decimal::ZERO), 4);
    }

    #[test]
    fn test_deduct_ref_is_stable_and_short() {
        let a = deduct_ref("訂單折抵");
        let b = deduct_ref("訂單折抵");
        assert_eq!(a, b);
        assert!(a.starts_with("deduct-"));
        assert_eq!(a.len(), 23);
        assert_ne!(a, deduct_ref("其他原因"));
    }
}
