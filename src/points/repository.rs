use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::points::error::PointsError;
use crate::points::identity::{Lookup, MemberKeys};
use crate::points::models::{LedgerEntry, LedgerKind, Member};

const MEMBER_COLUMNS: &str = "id, code, email, phone, points, created_at, updated_at";

/// Repository for member records
#[derive(Clone)]
pub struct MemberRepository {
    pool: PgPool,
}

impl MemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Member>, PointsError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE id = $1",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<Member>, PointsError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE code = $1",
            MEMBER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Member>, PointsError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE email = $1 ORDER BY created_at LIMIT 1",
            MEMBER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<Member>, PointsError> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {} FROM members WHERE phone = $1 ORDER BY created_at LIMIT 1",
            MEMBER_COLUMNS
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(member)
    }

    /// Resolve a disjunctive identity: try each key in precedence order,
    /// first hit wins.
    pub async fn resolve(&self, keys: &MemberKeys) -> Result<Option<Member>, PointsError> {
        for lookup in keys.lookups() {
            let found = match lookup {
                Lookup::Id(id) => self.get(id).await?,
                Lookup::Code(code) => self.find_by_code(&code).await?,
                Lookup::Email(email) => self.find_by_email(&email).await?,
                Lookup::Phone(phone) => self.find_by_phone(&phone).await?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Create a member with a fresh MO-code. Retries on the unlikely code
    /// collision.
    pub async fn create(&self, email: &str, phone: &str) -> Result<Member, PointsError> {
        for _ in 0..5 {
            let code = generate_member_code();
            let result = sqlx::query_as::<_, Member>(&format!(
                r#"
                INSERT INTO members (code, email, phone)
                VALUES ($1, $2, $3)
                ON CONFLICT (code) DO NOTHING
                RETURNING {}
                "#,
                MEMBER_COLUMNS
            ))
            .bind(&code)
            .bind(email)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(member) = result {
                tracing::info!("Created member {} ({})", member.code, member.id);
                return Ok(member);
            }
        }
        Err(PointsError::DatabaseError(
            "Could not allocate a member code".to_string(),
        ))
    }
}

/// Member codes are "MO" plus four digits.
pub fn generate_member_code() -> String {
    let n: u16 = rand::thread_rng().gen_range(0..10000);
    format!("MO{:04}", n)
}

/// Repository over the points ledger. Balance updates ride in the same
/// transaction as the ledger insert so the two can never diverge.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a ledger entry keyed by `(order_id, ref)`, applying
    /// `balance_delta` to the member balance only when the entry is new.
    /// Returns whether the entry was inserted (false = idempotent replay).
    pub async fn apply_idempotent(
        &self,
        member_id: Uuid,
        order_id: &str,
        entry_ref: &str,
        kind: LedgerKind,
        points: i32,
        reason: &str,
        balance_delta: i32,
    ) -> Result<bool, PointsError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO points_ledger (member_id, order_id, ref, kind, points, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id, ref) DO NOTHING
            "#,
        )
        .bind(member_id)
        .bind(order_id)
        .bind(entry_ref)
        .bind(kind.as_str())
        .bind(points)
        .bind(reason)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted && balance_delta != 0 {
            sqlx::query("UPDATE members SET points = points + $1, updated_at = NOW() WHERE id = $2")
                .bind(balance_delta)
                .bind(member_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Total points deducted against an order for a member (positive number).
    pub async fn total_deducted(
        &self,
        member_id: Uuid,
        order_id: &str,
    ) -> Result<i32, PointsError> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(points)::BIGINT
            FROM points_ledger
            WHERE member_id = $1 AND order_id = $2 AND kind = 'deduct'
            "#,
        )
        .bind(member_id)
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0) as i32)
    }

    pub async fn list_for_member(&self, member_id: Uuid) -> Result<Vec<LedgerEntry>, PointsError> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, member_id, order_id, ref, kind, points, reason, created_at
            FROM points_ledger
            WHERE member_id = $1
            ORDER BY id DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation;

    #[test]
    fn test_generated_codes_are_well_formed() {
        for _ in 0..100 {
            let code = generate_member_code();
            assert!(validation::is_member_code(&code), "bad code: {}", code);
        }
    }
}
