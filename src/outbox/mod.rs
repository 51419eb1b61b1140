// Side-effect outbox
//
// Best-effort side effects (notifications, points ledger calls, invoice
// issuance) are persisted as intents instead of being fired and forgotten.
// The primary order mutation commits first; a background worker drains the
// queue and retries, so a partial failure converges instead of silently
// disappearing. Failed intents stay on the table for inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;

use crate::invoices::EInvoiceClient;
use crate::notifications::NotificationService;
use crate::points::PointsService;

/// Maximum delivery attempts before an intent is parked as failed.
const MAX_ATTEMPTS: i32 = 5;

/// Kinds of side-effect intents the engine can enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentKind {
    Notify,
    PointsDeduct,
    PointsCredit,
    PointsRefund,
    InvoiceIssue,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Notify => "notify",
            IntentKind::PointsDeduct => "points-deduct",
            IntentKind::PointsCredit => "points-credit",
            IntentKind::PointsRefund => "points-refund",
            IntentKind::InvoiceIssue => "invoice-issue",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "notify" => Some(IntentKind::Notify),
            "points-deduct" => Some(IntentKind::PointsDeduct),
            "points-credit" => Some(IntentKind::PointsCredit),
            "points-refund" => Some(IntentKind::PointsRefund),
            "invoice-issue" => Some(IntentKind::InvoiceIssue),
            _ => None,
        }
    }
}

/// A persisted side-effect intent.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxRow {
    pub id: i64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository over the outbox table
#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue an intent. Best-effort by contract: an enqueue failure is
    /// logged and swallowed so it never fails the primary mutation.
    pub async fn enqueue(&self, kind: IntentKind, payload: serde_json::Value) {
        let result = sqlx::query("INSERT INTO outbox (kind, payload) VALUES ($1, $2)")
            .bind(kind.as_str())
            .bind(&payload)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::warn!("Failed to enqueue {} intent: {}", kind.as_str(), e);
        }
    }

    /// Claim a batch of pending intents, oldest first.
    pub async fn claim_pending(&self, limit: i64) -> Result<Vec<OutboxRow>, sqlx::Error> {
        sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, kind, payload, status, attempts, last_error, created_at, updated_at
            FROM outbox
            WHERE status = 'pending'
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn mark_done(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE outbox SET status = 'done', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed attempt; park the intent once the attempt cap is hit.
    pub async fn mark_attempt_failed(&self, id: i64, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET attempts = attempts + 1,
                last_error = $2,
                status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE 'pending' END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(MAX_ATTEMPTS)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Failed intents, for operator inspection.
    pub async fn list_failed(&self) -> Result<Vec<OutboxRow>, sqlx::Error> {
        sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, kind, payload, status, attempts, last_error, created_at, updated_at
            FROM outbox
            WHERE status = 'failed'
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// Background worker draining the outbox.
pub struct OutboxWorker {
    repo: OutboxRepository,
    notifications: NotificationService,
    points: PointsService,
    invoices: Arc<EInvoiceClient>,
}

impl OutboxWorker {
    pub fn new(
        repo: OutboxRepository,
        notifications: NotificationService,
        points: PointsService,
        invoices: Arc<EInvoiceClient>,
    ) -> Self {
        Self {
            repo,
            notifications,
            points,
            invoices,
        }
    }

    /// Drain loop. Runs until the process exits.
    pub async fn run(self, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.drain_once().await {
                tracing::warn!("Outbox drain pass failed: {}", e);
            }
        }
    }

    /// One drain pass: claim pending intents and dispatch each.
    pub async fn drain_once(&self) -> Result<usize, sqlx::Error> {
        let rows = self.repo.claim_pending(20).await?;
        let mut dispatched = 0;

        for row in rows {
            match self.dispatch(&row).await {
                Ok(()) => {
                    self.repo.mark_done(row.id).await?;
                    dispatched += 1;
                }
                Err(e) => {
                    tracing::warn!("Intent {} ({}) failed: {}", row.id, row.kind, e);
                    self.repo.mark_attempt_failed(row.id, &e).await?;
                }
            }
        }

        Ok(dispatched)
    }

    async fn dispatch(&self, row: &OutboxRow) -> Result<(), String> {
        let kind = IntentKind::from_str(&row.kind)
            .ok_or_else(|| format!("unknown intent kind: {}", row.kind))?;

        match kind {
            IntentKind::Notify => self
                .notifications
                .push_from_payload(&row.payload)
                .await
                .map_err(|e| e.to_string()),
            IntentKind::PointsDeduct => self
                .points
                .deduct_from_payload(&row.payload)
                .await
                .map_err(|e| e.to_string()),
            IntentKind::PointsCredit => self
                .points
                .credit_from_payload(&row.payload)
                .await
                .map_err(|e| e.to_string()),
            IntentKind::PointsRefund => self
                .points
                .refund_from_payload(&row.payload)
                .await
                .map_err(|e| e.to_string()),
            IntentKind::InvoiceIssue => self
                .invoices
                .issue_from_payload(&row.payload)
                .await
                .map_err(|e| e.to_string()),
        }
    }
}
