// Database access for technicians and the schedule board

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dispatch::error::DispatchError;
use crate::dispatch::models::{
    SaveLeaveRequest, SaveSupportShiftRequest, SupportShift, Technician, TechnicianLeave,
    UpsertTechnicianRequest, WorkAssignment,
};

const TECHNICIAN_COLUMNS: &str =
    "id, email, display_name, region, skills, status, scheme, created_at, updated_at";

/// Repository for technician records
#[derive(Clone)]
pub struct TechnicianRepository {
    pool: PgPool,
}

impl TechnicianRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Technician>, DispatchError> {
        let technicians = sqlx::query_as::<_, Technician>(&format!(
            "SELECT {} FROM technicians ORDER BY display_name",
            TECHNICIAN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(technicians)
    }

    pub async fn find_by_emails(
        &self,
        emails: &[String],
    ) -> Result<Vec<Technician>, DispatchError> {
        let technicians = sqlx::query_as::<_, Technician>(&format!(
            "SELECT {} FROM technicians WHERE email = ANY($1) ORDER BY display_name",
            TECHNICIAN_COLUMNS
        ))
        .bind(emails)
        .fetch_all(&self.pool)
        .await?;
        Ok(technicians)
    }

    /// Insert or update by email, the natural key.
    pub async fn upsert(
        &self,
        request: &UpsertTechnicianRequest,
    ) -> Result<Technician, DispatchError> {
        let technician = sqlx::query_as::<_, Technician>(&format!(
            r#"
            INSERT INTO technicians (email, display_name, region, skills, status, scheme)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                region = EXCLUDED.region,
                skills = EXCLUDED.skills,
                status = EXCLUDED.status,
                scheme = EXCLUDED.scheme,
                updated_at = NOW()
            RETURNING {}
            "#,
            TECHNICIAN_COLUMNS
        ))
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(request.region)
        .bind(serde_json::to_value(&request.skills).unwrap_or_default())
        .bind(request.status)
        .bind(request.scheme.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(technician)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), DispatchError> {
        let result = sqlx::query("DELETE FROM technicians WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DispatchError::TechnicianNotFound);
        }
        Ok(())
    }
}

/// Repository for the schedule board: leaves, work blocks, support shifts.
#[derive(Clone)]
pub struct ScheduleRepository {
    pool: PgPool,
}

impl ScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_work(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WorkAssignment>, DispatchError> {
        let assignments = sqlx::query_as::<_, WorkAssignment>(
            r#"
            SELECT id, technician_email, order_id, work_date, start_time, end_time, created_at
            FROM work_assignments
            WHERE work_date >= $1 AND work_date <= $2
            ORDER BY work_date, start_time
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(assignments)
    }

    pub async fn list_technician_leaves(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TechnicianLeave>, DispatchError> {
        let leaves = sqlx::query_as::<_, TechnicianLeave>(
            r#"
            SELECT id, technician_email, leave_date, full_day, start_time, end_time,
                   reason, created_at
            FROM technician_leaves
            WHERE leave_date >= $1 AND leave_date <= $2
            ORDER BY leave_date
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(leaves)
    }

    pub async fn save_technician_leave(
        &self,
        request: &SaveLeaveRequest,
    ) -> Result<TechnicianLeave, DispatchError> {
        let leave = sqlx::query_as::<_, TechnicianLeave>(
            r#"
            INSERT INTO technician_leaves
                (technician_email, leave_date, full_day, start_time, end_time, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, technician_email, leave_date, full_day, start_time, end_time,
                      reason, created_at
            "#,
        )
        .bind(&request.technician_email)
        .bind(request.leave_date)
        .bind(request.full_day)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(&request.reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(leave)
    }

    /// Replace the work blocks for an order with a fresh set, atomically.
    /// Reassignment must not leave stale blocks behind.
    pub async fn replace_work_for_order(
        &self,
        order_id: Uuid,
        emails: &[String],
        work_date: NaiveDate,
        start_time: chrono::NaiveTime,
        end_time: chrono::NaiveTime,
    ) -> Result<(), DispatchError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM work_assignments WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        for email in emails {
            sqlx::query(
                r#"
                INSERT INTO work_assignments
                    (technician_email, order_id, work_date, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(email)
            .bind(order_id)
            .bind(work_date)
            .bind(start_time)
            .bind(end_time)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_support(&self) -> Result<Vec<SupportShift>, DispatchError> {
        let shifts = sqlx::query_as::<_, SupportShift>(
            r#"
            SELECT id, user_email, shift_date, start_time, end_time, note, created_at
            FROM support_shifts
            ORDER BY shift_date, start_time
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(shifts)
    }

    pub async fn save_support_shift(
        &self,
        request: &SaveSupportShiftRequest,
    ) -> Result<SupportShift, DispatchError> {
        let shift = sqlx::query_as::<_, SupportShift>(
            r#"
            INSERT INTO support_shifts (user_email, shift_date, start_time, end_time, note)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_email, shift_date, start_time, end_time, note, created_at
            "#,
        )
        .bind(&request.user_email)
        .bind(request.shift_date)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(&request.note)
        .fetch_one(&self.pool)
        .await?;
        Ok(shift)
    }
}
