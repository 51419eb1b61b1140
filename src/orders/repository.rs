// Database access for orders

use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::orders::error::OrderError;
use crate::orders::models::{CreateOrderRequest, Order, OrderStatus};

const ORDER_COLUMNS: &str = r#"
    id, order_number, status, customer_name, customer_phone, customer_email,
    customer_address, preferred_date, preferred_time_start, preferred_time_end,
    service_items, points_used, points_deduct_amount, payment_method,
    payment_status, assigned_technicians, signature_technician, signatures,
    photos_before, photos_after, work_started_at, work_completed_at, closed_at,
    note, created_by, created_at, updated_at
"#;

/// Repository for order data access
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new draft order with a freshly generated order number.
    /// Retries on the rare number collision.
    pub async fn create(
        &self,
        request: &CreateOrderRequest,
        created_by: Option<&str>,
    ) -> Result<Order, OrderError> {
        for _ in 0..5 {
            let order_number = generate_order_number();
            let result = sqlx::query_as::<_, Order>(&format!(
                r#"
                INSERT INTO orders (
                    order_number, customer_name, customer_phone, customer_email,
                    customer_address, preferred_date, preferred_time_start,
                    preferred_time_end, service_items, points_used,
                    points_deduct_amount, note, created_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (order_number) DO NOTHING
                RETURNING {}
                "#,
                ORDER_COLUMNS
            ))
            .bind(&order_number)
            .bind(&request.customer_name)
            .bind(&request.customer_phone)
            .bind(&request.customer_email)
            .bind(&request.customer_address)
            .bind(request.preferred_date)
            .bind(request.preferred_time_start)
            .bind(request.preferred_time_end)
            .bind(serde_json::to_value(&request.service_items).unwrap_or_default())
            .bind(request.points_used)
            .bind(request.points_deduct_amount)
            .bind(&request.note)
            .bind(created_by)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(order) = result {
                tracing::info!("Created order {} ({})", order.order_number, order.id);
                return Ok(order);
            }
        }
        Err(OrderError::DatabaseError(
            "Could not allocate an order number".to_string(),
        ))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, OrderError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    /// List orders, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, OrderError> {
        let orders = match status {
            Some(status) => {
                sqlx::query_as::<_, Order>(&format!(
                    "SELECT {} FROM orders WHERE status = $1 ORDER BY created_at DESC",
                    ORDER_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Order>(&format!(
                    "SELECT {} FROM orders ORDER BY created_at DESC",
                    ORDER_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(orders)
    }

    /// Orders assigned on a given date, for the schedule board.
    pub async fn list_for_date(
        &self,
        date: chrono::NaiveDate,
    ) -> Result<Vec<Order>, OrderError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE preferred_date = $1 ORDER BY preferred_time_start",
            ORDER_COLUMNS
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    /// Persist a fully merged order. `expected_status` is the status the
    /// order was read at; the update applies only when it still holds, so
    /// two racing transitions cannot both win.
    pub async fn save(
        &self,
        order: &Order,
        expected_status: OrderStatus,
    ) -> Result<Option<Order>, OrderError> {
        let saved = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders SET
                status = $3,
                customer_name = $4,
                customer_phone = $5,
                customer_email = $6,
                customer_address = $7,
                preferred_date = $8,
                preferred_time_start = $9,
                preferred_time_end = $10,
                service_items = $11,
                points_used = $12,
                points_deduct_amount = $13,
                payment_method = $14,
                payment_status = $15,
                assigned_technicians = $16,
                signature_technician = $17,
                signatures = $18,
                photos_before = $19,
                photos_after = $20,
                work_started_at = $21,
                work_completed_at = $22,
                closed_at = $23,
                note = $24,
                created_by = $25,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(order.id)
        .bind(expected_status.as_str())
        .bind(order.status.as_str())
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_email)
        .bind(&order.customer_address)
        .bind(order.preferred_date)
        .bind(order.preferred_time_start)
        .bind(order.preferred_time_end)
        .bind(serde_json::to_value(&order.service_items).unwrap_or_default())
        .bind(order.points_used)
        .bind(order.points_deduct_amount)
        .bind(order.payment_method.map(|m| m.to_string()))
        .bind(order.payment_status.as_str())
        .bind(serde_json::to_value(&order.assigned_technicians).unwrap_or_default())
        .bind(order.signature_technician.as_deref())
        .bind(serde_json::to_value(&order.signatures).unwrap_or_default())
        .bind(serde_json::to_value(&order.photos_before).unwrap_or_default())
        .bind(serde_json::to_value(&order.photos_after).unwrap_or_default())
        .bind(order.work_started_at)
        .bind(order.work_completed_at)
        .bind(order.closed_at)
        .bind(&order.note)
        .bind(order.created_by.as_deref())
        .fetch_optional(&self.pool)
        .await?;
        Ok(saved)
    }

    /// Overwrite the assigned technician names on an order.
    pub async fn set_assigned_technicians(
        &self,
        id: Uuid,
        names: &[String],
    ) -> Result<Order, OrderError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r#"
            UPDATE orders
            SET assigned_technicians = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(serde_json::to_value(names).unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(OrderError::NotFound)?;
        Ok(order)
    }
}

/// Order numbers are "SO" + YYMMDD + four random digits, matching the
/// database-side generator used by the public reservation intake.
pub fn generate_order_number() -> String {
    let date = chrono::Utc::now().format("%y%m%d");
    let n: u16 = rand::thread_rng().gen_range(0..10000);
    format!("SO{}{:04}", date, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_shape() {
        let number = generate_order_number();
        assert_eq!(number.len(), 12);
        assert!(number.starts_with("SO"));
        assert!(number[2..].chars().all(|c| c.is_ascii_digit()));
    }
}
