// Business logic for availability queries and order assignment

use uuid::Uuid;

use crate::dispatch::error::DispatchError;
use crate::dispatch::models::{AvailabilityQuery, AvailabilityReport};
use crate::dispatch::repository::{ScheduleRepository, TechnicianRepository};
use crate::dispatch::resolver;
use crate::orders::repository::OrderRepository;

/// Service for dispatch business logic
#[derive(Clone)]
pub struct DispatchService {
    technicians: TechnicianRepository,
    schedule: ScheduleRepository,
    orders: OrderRepository,
}

impl DispatchService {
    pub fn new(
        technicians: TechnicianRepository,
        schedule: ScheduleRepository,
        orders: OrderRepository,
    ) -> Self {
        Self {
            technicians,
            schedule,
            orders,
        }
    }

    /// Who can take the requested window, and who cannot and why.
    pub async fn availability(
        &self,
        query: &AvailabilityQuery,
    ) -> Result<AvailabilityReport, DispatchError> {
        if query.start_time >= query.end_time {
            return Err(DispatchError::ValidationError(
                "請選擇正確的時段".to_string(),
            ));
        }

        let technicians = self.technicians.list().await?;
        let leaves = self
            .schedule
            .list_technician_leaves(query.date, query.date)
            .await?;
        let assignments = self.schedule.list_work(query.date, query.date).await?;

        Ok(resolver::resolve(
            &technicians,
            &leaves,
            &assignments,
            query,
        ))
    }

    /// Assign technicians to an order: writes their display names onto the
    /// order (a denormalized snapshot, deliberately not a foreign key) and
    /// replaces the order's work blocks on the schedule.
    pub async fn assign(
        &self,
        order_id: Uuid,
        emails: &[String],
    ) -> Result<Vec<String>, DispatchError> {
        if emails.is_empty() {
            return Err(DispatchError::ValidationError(
                "請選擇至少一位技師".to_string(),
            ));
        }

        let order = self
            .orders
            .find_by_id(order_id)
            .await
            .map_err(|e| DispatchError::DatabaseError(e.to_string()))?
            .ok_or(DispatchError::OrderNotFound)?;

        let (Some(date), Some(start), Some(end)) = (
            order.preferred_date,
            order.preferred_time_start,
            order.preferred_time_end,
        ) else {
            return Err(DispatchError::ValidationError(
                "請先設定預約日期與時段".to_string(),
            ));
        };

        let technicians = self.technicians.find_by_emails(emails).await?;
        if technicians.len() != emails.len() {
            return Err(DispatchError::TechnicianNotFound);
        }
        let names: Vec<String> = technicians.iter().map(|t| t.display_name.clone()).collect();

        self.schedule
            .replace_work_for_order(order_id, emails, date, start, end)
            .await?;
        self.orders
            .set_assigned_technicians(order_id, &names)
            .await
            .map_err(|e| DispatchError::DatabaseError(e.to_string()))?;

        Ok(names)
    }
}
