use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// Service region a technician covers. `All` matches every regional filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Region {
    North,
    Central,
    South,
    All,
}

impl Region {
    pub fn matches(&self, filter: Region) -> bool {
        *self == Region::All || *self == filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TechnicianStatus {
    Active,
    Suspended,
}

/// A field technician. Email is the natural key used by leave and
/// assignment records; the display name is what lands on orders.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Technician {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub region: Region,
    /// Named capability flags, e.g. {"aircon": true, "plumbing": false}.
    #[sqlx(json)]
    pub skills: HashMap<String, bool>,
    pub status: TechnicianStatus,
    pub scheme: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Technician {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.get(skill).copied().unwrap_or(false)
    }
}

/// Request DTO for creating or updating a technician
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertTechnicianRequest {
    pub email: String,
    pub display_name: String,
    pub region: Region,
    #[serde(default)]
    pub skills: HashMap<String, bool>,
    pub status: TechnicianStatus,
    pub scheme: Option<String>,
}

/// A blackout record for a technician. Any leave on a date blocks the
/// whole day, including partial-day records (see resolver).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TechnicianLeave {
    pub id: i32,
    pub technician_email: String,
    pub leave_date: NaiveDate,
    pub full_day: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SaveLeaveRequest {
    pub technician_email: String,
    pub leave_date: NaiveDate,
    #[serde(default = "default_full_day")]
    pub full_day: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub reason: String,
}

fn default_full_day() -> bool {
    true
}

/// One scheduled block of work produced by assigning an order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkAssignment {
    pub id: i32,
    pub technician_email: String,
    pub order_id: Uuid,
    pub work_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

/// An office support shift, managed on the same schedule board.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SupportShift {
    pub id: i32,
    pub user_email: String,
    pub shift_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SaveSupportShiftRequest {
    pub user_email: String,
    pub shift_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub note: String,
}

/// How a multi-skill filter combines its keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillMatch {
    All,
    Any,
}

/// Availability query for one half-open time window on a date.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub region: Option<Region>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "default_skill_match")]
    pub skill_match: SkillMatch,
}

fn default_skill_match() -> SkillMatch {
    SkillMatch::All
}

/// Why a technician cannot take the requested window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    OnLeave,
    Overlap {
        start: NaiveTime,
        end: NaiveTime,
    },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::OnLeave => write!(f, "請假"),
            ExclusionReason::Overlap { start, end } => {
                write!(f, "重疊 {}~{}", start.format("%H:%M"), end.format("%H:%M"))
            }
        }
    }
}

/// A technician blocked from the window, with the operator-facing reason.
#[derive(Debug, Clone, Serialize)]
pub struct ExcludedTechnician {
    pub technician: Technician,
    pub reason: ExclusionReason,
    pub reason_text: String,
}

/// The resolver's dual output: every candidate lands in exactly one list.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityReport {
    pub assignable: Vec<Technician>,
    pub excluded: Vec<ExcludedTechnician>,
}

/// Request DTO for assigning technicians to an order
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub technician_emails: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_region_matching() {
        assert!(Region::All.matches(Region::North));
        assert!(Region::North.matches(Region::North));
        assert!(!Region::North.matches(Region::South));
    }

    #[test]
    fn test_exclusion_reason_text() {
        assert_eq!(ExclusionReason::OnLeave.to_string(), "請假");
        let overlap = ExclusionReason::Overlap {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 30, 0).unwrap(),
        };
        assert_eq!(overlap.to_string(), "重疊 09:00~12:30");
    }
}
