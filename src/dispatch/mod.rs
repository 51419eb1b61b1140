// Dispatch module
//
// Technician records, the schedule board (leaves, work blocks, support
// shifts) and the availability resolver that decides who can take a
// requested service window.

pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod resolver;
pub mod service;

pub use error::DispatchError;
pub use models::{
    AvailabilityQuery, AvailabilityReport, ExcludedTechnician, ExclusionReason, Region,
    SkillMatch, Technician, TechnicianLeave, TechnicianStatus, UpsertTechnicianRequest,
    WorkAssignment,
};
pub use repository::{ScheduleRepository, TechnicianRepository};
pub use resolver::{overlap, resolve};
pub use service::DispatchService;
