//! External collaborators of the workflow engine, with in-memory
//! implementations for tests and local runs.

pub mod loyalty;
pub mod reservation;
pub mod staff;

pub use loyalty::{InMemoryLoyaltyService, LoyaltyService, PointsAward};
pub use reservation::{InMemoryTableReservationService, ReservationRequest, TableReservationService};
pub use staff::{InMemoryStaffDirectory, StaffDirectory, StaffMember};
