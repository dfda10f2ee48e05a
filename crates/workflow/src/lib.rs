//! Order workflow engine.
//!
//! [`WorkflowEngine`] creates orders, assigns them to staff and moves them
//! through the status state machine:
//! 1. Validate the request and compute totals
//! 2. Persist order, items, queue entry and offer usage in one write
//! 3. Reserve the table and award loyalty points (best-effort)
//! 4. Auto-assign customer orders through [`AssignmentResolver`]
//! 5. Fan out notifications and publish realtime events
//!
//! Every mutation after creation is a compare-and-set on the order's status
//! and assigned staff, so concurrent accept/reject calls have one winner.

pub mod assignment;
pub mod config;
pub mod engine;
pub mod error;
pub mod services;

pub use assignment::{AssignmentOutcome, AssignmentResolver};
pub use config::WorkflowConfig;
pub use engine::{
    OrderDetails, PlacedOrder, SideEffect, SideEffectWarning, WorkflowEngine,
    WorkflowEngineBuilder,
};
pub use error::{Result, ServiceError, WorkflowError};
pub use services::{
    InMemoryLoyaltyService, InMemoryStaffDirectory, InMemoryTableReservationService,
    LoyaltyService, PointsAward, ReservationRequest, StaffDirectory, StaffMember,
    TableReservationService,
};
