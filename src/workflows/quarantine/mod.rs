//! Room assignment and member status propagation for quarantine facilities.
//!
//! [`QuarantineEngine`] is the entry point: it places members into rooms, reacts to room
//! changes, departures, relabels and test results, and keeps every room within capacity
//! without mixing confirmed-positive and confirmed-negative occupants.

pub mod domain;
pub mod invariants;
pub mod label;
pub mod locks;
pub mod placement;
pub mod policy;
pub mod propagation;
pub mod report;
pub mod repository;
pub mod service;
pub mod status;
pub mod store;
pub(crate) mod workspace;

#[cfg(test)]
mod tests;

pub use domain::{
    DepartureReason, Facility, FacilityId, Gender, InfectionStatus, Member, MemberChange,
    MemberId, Room, RoomId, TestRecord, TestRecordId, TestResult, TestType,
};
pub use invariants::InvariantViolation;
pub use label::Label;
pub use placement::{
    PlacementBasis, PlacementFailure, PlacementRequest, RankingStage, RoomFinder, RoomPlacement,
    SelectionStage,
};
pub use policy::{
    InvalidPolicy, Policy, PolicyMissing, PolicyResolver, VaccinationSplit, MAX_POLICY_DAYS,
};
pub use report::{OccupancyReport, RoomOccupancyEntry};
pub use repository::{
    FacilitySnapshot, MemberUpdate, RepositoryError, RoomSnapshot, WardChangeSet, WardRepository,
};
pub use service::{
    EngineError, PlacementOutcome, PropagationOutcome, QuarantineEngine, StatusOutcome,
};
pub use status::{StatusDecision, StatusResolver, StatusTransition};
pub use store::InMemoryWard;
