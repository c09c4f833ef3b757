use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Facility, FacilityId, Member, MemberId, Room, RoomId, TestRecord};

/// A room together with the members occupying it, read at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: Room,
    pub occupants: Vec<Member>,
}

impl RoomSnapshot {
    pub fn positive_count(&self) -> usize {
        self.occupants
            .iter()
            .filter(|member| member.is_positive())
            .count()
    }

    pub fn free_beds(&self) -> u32 {
        self.room
            .capacity
            .saturating_sub(u32::try_from(self.occupants.len()).unwrap_or(u32::MAX))
    }

    /// Whether the room stopped taking non-positive admissions, see [`closed_before`].
    pub fn is_closed(&self, cutoff: Option<DateTime<Utc>>) -> bool {
        closed_before(&self.occupants, cutoff)
    }
}

/// A room is closed once it is occupied and every occupant started quarantine before
/// `cutoff`. Without a cutoff nothing is closed.
pub(crate) fn closed_before<'m>(
    occupants: impl IntoIterator<Item = &'m Member>,
    cutoff: Option<DateTime<Utc>>,
) -> bool {
    let Some(cutoff) = cutoff else {
        return false;
    };
    let mut occupied = false;
    for member in occupants {
        occupied = true;
        if !member.quarantine_start.map_or(false, |start| start < cutoff) {
            return false;
        }
    }
    occupied
}

/// Every room of a facility, read at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySnapshot {
    pub facility: Facility,
    pub rooms: Vec<RoomSnapshot>,
}

/// Member record as read before an operation and as it should be stored afterwards.
/// Commits are rejected when the stored record no longer equals `before`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpdate {
    pub before: Member,
    pub after: Member,
}

/// Everything one engine operation writes, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WardChangeSet {
    pub members: Vec<MemberUpdate>,
    pub tests: Vec<TestRecord>,
}

impl WardChangeSet {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty() && self.tests.is_empty()
    }
}

/// Storage abstraction so the engine can be exercised without a database.
pub trait WardRepository: Send + Sync {
    fn facility(&self, id: &FacilityId) -> Result<Option<Facility>, RepositoryError>;
    fn facility_snapshot(&self, id: &FacilityId)
        -> Result<Option<FacilitySnapshot>, RepositoryError>;
    /// Snapshots for the requested rooms, read under one consistent view. Unknown ids are skipped.
    fn room_snapshots(&self, rooms: &[RoomId]) -> Result<Vec<RoomSnapshot>, RepositoryError>;
    fn member(&self, id: &MemberId) -> Result<Option<Member>, RepositoryError>;
    /// Test records of a member in creation order.
    fn test_history(&self, member: &MemberId) -> Result<Vec<TestRecord>, RepositoryError>;
    fn commit(&self, changes: WardChangeSet) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record changed concurrently: {0}")]
    StaleRecord(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("record rejected: {0}")]
    Invalid(String),
}
