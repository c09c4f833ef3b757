use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::workflows::quarantine::domain::{
    Facility, FacilityId, Gender, InfectionStatus, Member, MemberId, Room, RoomId, TestRecord,
    TestRecordId, TestResult, TestType,
};
use crate::workflows::quarantine::label::Label;
use crate::workflows::quarantine::placement::PlacementRequest;
use crate::workflows::quarantine::policy::Policy;
use crate::workflows::quarantine::repository::{
    FacilitySnapshot, RepositoryError, RoomSnapshot, WardChangeSet, WardRepository,
};
use crate::workflows::quarantine::service::QuarantineEngine;
use crate::workflows::quarantine::store::InMemoryWard;

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 9, 1, 8, 0, 0).unwrap()
}

pub(super) fn days(count: i64) -> Duration {
    Duration::days(count)
}

pub(super) fn ward_id() -> FacilityId {
    FacilityId("ward-a".to_string())
}

pub(super) fn room_id(id: &str) -> RoomId {
    RoomId(id.to_string())
}

pub(super) fn member_id(id: &str) -> MemberId {
    MemberId(id.to_string())
}

pub(super) fn facility(policy: Option<Policy>) -> Facility {
    Facility {
        id: ward_id(),
        name: "Ward A".to_string(),
        policy,
    }
}

pub(super) fn room(id: &str, capacity: u32) -> Room {
    Room {
        id: room_id(id),
        facility: ward_id(),
        building: "A".to_string(),
        floor: "1".to_string(),
        capacity,
    }
}

pub(super) fn member(
    id: &str,
    gender: Gender,
    label: Label,
    status: InfectionStatus,
    doses: u32,
) -> Member {
    let mut member = Member::new(id, gender, label);
    member.infection_status = status;
    member.vaccine_doses = doses;
    member.facility = Some(ward_id());
    member
}

/// `member` seated in `room` since `now()` with a base release date.
pub(super) fn resident(mut member: Member, room: &str) -> Member {
    member.room = Some(room_id(room));
    member.quarantine_start = Some(now());
    member.quarantine_expected_end = Some(now() + days(7));
    member
}

pub(super) fn snapshot(room: Room, occupants: Vec<Member>) -> RoomSnapshot {
    RoomSnapshot { room, occupants }
}

pub(super) fn request(
    gender: Gender,
    label: Label,
    status: InfectionStatus,
    doses: u32,
) -> PlacementRequest {
    PlacementRequest {
        facility: ward_id(),
        subject: None,
        gender,
        label,
        infection_status: status,
        vaccine_doses: doses,
        preferred_room: None,
        excluded_rooms: Default::default(),
    }
}

pub(super) fn test_record(
    id: &str,
    member: &str,
    result: TestResult,
    test_type: TestType,
    at: DateTime<Utc>,
) -> TestRecord {
    TestRecord {
        id: TestRecordId(id.to_string()),
        member: member_id(member),
        result,
        test_type,
        created_at: at,
    }
}

pub(super) fn seeded_ward(
    policy: Option<Policy>,
    rooms: Vec<Room>,
    members: Vec<Member>,
) -> Arc<InMemoryWard> {
    let ward = InMemoryWard::new();
    ward.add_facility(facility(policy)).expect("facility seeds");
    for room in rooms {
        ward.add_room(room).expect("room seeds");
    }
    for member in members {
        ward.add_member(member).expect("member seeds");
    }
    Arc::new(ward)
}

pub(super) fn engine<R: WardRepository + 'static>(ward: Arc<R>) -> QuarantineEngine<R> {
    QuarantineEngine::new(ward, Some(Policy::builtin()))
}

pub(super) fn stored<R: WardRepository>(ward: &R, id: &str) -> Member {
    ward.member(&member_id(id))
        .expect("member lookup succeeds")
        .expect("member exists")
}

/// Store that reads from an in-memory ward but refuses every commit.
pub(super) struct UnavailableWard {
    pub inner: InMemoryWard,
}

impl WardRepository for UnavailableWard {
    fn facility(&self, id: &FacilityId) -> Result<Option<Facility>, RepositoryError> {
        self.inner.facility(id)
    }

    fn facility_snapshot(
        &self,
        id: &FacilityId,
    ) -> Result<Option<FacilitySnapshot>, RepositoryError> {
        self.inner.facility_snapshot(id)
    }

    fn room_snapshots(&self, rooms: &[RoomId]) -> Result<Vec<RoomSnapshot>, RepositoryError> {
        self.inner.room_snapshots(rooms)
    }

    fn member(&self, id: &MemberId) -> Result<Option<Member>, RepositoryError> {
        self.inner.member(id)
    }

    fn test_history(&self, member: &MemberId) -> Result<Vec<TestRecord>, RepositoryError> {
        self.inner.test_history(member)
    }

    fn commit(&self, _changes: WardChangeSet) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("maintenance window".to_string()))
    }
}
