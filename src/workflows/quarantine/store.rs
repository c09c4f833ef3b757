use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::domain::{Facility, FacilityId, Member, MemberId, Room, RoomId, TestRecord};
use super::invariants::check_room;
use super::repository::{
    FacilitySnapshot, RepositoryError, RoomSnapshot, WardChangeSet, WardRepository,
};

#[derive(Debug, Default)]
struct WardState {
    facilities: BTreeMap<FacilityId, Facility>,
    rooms: BTreeMap<RoomId, Room>,
    members: BTreeMap<MemberId, Member>,
    tests: BTreeMap<MemberId, Vec<TestRecord>>,
}

impl WardState {
    fn occupants(&self, room: &RoomId) -> Vec<Member> {
        self.members
            .values()
            .filter(|member| member.room.as_ref() == Some(room))
            .cloned()
            .collect()
    }

    fn snapshot(&self, room: &Room) -> RoomSnapshot {
        RoomSnapshot {
            room: room.clone(),
            occupants: self.occupants(&room.id),
        }
    }
}

/// Process-local ward store used by the CLI simulation and tests.
#[derive(Debug, Default)]
pub struct InMemoryWard {
    state: Mutex<WardState>,
}

impl InMemoryWard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, WardState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("ward store lock poisoned".to_string()))
    }

    pub fn add_facility(&self, facility: Facility) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.facilities.contains_key(&facility.id) {
            return Err(RepositoryError::Conflict(format!("facility {}", facility.id)));
        }
        if let Some(policy) = &facility.policy {
            policy
                .validate()
                .map_err(|invalid| RepositoryError::Invalid(invalid.to_string()))?;
        }
        state.facilities.insert(facility.id.clone(), facility);
        Ok(())
    }

    pub fn add_room(&self, room: Room) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if !state.facilities.contains_key(&room.facility) {
            return Err(RepositoryError::NotFound(format!("facility {}", room.facility)));
        }
        if state.rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict(format!("room {}", room.id)));
        }
        if room.capacity == 0 {
            return Err(RepositoryError::Invalid(format!("room {} has no beds", room.id)));
        }
        state.rooms.insert(room.id.clone(), room);
        Ok(())
    }

    /// Register a member at intake. A seeded room seat must keep the room within capacity
    /// and free of positive/negative mixing.
    pub fn add_member(&self, member: Member) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.members.contains_key(&member.id) {
            return Err(RepositoryError::Conflict(format!("member {}", member.id)));
        }
        if let Some(room_id) = &member.room {
            let room = state
                .rooms
                .get(room_id)
                .ok_or_else(|| RepositoryError::NotFound(format!("room {room_id}")))?;
            let occupants = state.occupants(room_id);
            let seated: Vec<&Member> = occupants.iter().chain([&member]).collect();
            check_room(room, &seated)
                .map_err(|violation| RepositoryError::Invalid(violation.to_string()))?;
        }
        state.members.insert(member.id.clone(), member);
        Ok(())
    }

    pub fn rooms(&self) -> Result<Vec<Room>, RepositoryError> {
        Ok(self.lock()?.rooms.values().cloned().collect())
    }

    pub fn members(&self) -> Result<Vec<Member>, RepositoryError> {
        Ok(self.lock()?.members.values().cloned().collect())
    }

    pub fn facilities(&self) -> Result<Vec<Facility>, RepositoryError> {
        Ok(self.lock()?.facilities.values().cloned().collect())
    }
}

impl WardRepository for InMemoryWard {
    fn facility(&self, id: &FacilityId) -> Result<Option<Facility>, RepositoryError> {
        Ok(self.lock()?.facilities.get(id).cloned())
    }

    fn facility_snapshot(
        &self,
        id: &FacilityId,
    ) -> Result<Option<FacilitySnapshot>, RepositoryError> {
        let state = self.lock()?;
        let Some(facility) = state.facilities.get(id) else {
            return Ok(None);
        };

        let rooms = state
            .rooms
            .values()
            .filter(|room| &room.facility == id)
            .map(|room| state.snapshot(room))
            .collect();

        Ok(Some(FacilitySnapshot {
            facility: facility.clone(),
            rooms,
        }))
    }

    fn room_snapshots(&self, rooms: &[RoomId]) -> Result<Vec<RoomSnapshot>, RepositoryError> {
        let state = self.lock()?;
        let wanted: BTreeSet<&RoomId> = rooms.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| state.rooms.get(id))
            .map(|room| state.snapshot(room))
            .collect())
    }

    fn member(&self, id: &MemberId) -> Result<Option<Member>, RepositoryError> {
        Ok(self.lock()?.members.get(id).cloned())
    }

    fn test_history(&self, member: &MemberId) -> Result<Vec<TestRecord>, RepositoryError> {
        let state = self.lock()?;
        let mut history = state.tests.get(member).cloned().unwrap_or_default();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(history)
    }

    fn commit(&self, changes: WardChangeSet) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;

        for update in &changes.members {
            match state.members.get(&update.before.id) {
                Some(stored) if stored == &update.before => {}
                Some(_) => {
                    return Err(RepositoryError::StaleRecord(format!(
                        "member {}",
                        update.before.id
                    )))
                }
                None => {
                    return Err(RepositoryError::NotFound(format!(
                        "member {}",
                        update.before.id
                    )))
                }
            }
            if let Some(room) = &update.after.room {
                if !state.rooms.contains_key(room) {
                    return Err(RepositoryError::NotFound(format!("room {room}")));
                }
            }
        }

        for record in &changes.tests {
            let duplicate = state
                .tests
                .get(&record.member)
                .map(|history| history.iter().any(|existing| existing.id == record.id))
                .unwrap_or(false);
            if duplicate {
                return Err(RepositoryError::Conflict(format!("test record {}", record.id)));
            }
        }

        for update in changes.members {
            state.members.insert(update.after.id.clone(), update.after);
        }
        for record in changes.tests {
            state
                .tests
                .entry(record.member.clone())
                .or_default()
                .push(record);
        }

        Ok(())
    }
}
