use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{FacilityId, RoomId};
use super::label::Label;
use super::policy::Policy;
use super::repository::{FacilitySnapshot, RoomSnapshot};

/// Occupancy of one room as operators see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomOccupancyEntry {
    pub room: RoomId,
    pub building: String,
    pub floor: String,
    pub capacity: u32,
    pub occupied: usize,
    pub free_beds: u32,
    pub positive: usize,
    /// Most severe label among the occupants, if any.
    pub most_severe_label: Option<Label>,
    /// Whether the room stopped accepting non-positive admissions.
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancyReport {
    pub facility: FacilityId,
    pub policy: String,
    pub generated_at: DateTime<Utc>,
    pub rooms: Vec<RoomOccupancyEntry>,
}

impl OccupancyReport {
    pub fn build(snapshot: &FacilitySnapshot, policy: &Policy, now: DateTime<Utc>) -> Self {
        let mut rooms: Vec<RoomOccupancyEntry> = snapshot
            .rooms
            .iter()
            .map(|room| entry(room, policy, now))
            .collect();
        rooms.sort_by(|a, b| a.room.cmp(&b.room));

        Self {
            facility: snapshot.facility.id.clone(),
            policy: policy.name.clone(),
            generated_at: now,
            rooms,
        }
    }

    pub fn total_capacity(&self) -> u64 {
        self.rooms.iter().map(|room| u64::from(room.capacity)).sum()
    }

    pub fn total_occupied(&self) -> usize {
        self.rooms.iter().map(|room| room.occupied).sum()
    }

    pub fn open_beds(&self) -> u64 {
        self.rooms
            .iter()
            .filter(|room| !room.closed)
            .map(|room| u64::from(room.free_beds))
            .sum()
    }
}

fn entry(snapshot: &RoomSnapshot, policy: &Policy, now: DateTime<Utc>) -> RoomOccupancyEntry {
    RoomOccupancyEntry {
        room: snapshot.room.id.clone(),
        building: snapshot.room.building.clone(),
        floor: snapshot.room.floor.clone(),
        capacity: snapshot.room.capacity,
        occupied: snapshot.occupants.len(),
        free_beds: snapshot.free_beds(),
        positive: snapshot.positive_count(),
        most_severe_label: Label::most_severe(snapshot.occupants.iter().map(|m| m.label)),
        closed: snapshot.is_closed(policy.close_room_cutoff(now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::quarantine::domain::{Facility, Gender, InfectionStatus, Member, Room};
    use chrono::{Duration, TimeZone};

    #[test]
    fn report_flags_closed_rooms_and_counts_beds() {
        let now = Utc.with_ymd_and_hms(2021, 8, 20, 8, 0, 0).unwrap();
        let room = |id: &str, capacity| Room {
            id: RoomId(id.to_string()),
            facility: FacilityId("ward".to_string()),
            building: "A".to_string(),
            floor: "1".to_string(),
            capacity,
        };
        let mut settled = Member::new("m1", Gender::Female, Label::F0);
        settled.infection_status = InfectionStatus::Positive;
        settled.quarantine_start = Some(now - Duration::days(3));
        let mut fresh = Member::new("m2", Gender::Male, Label::F2);
        fresh.quarantine_start = Some(now - Duration::hours(2));

        let snapshot = FacilitySnapshot {
            facility: Facility {
                id: FacilityId("ward".to_string()),
                name: "Ward".to_string(),
                policy: None,
            },
            rooms: vec![
                RoomSnapshot {
                    room: room("r2", 4),
                    occupants: vec![fresh],
                },
                RoomSnapshot {
                    room: room("r1", 2),
                    occupants: vec![settled],
                },
                RoomSnapshot {
                    room: room("r3", 2),
                    occupants: Vec::new(),
                },
            ],
        };

        let report = OccupancyReport::build(&snapshot, &Policy::builtin(), now);

        let ids: Vec<&str> = report.rooms.iter().map(|r| r.room.0.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
        assert!(report.rooms[0].closed);
        assert_eq!(report.rooms[0].positive, 1);
        assert_eq!(report.rooms[0].most_severe_label, Some(Label::F0));
        assert!(!report.rooms[1].closed);
        assert!(!report.rooms[2].closed, "empty rooms stay open");
        assert_eq!(report.total_capacity(), 8);
        assert_eq!(report.total_occupied(), 2);
        assert_eq!(report.open_beds(), 5);
    }
}
