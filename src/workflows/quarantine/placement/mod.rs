mod stages;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{FacilityId, Gender, InfectionStatus, Member, MemberId, RoomId};
use super::label::Label;
use super::policy::Policy;
use super::repository::RoomSnapshot;
use stages::{narrow_to_max, narrow_to_min, Candidate};

/// Everything the ranker needs to know about the person being placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub facility: FacilityId,
    /// Member being placed, so their current seat is not counted against them.
    #[serde(default)]
    pub subject: Option<MemberId>,
    pub gender: Gender,
    pub label: Label,
    pub infection_status: InfectionStatus,
    pub vaccine_doses: u32,
    #[serde(default)]
    pub preferred_room: Option<RoomId>,
    #[serde(default)]
    pub excluded_rooms: BTreeSet<RoomId>,
}

impl PlacementRequest {
    /// Request built from a member record, preferring the room they already occupy.
    pub fn for_member(member: &Member, facility: FacilityId) -> Self {
        Self {
            facility,
            subject: Some(member.id.clone()),
            gender: member.gender,
            label: member.label,
            infection_status: member.infection_status,
            vaccine_doses: member.vaccine_doses,
            preferred_room: member.room.clone(),
            excluded_rooms: BTreeSet::new(),
        }
    }

    pub fn excluding(mut self, room: RoomId) -> Self {
        self.excluded_rooms.insert(room);
        self
    }
}

/// Recoverable reasons a search produced no room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementFailure {
    #[error("no room in the facility has a free bed")]
    NoVacancy,
    #[error("every room with a free bed holds a member of conflicting infection status")]
    NoCompatibleStatus,
    #[error("every compatible room is closed to new admissions")]
    AllRoomsClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementBasis {
    KeptCurrentRoom,
    Ranked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStage {
    Stability,
    Vacancy,
    StatusCompatibility,
    ClosedRooms,
    SameLabel,
    DoseAffinity,
    SameGender,
    Packing,
    RoomOrder,
}

/// One narrowing step, recorded so a placement can be audited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStage {
    pub stage: RankingStage,
    pub remaining: usize,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPlacement {
    pub room: RoomId,
    pub basis: PlacementBasis,
    pub trail: Vec<SelectionStage>,
}

impl RoomPlacement {
    pub fn summary(&self) -> String {
        match self.basis {
            PlacementBasis::KeptCurrentRoom => format!("kept current room {}", self.room),
            PlacementBasis::Ranked => {
                let stages: Vec<String> = self
                    .trail
                    .iter()
                    .map(|stage| format!("{:?}={}", stage.stage, stage.remaining))
                    .collect();
                format!("ranked into {} ({})", self.room, stages.join(", "))
            }
        }
    }
}

/// Stateless filter-and-rank pass over one facility's rooms.
pub struct RoomFinder<'p> {
    policy: &'p Policy,
    now: DateTime<Utc>,
}

impl<'p> RoomFinder<'p> {
    pub fn new(policy: &'p Policy, now: DateTime<Utc>) -> Self {
        Self { policy, now }
    }

    pub fn find(
        &self,
        request: &PlacementRequest,
        rooms: &[RoomSnapshot],
    ) -> Result<RoomPlacement, PlacementFailure> {
        let mut candidates: Vec<Candidate<'_>> = rooms
            .iter()
            .filter(|snapshot| snapshot.room.facility == request.facility)
            .filter(|snapshot| !request.excluded_rooms.contains(&snapshot.room.id))
            .map(|snapshot| Candidate::new(snapshot, request))
            .collect();
        candidates.sort_by(|a, b| a.room_id().cmp(b.room_id()));

        if let Some(preferred) = &request.preferred_room {
            let kept = candidates.iter().find(|candidate| {
                candidate.room_id() == preferred
                    && candidate.has_vacancy()
                    && candidate.status_compatible(request)
            });
            if let Some(candidate) = kept {
                return Ok(RoomPlacement {
                    room: candidate.room_id().clone(),
                    basis: PlacementBasis::KeptCurrentRoom,
                    trail: vec![SelectionStage {
                        stage: RankingStage::Stability,
                        remaining: 1,
                        notes: format!("kept current room {preferred}"),
                    }],
                });
            }
        }

        let mut trail = Vec::new();
        let considered = candidates.len();

        candidates.retain(Candidate::has_vacancy);
        if candidates.is_empty() {
            return Err(PlacementFailure::NoVacancy);
        }
        trail.push(SelectionStage {
            stage: RankingStage::Vacancy,
            remaining: candidates.len(),
            notes: format!("{} of {} rooms have a free bed", candidates.len(), considered),
        });

        candidates.retain(|candidate| candidate.status_compatible(request));
        if candidates.is_empty() {
            return Err(PlacementFailure::NoCompatibleStatus);
        }
        trail.push(SelectionStage {
            stage: RankingStage::StatusCompatibility,
            remaining: candidates.len(),
            notes: format!(
                "compatible with {} subject",
                request.infection_status.label()
            ),
        });

        if request.infection_status != InfectionStatus::Positive {
            let cutoff = self.policy.close_room_cutoff(self.now);
            candidates.retain(|candidate| !candidate.is_closed(cutoff));
            if candidates.is_empty() {
                return Err(PlacementFailure::AllRoomsClosed);
            }
            trail.push(SelectionStage {
                stage: RankingStage::ClosedRooms,
                remaining: candidates.len(),
                notes: format!(
                    "rooms closed after {} day(s) excluded",
                    self.policy.close_room_after_days
                ),
            });
        }

        let candidates = narrow_to_max(candidates, |candidate| {
            candidate.same_label_count(request)
        });
        trail.push(SelectionStage {
            stage: RankingStage::SameLabel,
            remaining: candidates.len(),
            notes: format!(
                "{} occupant(s) labelled {}",
                candidates
                    .first()
                    .map(|candidate| candidate.same_label_count(request))
                    .unwrap_or_default(),
                request.label.code()
            ),
        });

        let candidates = narrow_to_min(candidates, |candidate| candidate.dose_distance(request));
        trail.push(SelectionStage {
            stage: RankingStage::DoseAffinity,
            remaining: candidates.len(),
            notes: format!(
                "average dose distance {:.2}",
                candidates
                    .first()
                    .map(|candidate| candidate.dose_distance(request).as_f64())
                    .unwrap_or_default()
            ),
        });

        let candidates = narrow_to_max(candidates, |candidate| {
            candidate.same_gender_count(request)
        });
        trail.push(SelectionStage {
            stage: RankingStage::SameGender,
            remaining: candidates.len(),
            notes: format!(
                "{} occupant(s) of the same gender",
                candidates
                    .first()
                    .map(|candidate| candidate.same_gender_count(request))
                    .unwrap_or_default()
            ),
        });

        let candidates = narrow_to_min(candidates, Candidate::remaining_capacity);
        trail.push(SelectionStage {
            stage: RankingStage::Packing,
            remaining: candidates.len(),
            notes: format!(
                "{} bed(s) left after placement",
                candidates
                    .first()
                    .map(|candidate| candidate.remaining_capacity().saturating_sub(1))
                    .unwrap_or_default()
            ),
        });

        // Candidates are still in room id order, so the first one is the lowest id.
        let chosen = candidates
            .first()
            .map(|candidate| candidate.room_id().clone())
            .ok_or(PlacementFailure::NoVacancy)?;
        trail.push(SelectionStage {
            stage: RankingStage::RoomOrder,
            remaining: 1,
            notes: format!("lowest room id {chosen}"),
        });

        Ok(RoomPlacement {
            room: chosen,
            basis: PlacementBasis::Ranked,
            trail,
        })
    }
}
