use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{InfectionStatus, Member, MemberId, Room, RoomId};
use super::label::Label;

/// A write that would leave the ward in an inconsistent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    #[error("room {room} would hold {occupants} members but has capacity {capacity}")]
    OverCapacity {
        room: RoomId,
        capacity: u32,
        occupants: usize,
    },
    #[error("room {room} would mix positive and negative members")]
    MixedStatus { room: RoomId },
    #[error("expected release of {member} would move back from {from} to {to}")]
    ExpectedEndMovedBack {
        member: MemberId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    #[error("member {member} would be labelled F0 without a positive status")]
    F0WithoutPositive { member: MemberId },
    #[error("member {member} is F0 and cannot be relabelled {to:?}")]
    F0Relabelled { member: MemberId, to: Label },
}

/// Capacity and status mixing for one room given its prospective occupants.
pub fn check_room(room: &Room, occupants: &[&Member]) -> Result<(), InvariantViolation> {
    if occupants.len() as u64 > u64::from(room.capacity) {
        return Err(InvariantViolation::OverCapacity {
            room: room.id.clone(),
            capacity: room.capacity,
            occupants: occupants.len(),
        });
    }

    let has = |status: InfectionStatus| {
        occupants
            .iter()
            .any(|member| member.infection_status == status)
    };
    if has(InfectionStatus::Positive) && has(InfectionStatus::Negative) {
        return Err(InvariantViolation::MixedStatus {
            room: room.id.clone(),
        });
    }

    Ok(())
}

/// Release-date and F0 rules for one member transition. Clearing the expected end is allowed.
pub fn check_member(before: &Member, after: &Member) -> Result<(), InvariantViolation> {
    if let (Some(from), Some(to)) = (before.quarantine_expected_end, after.quarantine_expected_end)
    {
        if to < from {
            return Err(InvariantViolation::ExpectedEndMovedBack {
                member: after.id.clone(),
                from,
                to,
            });
        }
    }

    if before.label == Label::F0 && after.label != Label::F0 {
        return Err(InvariantViolation::F0Relabelled {
            member: after.id.clone(),
            to: after.label,
        });
    }

    if before.label != Label::F0
        && after.label == Label::F0
        && after.infection_status != InfectionStatus::Positive
    {
        return Err(InvariantViolation::F0WithoutPositive {
            member: after.id.clone(),
        });
    }

    Ok(())
}
