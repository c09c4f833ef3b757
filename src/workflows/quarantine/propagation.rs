//! Cascading label and release-date updates across the occupants of a room.
//!
//! Every rule operates on the occupants of a single room, read from one snapshot, and reports
//! the mutations it made. F0 labels are never touched, and release dates only move forward.

use chrono::{DateTime, Duration, Utc};

use super::domain::{InfectionStatus, Member, MemberChange, MemberId};
use super::label::Label;
use super::policy::Policy;

/// Applies the propagation rules of one facility's policy at a fixed instant.
pub struct OccupantPropagation<'p> {
    policy: &'p Policy,
    now: DateTime<Utc>,
}

impl<'p> OccupantPropagation<'p> {
    pub fn new(policy: &'p Policy, now: DateTime<Utc>) -> Self {
        Self { policy, now }
    }

    /// Rule 1: `leaving` is the member as it was before departure, `remaining` the
    /// occupants left behind.
    pub fn after_departure(&self, leaving: &Member, remaining: &mut [Member]) -> Vec<MemberChange> {
        if !leaving.is_positive() || remaining.iter().any(Member::is_positive) {
            return Vec::new();
        }
        self.extend_close_contacts_after_positive(remaining, None)
    }

    /// Rule 2: `occupants` already contains the entrant.
    pub fn after_arrival(&self, entrant: &MemberId, occupants: &mut [Member]) -> Vec<MemberChange> {
        let entrant_is_f0 = occupants
            .iter()
            .find(|member| &member.id == entrant)
            .map(|member| member.label == Label::F0)
            .unwrap_or(true);
        if entrant_is_f0 {
            return Vec::new();
        }

        let mut changes = Vec::new();
        if occupants.len() > 1 {
            for member in occupants.iter_mut().filter(|m| m.label != Label::F0) {
                let until =
                    release_at(self.now, self.policy.close_contact_not_positive(member.vaccine_doses));
                changes.extend(extend_expected_end(member, until));
            }
        }
        changes.extend(normalize_labels(occupants));
        changes
    }

    /// Rule 3: `member` has just turned positive while resident with `occupants`.
    pub fn after_positive(&self, member: &MemberId, occupants: &mut [Member]) -> Vec<MemberChange> {
        let mut changes = Vec::new();
        let contact_label = Label::F0.downgrade();

        for occupant in occupants.iter_mut() {
            if &occupant.id == member {
                if occupant.label != Label::F0 {
                    changes.push(relabel(occupant, Label::F0));
                }
                if occupant.quarantine_expected_end.is_none() {
                    let until =
                        release_at(self.now, self.policy.positive_case(occupant.vaccine_doses));
                    changes.extend(extend_expected_end(occupant, until));
                }
                continue;
            }

            if occupant.infection_status == InfectionStatus::Negative {
                changes.push(set_status(occupant, InfectionStatus::Unknown));
            }
            if occupant.label == Label::F0 {
                continue;
            }
            if contact_label.is_more_severe_than(occupant.label) {
                changes.push(relabel(occupant, contact_label));
            }
            if let Some(from) = occupant.quarantine_expected_end.take() {
                changes.push(MemberChange::ExpectedEndCleared {
                    member: occupant.id.clone(),
                    from,
                });
            }
        }

        changes
    }

    /// Rule 4: `member` has just turned negative after being positive.
    pub fn after_recovery(&self, member: &MemberId, occupants: &mut [Member]) -> Vec<MemberChange> {
        if let Some(recovered) = occupants.iter_mut().find(|m| &m.id == member) {
            recovered.positive_tested_before = true;
        }

        let others_positive = occupants
            .iter()
            .any(|m| &m.id != member && m.is_positive());
        if others_positive {
            return Vec::new();
        }
        self.extend_close_contacts_after_positive(occupants, Some(member))
    }

    fn extend_close_contacts_after_positive(
        &self,
        occupants: &mut [Member],
        skip: Option<&MemberId>,
    ) -> Vec<MemberChange> {
        let mut changes = Vec::new();
        for occupant in occupants
            .iter_mut()
            .filter(|m| m.label != Label::F0 && Some(&m.id) != skip)
        {
            let until = release_at(
                self.now,
                self.policy.close_contact_after_positive(occupant.vaccine_doses),
            );
            changes.extend(extend_expected_end(occupant, until));
        }
        changes
    }
}

/// Lift every non-F0 occupant to at least one step below the room's most severe label.
pub fn normalize_labels(occupants: &mut [Member]) -> Vec<MemberChange> {
    let Some(most_severe) = Label::most_severe(occupants.iter().map(|m| m.label)) else {
        return Vec::new();
    };
    if !most_severe.is_f_range() {
        return Vec::new();
    }

    let target = most_severe.downgrade();
    occupants
        .iter_mut()
        .filter(|m| m.label != Label::F0 && target.is_more_severe_than(m.label))
        .map(|m| relabel(m, target))
        .collect()
}

/// `now + span`, pinned to the last representable instant instead of overflowing.
pub(crate) fn release_at(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_add_signed(span)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Move the expected end to `until` when that is later (or nothing is set yet).
pub(crate) fn extend_expected_end(
    member: &mut Member,
    until: DateTime<Utc>,
) -> Option<MemberChange> {
    let from = member.quarantine_expected_end;
    if from.map_or(false, |current| until <= current) {
        return None;
    }
    member.quarantine_expected_end = Some(until);
    Some(MemberChange::ExpectedEndSet {
        member: member.id.clone(),
        from,
        to: until,
    })
}

pub(crate) fn relabel(member: &mut Member, to: Label) -> MemberChange {
    let from = member.label;
    member.label = to;
    MemberChange::LabelChanged {
        member: member.id.clone(),
        from,
        to,
    }
}

pub(crate) fn set_status(member: &mut Member, to: InfectionStatus) -> MemberChange {
    let from = member.infection_status;
    member.infection_status = to;
    MemberChange::StatusChanged {
        member: member.id.clone(),
        from,
        to,
    }
}
