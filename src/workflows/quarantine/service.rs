use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    DepartureReason, FacilityId, Member, MemberChange, MemberId, RoomId, TestRecord,
};
use super::invariants::InvariantViolation;
use super::label::Label;
use super::locks::{RoomLockGuard, RoomLocks};
use super::placement::{PlacementFailure, PlacementRequest, RoomFinder, RoomPlacement};
use super::policy::{InvalidPolicy, Policy, PolicyMissing, PolicyResolver};
use super::propagation::{
    extend_expected_end, normalize_labels, relabel, release_at, set_status, OccupantPropagation,
};
use super::report::OccupancyReport;
use super::repository::{RepositoryError, WardChangeSet, WardRepository};
use super::status::{StatusDecision, StatusResolver, StatusTransition};
use super::workspace::Workspace;

/// Engine tying placement, propagation and status resolution to a ward repository.
///
/// Every mutating operation locks the rooms it touches in ascending id order, reads
/// them once, computes the full set of member updates, checks the ward invariants and
/// commits everything in a single repository call. A failed operation persists nothing.
pub struct QuarantineEngine<R> {
    repository: Arc<R>,
    locks: RoomLocks,
    policies: PolicyResolver,
}

/// Member updates produced by a room change, departure or relabel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationOutcome {
    pub member: MemberId,
    pub from_room: Option<RoomId>,
    pub to_room: Option<RoomId>,
    pub changes: Vec<MemberChange>,
}

impl PropagationOutcome {
    fn unchanged(member: &Member) -> Self {
        Self {
            member: member.id.clone(),
            from_room: member.room.clone(),
            to_room: member.room.clone(),
            changes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementOutcome {
    pub placement: RoomPlacement,
    pub propagation: PropagationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusOutcome {
    pub member: MemberId,
    pub record: TestRecord,
    pub decision: StatusDecision,
    pub changes: Vec<MemberChange>,
}

impl<R> QuarantineEngine<R>
where
    R: WardRepository + 'static,
{
    pub fn new(repository: Arc<R>, default_policy: Option<Policy>) -> Self {
        Self {
            repository,
            locks: RoomLocks::new(),
            policies: PolicyResolver::new(default_policy),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Pick a room for `request` without writing anything.
    pub fn find_room(
        &self,
        request: &PlacementRequest,
        now: DateTime<Utc>,
    ) -> Result<RoomPlacement, EngineError> {
        let snapshot = self
            .repository
            .facility_snapshot(&request.facility)?
            .ok_or_else(|| EngineError::UnknownFacility(request.facility.clone()))?;
        let policy = self.policies.resolve(&snapshot.facility)?;
        usable(policy, now)?;

        match RoomFinder::new(policy, now).find(request, &snapshot.rooms) {
            Ok(placement) => {
                debug!(
                    facility = %request.facility,
                    room = %placement.room,
                    summary = %placement.summary(),
                    "room selected"
                );
                Ok(placement)
            }
            Err(failure) => {
                warn!(facility = %request.facility, ?failure, "room search failed");
                Err(failure.into())
            }
        }
    }

    /// Find a room for an existing member and move them into it.
    ///
    /// `facility` defaults to the ward the member is registered with.
    pub fn place_member(
        &self,
        member_id: &MemberId,
        facility: Option<&FacilityId>,
        excluded_rooms: &[RoomId],
        now: DateTime<Utc>,
    ) -> Result<PlacementOutcome, EngineError> {
        let member = self.load_member(member_id)?;
        let facility = facility
            .or(member.facility.as_ref())
            .cloned()
            .ok_or_else(|| EngineError::NoFacility(member_id.clone()))?;

        let mut request = PlacementRequest::for_member(&member, facility);
        for room in excluded_rooms {
            request = request.excluding(room.clone());
        }
        let placement = self.find_room(&request, now)?;

        let from = member.room.clone();
        let propagation = self.on_room_change(member_id, from.as_ref(), Some(&placement.room), now)?;
        Ok(PlacementOutcome {
            placement,
            propagation,
        })
    }

    /// Move a member between rooms (or in/out of the ward) and propagate the effects.
    ///
    /// `old_room` must match the member's stored room, otherwise the call is rejected with
    /// [`EngineError::StaleRoomChange`].
    pub fn on_room_change(
        &self,
        member_id: &MemberId,
        old_room: Option<&RoomId>,
        new_room: Option<&RoomId>,
        now: DateTime<Utc>,
    ) -> Result<PropagationOutcome, EngineError> {
        let _guard = self.locks.acquire(old_room.into_iter().chain(new_room));
        let member = self.load_member(member_id)?;
        if member.room.as_ref() != old_room {
            warn!(
                member = %member_id,
                expected = ?old_room,
                actual = ?member.room,
                "room change rejected, member moved concurrently"
            );
            return Err(EngineError::StaleRoomChange {
                member: member_id.clone(),
                expected: old_room.cloned(),
                actual: member.room.clone(),
            });
        }

        self.relocate(member, new_room, None, now)
    }

    /// Take a member out of their room.
    pub fn depart(
        &self,
        member_id: &MemberId,
        reason: DepartureReason,
        now: DateTime<Utc>,
    ) -> Result<PropagationOutcome, EngineError> {
        let (_guard, member) = self.lock_member_room(member_id)?;
        info!(member = %member_id, reason = reason.label(), "member departing");
        self.relocate(member, None, Some(reason), now)
    }

    /// Record a test result, update the member's status and propagate it to their roommates.
    pub fn on_test_result(
        &self,
        record: TestRecord,
        now: DateTime<Utc>,
    ) -> Result<StatusOutcome, EngineError> {
        let member_id = record.member.clone();
        let (_guard, member) = self.lock_member_room(&member_id)?;

        let snapshots = match &member.room {
            Some(room) => self.repository.room_snapshots(std::slice::from_ref(room))?,
            None => Vec::new(),
        };
        let mut workspace = Workspace::new(snapshots);
        workspace.track(member.clone());

        let facility = match &member.room {
            Some(room) => Some(
                workspace
                    .room(room)
                    .map(|room| room.facility.clone())
                    .ok_or_else(|| EngineError::UnknownRoom(room.clone()))?,
            ),
            None => member.facility.clone(),
        };
        let policy = self.policy_for(facility.as_ref(), now)?;

        let history = self.repository.test_history(&member_id)?;
        let decision = StatusResolver::new(&policy).resolve(&member, &history, &record);
        debug!(
            member = %member_id,
            record = %record.id,
            previous = decision.previous.label(),
            next = decision.next.label(),
            negatives = decision.qualifying_negatives,
            required = decision.required_negatives,
            "test result resolved"
        );

        let mut changes = Vec::new();
        if decision.next != decision.previous {
            if let Some(subject) = workspace.member_mut(&member_id) {
                changes.push(set_status(subject, decision.next));
            }
        }

        let propagation = OccupantPropagation::new(&policy, now);
        let apply = |occupants: &mut [Member]| match decision.transition {
            StatusTransition::BecamePositive => propagation.after_positive(&member_id, occupants),
            StatusTransition::Recovered => propagation.after_recovery(&member_id, occupants),
            StatusTransition::Unchanged | StatusTransition::ConfirmedNegative => Vec::new(),
        };
        let propagated = match &member.room {
            Some(room) => workspace.with_occupants(room, apply),
            None => workspace.with_member(&member_id, apply),
        };
        changes.extend(propagated);

        self.commit("test_result", workspace, vec![record.clone()], &changes)?;
        Ok(StatusOutcome {
            member: member_id,
            record,
            decision,
            changes,
        })
    }

    /// Assign a new epidemiological label and bring the member's roommates in line.
    pub fn on_label_change(
        &self,
        member_id: &MemberId,
        label: Label,
    ) -> Result<PropagationOutcome, EngineError> {
        let (_guard, member) = self.lock_member_room(member_id)?;
        if member.label == label {
            return Ok(PropagationOutcome::unchanged(&member));
        }

        let snapshots = match &member.room {
            Some(room) => self.repository.room_snapshots(std::slice::from_ref(room))?,
            None => Vec::new(),
        };
        let mut workspace = Workspace::new(snapshots);
        workspace.track(member.clone());

        let mut changes = Vec::new();
        if let Some(subject) = workspace.member_mut(member_id) {
            changes.push(relabel(subject, label));
        }
        if let Some(room) = &member.room {
            changes.extend(workspace.with_occupants(room, normalize_labels));
        }

        self.commit("label_change", workspace, Vec::new(), &changes)?;
        Ok(PropagationOutcome {
            member: member_id.clone(),
            from_room: member.room.clone(),
            to_room: member.room,
            changes,
        })
    }

    /// Per-room occupancy of one facility as of `now`.
    pub fn occupancy_report(
        &self,
        facility: &FacilityId,
        now: DateTime<Utc>,
    ) -> Result<OccupancyReport, EngineError> {
        let snapshot = self
            .repository
            .facility_snapshot(facility)?
            .ok_or_else(|| EngineError::UnknownFacility(facility.clone()))?;
        let policy = self.policies.resolve(&snapshot.facility)?;
        Ok(OccupancyReport::build(&snapshot, policy, now))
    }

    /// Apply a room change for a member whose current and target rooms are already locked.
    fn relocate(
        &self,
        member: Member,
        to: Option<&RoomId>,
        reason: Option<DepartureReason>,
        now: DateTime<Utc>,
    ) -> Result<PropagationOutcome, EngineError> {
        let from = member.room.clone();
        let finishing = reason == Some(DepartureReason::Finish);
        if from.as_ref() == to && !finishing {
            debug!(member = %member.id, room = ?to, "member already in place");
            return Ok(PropagationOutcome::unchanged(&member));
        }

        let touched: Vec<RoomId> = from.iter().chain(to).cloned().collect();
        let snapshots = self.repository.room_snapshots(&touched)?;
        let mut workspace = Workspace::new(snapshots);
        workspace.track(member.clone());

        let source = match &from {
            Some(room) => Some(
                workspace
                    .room(room)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownRoom(room.clone()))?,
            ),
            None => None,
        };
        let target = match to {
            Some(room) => Some(
                workspace
                    .room(room)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownRoom(room.clone()))?,
            ),
            None => None,
        };
        let source_policy = source
            .as_ref()
            .map(|room| self.policy_for(Some(&room.facility), now))
            .transpose()?;
        let target_policy = target
            .as_ref()
            .map(|room| self.policy_for(Some(&room.facility), now))
            .transpose()?;

        let mut changes = Vec::new();
        if let Some(subject) = workspace.member_mut(&member.id) {
            if from.as_ref() != to {
                subject.room = to.cloned();
                changes.push(MemberChange::RoomChanged {
                    member: subject.id.clone(),
                    from: from.clone(),
                    to: to.cloned(),
                });
            }
            if let (Some(room), Some(policy)) = (&target, &target_policy) {
                subject.facility = Some(room.facility.clone());
                changes.extend(admit(subject, policy, now));
            }
            if finishing {
                subject.quarantine_finished_at = Some(now);
                changes.push(MemberChange::QuarantineFinished {
                    member: subject.id.clone(),
                    at: now,
                });
            }
        }

        if from.as_ref() != to {
            if let (Some(room), Some(policy)) = (&source, &source_policy) {
                let propagation = OccupantPropagation::new(policy, now);
                changes.extend(workspace.with_occupants(&room.id, |remaining| {
                    propagation.after_departure(&member, remaining)
                }));
            }
            if let (Some(room), Some(policy)) = (&target, &target_policy) {
                let propagation = OccupantPropagation::new(policy, now);
                changes.extend(workspace.with_occupants(&room.id, |occupants| {
                    propagation.after_arrival(&member.id, occupants)
                }));
            }
        }

        self.commit("room_change", workspace, Vec::new(), &changes)?;
        Ok(PropagationOutcome {
            member: member.id,
            from_room: from,
            to_room: to.cloned(),
            changes,
        })
    }

    /// Lock the room a member currently occupies, retrying if they move in between.
    fn lock_member_room(
        &self,
        member_id: &MemberId,
    ) -> Result<(RoomLockGuard, Member), EngineError> {
        loop {
            let observed = self.load_member(member_id)?;
            let guard = self.locks.acquire(observed.room.iter());
            let member = self.load_member(member_id)?;
            if member.room == observed.room {
                return Ok((guard, member));
            }
            debug!(member = %member_id, "member moved while locking, retrying");
        }
    }

    fn load_member(&self, member_id: &MemberId) -> Result<Member, EngineError> {
        self.repository
            .member(member_id)?
            .ok_or_else(|| EngineError::UnknownMember(member_id.clone()))
    }

    fn policy_for(
        &self,
        facility: Option<&FacilityId>,
        now: DateTime<Utc>,
    ) -> Result<Policy, EngineError> {
        let facility = match facility {
            Some(id) => Some(
                self.repository
                    .facility(id)?
                    .ok_or_else(|| EngineError::UnknownFacility(id.clone()))?,
            ),
            None => None,
        };
        match self.policies.resolve_optional(facility.as_ref()) {
            Ok(policy) => {
                usable(policy, now)?;
                Ok(policy.clone())
            }
            Err(missing) => {
                warn!(error = %missing, "operation rejected without a quarantine policy");
                Err(missing.into())
            }
        }
    }

    fn commit(
        &self,
        operation: &'static str,
        workspace: Workspace,
        tests: Vec<TestRecord>,
        changes: &[MemberChange],
    ) -> Result<(), EngineError> {
        if let Err(violation) = workspace.validate() {
            warn!(operation, error = %violation, "write rejected, ward invariant would break");
            return Err(violation.into());
        }

        let change_set = WardChangeSet {
            members: workspace.into_updates(),
            tests,
        };
        if change_set.is_empty() {
            debug!(operation, "nothing to commit");
            return Ok(());
        }

        let updated = change_set.members.len();
        if let Err(err) = self.repository.commit(change_set) {
            warn!(operation, error = %err, "ward commit failed");
            return Err(err.into());
        }

        for change in changes {
            debug!(operation, member = %change.member(), change = %change.summary(), "member updated");
        }
        info!(operation, members = updated, changes = changes.len(), "ward changes committed");
        Ok(())
    }
}

fn usable(policy: &Policy, now: DateTime<Utc>) -> Result<(), EngineError> {
    policy.usable_at(now).map_err(|invalid| {
        warn!(policy = %policy.name, error = %invalid, "operation rejected, policy unusable");
        invalid.into()
    })
}

/// Stamp the start of a stay and its default release date on first admission.
fn admit(member: &mut Member, policy: &Policy, now: DateTime<Utc>) -> Vec<MemberChange> {
    let mut changes = Vec::new();
    if member.quarantine_start.is_none() {
        member.quarantine_start = Some(now);
        changes.push(MemberChange::QuarantineStarted {
            member: member.id.clone(),
            at: now,
        });
    }
    if member.quarantine_expected_end.is_none() {
        let until = release_at(now, policy.base_quarantine(member.vaccine_doses));
        changes.extend(extend_expected_end(member, until));
    }
    changes
}

/// Error raised by the quarantine engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Placement(#[from] PlacementFailure),
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
    #[error(transparent)]
    PolicyMissing(#[from] PolicyMissing),
    #[error(transparent)]
    InvalidPolicy(#[from] InvalidPolicy),
    #[error("member {0} not found")]
    UnknownMember(MemberId),
    #[error("room {0} not found")]
    UnknownRoom(RoomId),
    #[error("facility {0} not found")]
    UnknownFacility(FacilityId),
    #[error("member {0} is not registered with any facility")]
    NoFacility(MemberId),
    #[error("member {member} is in room {actual:?}, not {expected:?}")]
    StaleRoomChange {
        member: MemberId,
        expected: Option<RoomId>,
        actual: Option<RoomId>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
