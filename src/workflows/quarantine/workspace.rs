use std::collections::BTreeMap;

use super::domain::{Member, MemberChange, MemberId, Room, RoomId};
use super::invariants::{check_member, check_room, InvariantViolation};
use super::repository::{MemberUpdate, RoomSnapshot};

/// Pending state of the rooms and members touched by one engine operation.
///
/// Holds each member as originally read next to its working copy, so the change set only
/// carries records that actually changed and commits can compare against what was read.
#[derive(Debug, Default)]
pub(crate) struct Workspace {
    rooms: BTreeMap<RoomId, Room>,
    before: BTreeMap<MemberId, Member>,
    after: BTreeMap<MemberId, Member>,
}

impl Workspace {
    pub(crate) fn new(snapshots: Vec<RoomSnapshot>) -> Self {
        let mut workspace = Self::default();
        for snapshot in snapshots {
            for occupant in snapshot.occupants {
                workspace.track(occupant);
            }
            workspace.rooms.insert(snapshot.room.id.clone(), snapshot.room);
        }
        workspace
    }

    /// Start tracking a member not found in any loaded room. Already tracked members are kept.
    pub(crate) fn track(&mut self, member: Member) {
        if self.before.contains_key(&member.id) {
            return;
        }
        self.before.insert(member.id.clone(), member.clone());
        self.after.insert(member.id.clone(), member);
    }

    pub(crate) fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub(crate) fn member(&self, id: &MemberId) -> Option<&Member> {
        self.after.get(id)
    }

    pub(crate) fn member_mut(&mut self, id: &MemberId) -> Option<&mut Member> {
        self.after.get_mut(id)
    }

    /// Run `apply` over the current occupants of `room`, ordered by member id.
    pub(crate) fn with_occupants<F>(&mut self, room: &RoomId, apply: F) -> Vec<MemberChange>
    where
        F: FnOnce(&mut [Member]) -> Vec<MemberChange>,
    {
        let mut occupants: Vec<Member> = self
            .after
            .values()
            .filter(|member| member.room.as_ref() == Some(room))
            .cloned()
            .collect();
        let changes = apply(&mut occupants);
        self.put_back(occupants);
        changes
    }

    /// Like [`with_occupants`](Self::with_occupants) for a member who holds no room.
    pub(crate) fn with_member<F>(&mut self, member: &MemberId, apply: F) -> Vec<MemberChange>
    where
        F: FnOnce(&mut [Member]) -> Vec<MemberChange>,
    {
        let Some(current) = self.after.get(member).cloned() else {
            return Vec::new();
        };
        let mut group = vec![current];
        let changes = apply(&mut group);
        self.put_back(group);
        changes
    }

    fn put_back(&mut self, members: Vec<Member>) {
        for member in members {
            self.after.insert(member.id.clone(), member);
        }
    }

    /// Room rules over every loaded room, transition rules over every changed member.
    pub(crate) fn validate(&self) -> Result<(), InvariantViolation> {
        for room in self.rooms.values() {
            let occupants: Vec<&Member> = self
                .after
                .values()
                .filter(|member| member.room.as_ref() == Some(&room.id))
                .collect();
            check_room(room, &occupants)?;
        }

        for (id, after) in &self.after {
            if let Some(before) = self.before.get(id) {
                if before != after {
                    check_member(before, after)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn into_updates(self) -> Vec<MemberUpdate> {
        let Self {
            mut before, after, ..
        } = self;
        after
            .into_iter()
            .filter_map(|(id, after)| {
                let before = before.remove(&id)?;
                (before != after).then_some(MemberUpdate { before, after })
            })
            .collect()
    }
}
