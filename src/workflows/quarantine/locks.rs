use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use super::domain::RoomId;

/// Lazily populated table of per-room mutexes.
#[derive(Debug, Default)]
pub struct RoomLocks {
    table: Mutex<HashMap<RoomId, Arc<Mutex<()>>>>,
}

type RoomGuard = ArcMutexGuard<RawMutex, ()>;

/// Exclusive hold on a set of rooms; released on drop.
pub struct RoomLockGuard {
    rooms: Vec<RoomId>,
    _guards: Vec<RoomGuard>,
}

impl RoomLockGuard {
    pub fn rooms(&self) -> &[RoomId] {
        &self.rooms
    }
}

impl std::fmt::Debug for RoomLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomLockGuard")
            .field("rooms", &self.rooms)
            .finish()
    }
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, room: &RoomId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock();
        table
            .entry(room.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock every listed room in ascending id order, skipping duplicates.
    pub fn acquire<'a, I>(&self, rooms: I) -> RoomLockGuard
    where
        I: IntoIterator<Item = &'a RoomId>,
    {
        let ordered: BTreeSet<&RoomId> = rooms.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        let mut held = Vec::with_capacity(ordered.len());

        for room in ordered {
            let handle = self.handle(room);
            guards.push(handle.lock_arc());
            held.push(room.clone());
        }

        RoomLockGuard {
            rooms: held,
            _guards: guards,
        }
    }
}
