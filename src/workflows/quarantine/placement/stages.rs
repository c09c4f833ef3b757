use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, Utc};

use super::super::domain::{Member, RoomId};
use super::super::repository::{closed_before, RoomSnapshot};
use super::PlacementRequest;

/// Neutral dose average assumed for a room nobody occupies yet.
const EMPTY_ROOM_DOSE_AVERAGE: u64 = 1;

/// A room under consideration, with the subject's own occupancy filtered out.
#[derive(Debug, Clone)]
pub(crate) struct Candidate<'a> {
    pub snapshot: &'a RoomSnapshot,
    pub occupants: Vec<&'a Member>,
}

impl<'a> Candidate<'a> {
    pub fn new(snapshot: &'a RoomSnapshot, request: &PlacementRequest) -> Self {
        let occupants = snapshot
            .occupants
            .iter()
            .filter(|member| Some(&member.id) != request.subject.as_ref())
            .collect();
        Self {
            snapshot,
            occupants,
        }
    }

    pub fn room_id(&self) -> &'a RoomId {
        &self.snapshot.room.id
    }

    pub fn has_vacancy(&self) -> bool {
        (self.occupants.len() as u64) < u64::from(self.snapshot.room.capacity)
    }

    pub fn remaining_capacity(&self) -> u64 {
        u64::from(self.snapshot.room.capacity).saturating_sub(self.occupants.len() as u64)
    }

    pub fn status_compatible(&self, request: &PlacementRequest) -> bool {
        match request.infection_status.conflicting() {
            Some(conflict) => self
                .occupants
                .iter()
                .all(|member| member.infection_status != conflict),
            None => true,
        }
    }

    /// Same rule as [`RoomSnapshot::is_closed`], ignoring the subject's own seat.
    pub fn is_closed(&self, cutoff: Option<DateTime<Utc>>) -> bool {
        closed_before(self.occupants.iter().copied(), cutoff)
    }

    pub fn same_label_count(&self, request: &PlacementRequest) -> usize {
        self.occupants
            .iter()
            .filter(|member| member.label == request.label)
            .count()
    }

    pub fn same_gender_count(&self, request: &PlacementRequest) -> usize {
        self.occupants
            .iter()
            .filter(|member| member.gender == request.gender)
            .count()
    }

    pub fn dose_distance(&self, request: &PlacementRequest) -> DoseDistance {
        let subject = u64::from(request.vaccine_doses);
        if self.occupants.is_empty() {
            return DoseDistance {
                numerator: EMPTY_ROOM_DOSE_AVERAGE.abs_diff(subject),
                denominator: 1,
            };
        }

        let count = self.occupants.len() as u64;
        let total: u64 = self
            .occupants
            .iter()
            .map(|member| u64::from(member.vaccine_doses))
            .sum();
        DoseDistance {
            numerator: total.abs_diff(subject * count),
            denominator: count,
        }
    }
}

/// `|average(occupant doses) - subject doses|` kept as an exact fraction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DoseDistance {
    numerator: u64,
    denominator: u64,
}

impl DoseDistance {
    pub fn as_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl PartialEq for DoseDistance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DoseDistance {}

impl PartialOrd for DoseDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DoseDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = u128::from(self.numerator) * u128::from(other.denominator);
        let rhs = u128::from(other.numerator) * u128::from(self.denominator);
        lhs.cmp(&rhs)
    }
}

/// Keep only the candidates whose key equals the minimum key.
pub(crate) fn narrow_to_min<'a, K, F>(candidates: Vec<Candidate<'a>>, key: F) -> Vec<Candidate<'a>>
where
    K: Ord,
    F: Fn(&Candidate<'a>) -> K,
{
    let Some(best) = candidates.iter().map(&key).min() else {
        return candidates;
    };
    candidates
        .into_iter()
        .filter(|candidate| key(candidate) == best)
        .collect()
}

/// Keep only the candidates whose key equals the maximum key.
pub(crate) fn narrow_to_max<'a, K, F>(candidates: Vec<Candidate<'a>>, key: F) -> Vec<Candidate<'a>>
where
    K: Ord,
    F: Fn(&Candidate<'a>) -> K,
{
    narrow_to_min(candidates, |candidate| Reverse(key(candidate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(numerator: u64, denominator: u64) -> DoseDistance {
        DoseDistance {
            numerator,
            denominator,
        }
    }

    #[test]
    fn dose_distance_compares_fractions_exactly() {
        assert_eq!(distance(1, 3), distance(2, 6));
        assert!(distance(1, 3) < distance(1, 2));
        assert!(distance(3, 2) > distance(1, 1));
        assert_eq!(distance(0, 5), distance(0, 1));
    }

    #[test]
    fn dose_distance_renders_as_float() {
        assert!((distance(1, 4).as_f64() - 0.25).abs() < f64::EPSILON);
    }
}
