use serde::{Deserialize, Serialize};

use super::domain::{InfectionStatus, Member, TestRecord, TestResult};
use super::policy::Policy;

/// How a member's infection status moved in response to one test record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTransition {
    Unchanged,
    BecamePositive,
    Recovered,
    ConfirmedNegative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDecision {
    pub previous: InfectionStatus,
    pub next: InfectionStatus,
    pub transition: StatusTransition,
    /// Qualifying negatives since the last positive record, incoming record included.
    pub qualifying_negatives: u32,
    pub required_negatives: u32,
}

/// Per-member state machine over Unknown / Positive / Negative.
pub struct StatusResolver<'p> {
    policy: &'p Policy,
}

impl<'p> StatusResolver<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self { policy }
    }

    pub fn resolve(
        &self,
        member: &Member,
        history: &[TestRecord],
        incoming: &TestRecord,
    ) -> StatusDecision {
        let previous = member.infection_status;
        let required_negatives = self.policy.required_negative_count(member.vaccine_doses);
        let qualifying_negatives = self.negative_streak(member, history, incoming);

        let next = match incoming.result {
            TestResult::Positive => InfectionStatus::Positive,
            TestResult::Negative if previous != InfectionStatus::Positive => {
                InfectionStatus::Negative
            }
            TestResult::Negative if qualifying_negatives >= required_negatives => {
                InfectionStatus::Negative
            }
            TestResult::Negative | TestResult::None => previous,
        };

        let transition = match (previous, next) {
            (before, after) if before == after => StatusTransition::Unchanged,
            (_, InfectionStatus::Positive) => StatusTransition::BecamePositive,
            (InfectionStatus::Positive, InfectionStatus::Negative) => StatusTransition::Recovered,
            (_, InfectionStatus::Negative) => StatusTransition::ConfirmedNegative,
            (_, InfectionStatus::Unknown) => StatusTransition::Unchanged,
        };

        StatusDecision {
            previous,
            next,
            transition,
            qualifying_negatives,
            required_negatives,
        }
    }

    /// Negatives of the required type recorded after the latest positive, in creation order.
    /// Results of another type and empty results neither count nor break the streak.
    fn negative_streak(&self, member: &Member, history: &[TestRecord], incoming: &TestRecord) -> u32 {
        let required_type = self.policy.required_test_type(member.vaccine_doses);

        let mut timeline: Vec<&TestRecord> = history
            .iter()
            .filter(|record| record.id != incoming.id)
            .chain(std::iter::once(incoming))
            .collect();
        timeline.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let after_last_positive = timeline
            .iter()
            .rposition(|record| record.result == TestResult::Positive)
            .map_or(0, |index| index + 1);

        let count = timeline[after_last_positive..]
            .iter()
            .filter(|record| record.result == TestResult::Negative)
            .filter(|record| required_type.map_or(true, |kind| record.test_type == kind))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}
