//! Replays a scripted ward scenario through the engine against the in-memory store.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;
use crate::workflows::quarantine::{
    DepartureReason, Facility, FacilityId, InMemoryWard, Label, Member, MemberId,
    OccupancyReport, PlacementOutcome, Policy, PropagationOutcome, QuarantineEngine, Room,
    RoomId, StatusOutcome, TestRecord, TestRecordId, TestResult, TestType,
};

/// Seed data plus an ordered list of events.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Clock used for events without their own timestamp.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    pub facilities: Vec<Facility>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioEvent {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    Place {
        member: MemberId,
        #[serde(default)]
        facility: Option<FacilityId>,
        #[serde(default)]
        exclude: Vec<RoomId>,
    },
    Move {
        member: MemberId,
        #[serde(default)]
        from: Option<RoomId>,
        #[serde(default)]
        to: Option<RoomId>,
    },
    Test {
        id: TestRecordId,
        member: MemberId,
        result: TestResult,
        test_type: TestType,
    },
    Depart {
        member: MemberId,
        reason: DepartureReason,
    },
    Relabel {
        member: MemberId,
        label: Label,
    },
}

impl ScenarioAction {
    pub fn describe(&self) -> String {
        match self {
            Self::Place { member, .. } => format!("place {member}"),
            Self::Move { member, from, to } => {
                format!("move {member} {from:?} -> {to:?}")
            }
            Self::Test {
                member,
                result,
                test_type,
                ..
            } => format!("test {member} {result:?} ({test_type:?})"),
            Self::Depart { member, reason } => format!("depart {member} ({})", reason.label()),
            Self::Relabel { member, label } => format!("relabel {member} {}", label.code()),
        }
    }
}

/// What happened to one scenario event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventResult {
    Placed(PlacementOutcome),
    Propagated(PropagationOutcome),
    Tested(StatusOutcome),
    Rejected { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventReport {
    pub index: usize,
    pub at: DateTime<Utc>,
    pub action: String,
    pub result: EventResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationRun {
    pub events: Vec<EventReport>,
    pub occupancy: Vec<OccupancyReport>,
}

impl SimulationRun {
    pub fn rejected(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event.result, EventResult::Rejected { .. }))
            .count()
    }
}

pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario, AppError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Seed an in-memory ward and run every event in order. Engine errors are recorded per event
/// and do not stop the run; seeding errors do.
pub fn run(
    scenario: Scenario,
    default_policy: Option<Policy>,
    now: Option<DateTime<Utc>>,
) -> Result<SimulationRun, AppError> {
    let clock = now.or(scenario.now).unwrap_or_else(Utc::now);
    let ward = Arc::new(InMemoryWard::new());

    let facility_ids: Vec<FacilityId> = scenario
        .facilities
        .iter()
        .map(|facility| facility.id.clone())
        .collect();
    for facility in scenario.facilities {
        ward.add_facility(facility)?;
    }
    for room in scenario.rooms {
        ward.add_room(room)?;
    }
    for member in scenario.members {
        ward.add_member(member)?;
    }

    let engine = QuarantineEngine::new(ward, default_policy);
    let mut events = Vec::with_capacity(scenario.events.len());

    for (index, event) in scenario.events.into_iter().enumerate() {
        let at = event.at.unwrap_or(clock);
        let action = event.action.describe();
        let result = apply(&engine, event.action, at);
        match &result {
            EventResult::Rejected { error } => warn!(index, %action, %error, "scenario event rejected"),
            _ => info!(index, %action, "scenario event applied"),
        }
        events.push(EventReport {
            index,
            at,
            action,
            result,
        });
    }

    let occupancy = facility_ids
        .iter()
        .map(|facility| engine.occupancy_report(facility, clock))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SimulationRun { events, occupancy })
}

fn apply(
    engine: &QuarantineEngine<InMemoryWard>,
    action: ScenarioAction,
    at: DateTime<Utc>,
) -> EventResult {
    let outcome = match action {
        ScenarioAction::Place {
            member,
            facility,
            exclude,
        } => engine
            .place_member(&member, facility.as_ref(), &exclude, at)
            .map(EventResult::Placed),
        ScenarioAction::Move { member, from, to } => engine
            .on_room_change(&member, from.as_ref(), to.as_ref(), at)
            .map(EventResult::Propagated),
        ScenarioAction::Test {
            id,
            member,
            result,
            test_type,
        } => engine
            .on_test_result(
                TestRecord {
                    id,
                    member,
                    result,
                    test_type,
                    created_at: at,
                },
                at,
            )
            .map(EventResult::Tested),
        ScenarioAction::Depart { member, reason } => engine
            .depart(&member, reason, at)
            .map(EventResult::Propagated),
        ScenarioAction::Relabel { member, label } => engine
            .on_label_change(&member, label)
            .map(EventResult::Propagated),
    };

    outcome.unwrap_or_else(|err| EventResult::Rejected {
        error: err.to_string(),
    })
}
