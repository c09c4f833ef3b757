use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::label::Label;
use super::policy::Policy;

/// Identifier wrapper for quarantined members.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

/// Identifier wrapper for rooms. Ordering doubles as the global lock order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

/// Identifier wrapper for quarantine facilities (wards).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacilityId(pub String);

/// Identifier wrapper for test records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestRecordId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )*
    };
}

display_id!(MemberId, RoomId, FacilityId, TestRecordId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// Tri-state infection status driven by test results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfectionStatus {
    Positive,
    Negative,
    Unknown,
}

impl InfectionStatus {
    /// The status a room must not contain for a member of this status to join it.
    pub const fn conflicting(self) -> Option<Self> {
        match self {
            Self::Positive => Some(Self::Negative),
            Self::Negative => Some(Self::Positive),
            Self::Unknown => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Unknown => "unknown",
        }
    }
}

/// A person in quarantine together with their current stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub gender: Gender,
    pub label: Label,
    pub infection_status: InfectionStatus,
    pub vaccine_doses: u32,
    #[serde(default)]
    pub quarantine_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quarantine_expected_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quarantine_finished_at: Option<DateTime<Utc>>,
    /// Ward the member is registered with, used when they hold no room.
    #[serde(default)]
    pub facility: Option<FacilityId>,
    #[serde(default)]
    pub room: Option<RoomId>,
    #[serde(default)]
    pub positive_tested_before: bool,
}

impl Member {
    pub fn new(id: impl Into<String>, gender: Gender, label: Label) -> Self {
        Self {
            id: MemberId(id.into()),
            gender,
            label,
            infection_status: InfectionStatus::Unknown,
            vaccine_doses: 0,
            quarantine_start: None,
            quarantine_expected_end: None,
            quarantine_finished_at: None,
            facility: None,
            room: None,
            positive_tested_before: false,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.infection_status == InfectionStatus::Positive
    }
}

/// A room inside the Floor -> Building -> Facility hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub facility: FacilityId,
    #[serde(default)]
    pub building: String,
    #[serde(default)]
    pub floor: String,
    pub capacity: u32,
}

/// Quarantine ward owning rooms and, optionally, its own duration policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    #[serde(default)]
    pub policy: Option<Policy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    None,
    Negative,
    Positive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    QuickTest,
    RtPcr,
}

/// Append-only test event. Corrections arrive as new records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: TestRecordId,
    pub member: MemberId,
    pub result: TestResult,
    pub test_type: TestType,
    pub created_at: DateTime<Utc>,
}

/// Why a member leaves their room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartureReason {
    Leave,
    Hospitalize,
    Finish,
}

impl DepartureReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Hospitalize => "hospitalize",
            Self::Finish => "finish",
        }
    }
}

/// One field-level mutation applied to a member, kept for audit and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberChange {
    RoomChanged {
        member: MemberId,
        from: Option<RoomId>,
        to: Option<RoomId>,
    },
    LabelChanged {
        member: MemberId,
        from: Label,
        to: Label,
    },
    StatusChanged {
        member: MemberId,
        from: InfectionStatus,
        to: InfectionStatus,
    },
    ExpectedEndSet {
        member: MemberId,
        from: Option<DateTime<Utc>>,
        to: DateTime<Utc>,
    },
    ExpectedEndCleared {
        member: MemberId,
        from: DateTime<Utc>,
    },
    QuarantineStarted {
        member: MemberId,
        at: DateTime<Utc>,
    },
    QuarantineFinished {
        member: MemberId,
        at: DateTime<Utc>,
    },
}

impl MemberChange {
    pub fn member(&self) -> &MemberId {
        match self {
            Self::RoomChanged { member, .. }
            | Self::LabelChanged { member, .. }
            | Self::StatusChanged { member, .. }
            | Self::ExpectedEndSet { member, .. }
            | Self::ExpectedEndCleared { member, .. }
            | Self::QuarantineStarted { member, .. }
            | Self::QuarantineFinished { member, .. } => member,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Self::RoomChanged { member, from, to } => format!(
                "{member} moved {} -> {}",
                describe_room(from.as_ref()),
                describe_room(to.as_ref())
            ),
            Self::LabelChanged { member, from, to } => {
                format!("{member} relabelled {} -> {}", from.code(), to.code())
            }
            Self::StatusChanged { member, from, to } => {
                format!("{member} status {} -> {}", from.label(), to.label())
            }
            Self::ExpectedEndSet { member, to, .. } => {
                format!("{member} expected release {}", to.to_rfc3339())
            }
            Self::ExpectedEndCleared { member, .. } => {
                format!("{member} expected release cleared")
            }
            Self::QuarantineStarted { member, at } => {
                format!("{member} quarantine started {}", at.to_rfc3339())
            }
            Self::QuarantineFinished { member, at } => {
                format!("{member} quarantine finished {}", at.to_rfc3339())
            }
        }
    }
}

fn describe_room(room: Option<&RoomId>) -> String {
    match room {
        Some(id) => id.0.clone(),
        None => "(none)".to_string(),
    }
}
