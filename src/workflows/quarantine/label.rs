use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Severity tag carried by every member. `F0` marks a confirmed positive case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    F0,
    F1,
    F2,
    F3,
    #[serde(rename = "FROM_EPIDEMIC_AREA")]
    FromEpidemicArea,
    #[serde(rename = "ABROAD")]
    Abroad,
}

/// Highest severity value that still belongs to the F-range (F0..=F3).
const F_RANGE_MAX: u8 = 3;

impl Label {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::F0,
            Self::F1,
            Self::F2,
            Self::F3,
            Self::FromEpidemicArea,
            Self::Abroad,
        ]
    }

    /// 0 is the most severe label, 5 the least.
    pub const fn severity(self) -> u8 {
        match self {
            Self::F0 => 0,
            Self::F1 => 1,
            Self::F2 => 2,
            Self::F3 => 3,
            Self::FromEpidemicArea => 4,
            Self::Abroad => 5,
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::F0 => "F0",
            Self::F1 => "F1",
            Self::F2 => "F2",
            Self::F3 => "F3",
            Self::FromEpidemicArea => "FROM_EPIDEMIC_AREA",
            Self::Abroad => "ABROAD",
        }
    }

    pub fn from_code(raw: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|label| label.code().eq_ignore_ascii_case(raw.trim()))
    }

    pub const fn is_f_range(self) -> bool {
        self.severity() <= F_RANGE_MAX
    }

    /// Severity comparison: `Less` means `self` is more severe than `other`.
    pub fn compare(self, other: Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }

    pub fn is_more_severe_than(self, other: Self) -> bool {
        self.compare(other) == Ordering::Less
    }

    /// Next less severe label inside the F-range (F3 steps out to `FromEpidemicArea`).
    /// Labels outside the F-range come back unchanged.
    pub fn downgrade(self) -> Self {
        match self {
            Self::F0 => Self::F1,
            Self::F1 => Self::F2,
            Self::F2 => Self::F3,
            Self::F3 => Self::FromEpidemicArea,
            Self::FromEpidemicArea | Self::Abroad => self,
        }
    }

    /// Most severe label of the iterator, if any.
    pub fn most_severe<I>(labels: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        labels.into_iter().min_by_key(|label| label.severity())
    }
}
