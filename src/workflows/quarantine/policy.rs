use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Facility, FacilityId, TestType};

const DEFAULT_VACCINATED_MIN_DOSES: u32 = 2;

/// Longest span any policy duration may name, roughly a century.
pub const MAX_POLICY_DAYS: u32 = 36_500;

/// A value that differs between vaccinated and unvaccinated members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccinationSplit<T> {
    pub vaccinated: T,
    pub unvaccinated: T,
}

impl<T: Copy> VaccinationSplit<T> {
    pub const fn new(vaccinated: T, unvaccinated: T) -> Self {
        Self {
            vaccinated,
            unvaccinated,
        }
    }

    pub fn pick(&self, vaccinated: bool) -> T {
        if vaccinated {
            self.vaccinated
        } else {
            self.unvaccinated
        }
    }
}

/// Duration and threshold table applied by one quarantine facility. Durations are in days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub base_quarantine_days: VaccinationSplit<u32>,
    pub positive_case_days: VaccinationSplit<u32>,
    pub close_contact_after_positive_days: VaccinationSplit<u32>,
    pub close_contact_not_positive_days: VaccinationSplit<u32>,
    pub required_negative_tests: VaccinationSplit<u32>,
    pub required_test_type: VaccinationSplit<Option<TestType>>,
    pub close_room_after_days: u32,
    #[serde(default = "default_vaccinated_min_doses")]
    pub vaccinated_min_doses: u32,
}

fn default_vaccinated_min_doses() -> u32 {
    DEFAULT_VACCINATED_MIN_DOSES
}

impl Policy {
    /// Defaults shipped with the service when no environment overrides are present.
    pub fn builtin() -> Self {
        Self {
            name: "builtin".to_string(),
            base_quarantine_days: VaccinationSplit::new(7, 14),
            positive_case_days: VaccinationSplit::new(10, 14),
            close_contact_after_positive_days: VaccinationSplit::new(7, 14),
            close_contact_not_positive_days: VaccinationSplit::new(7, 14),
            required_negative_tests: VaccinationSplit::new(1, 2),
            required_test_type: VaccinationSplit::new(Some(TestType::RtPcr), Some(TestType::RtPcr)),
            close_room_after_days: 1,
            vaccinated_min_doses: DEFAULT_VACCINATED_MIN_DOSES,
        }
    }

    pub fn is_vaccinated(&self, vaccine_doses: u32) -> bool {
        vaccine_doses >= self.vaccinated_min_doses
    }

    pub fn base_quarantine(&self, vaccine_doses: u32) -> Duration {
        days(self.base_quarantine_days.pick(self.is_vaccinated(vaccine_doses)))
    }

    pub fn positive_case(&self, vaccine_doses: u32) -> Duration {
        days(self.positive_case_days.pick(self.is_vaccinated(vaccine_doses)))
    }

    pub fn close_contact_after_positive(&self, vaccine_doses: u32) -> Duration {
        days(
            self.close_contact_after_positive_days
                .pick(self.is_vaccinated(vaccine_doses)),
        )
    }

    pub fn close_contact_not_positive(&self, vaccine_doses: u32) -> Duration {
        days(
            self.close_contact_not_positive_days
                .pick(self.is_vaccinated(vaccine_doses)),
        )
    }

    pub fn required_negative_count(&self, vaccine_doses: u32) -> u32 {
        self.required_negative_tests
            .pick(self.is_vaccinated(vaccine_doses))
    }

    pub fn required_test_type(&self, vaccine_doses: u32) -> Option<TestType> {
        self.required_test_type.pick(self.is_vaccinated(vaccine_doses))
    }

    pub fn close_room_after(&self) -> Duration {
        days(self.close_room_after_days)
    }

    /// Instant before which an occupant's admission closes their room, or `None` when the
    /// window reaches back past the start of representable time.
    pub fn close_room_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.close_room_after())
    }

    /// Every duration must fit within [`MAX_POLICY_DAYS`].
    pub fn validate(&self) -> Result<(), InvalidPolicy> {
        let splits = [
            ("base_quarantine_days", self.base_quarantine_days),
            ("positive_case_days", self.positive_case_days),
            (
                "close_contact_after_positive_days",
                self.close_contact_after_positive_days,
            ),
            (
                "close_contact_not_positive_days",
                self.close_contact_not_positive_days,
            ),
        ];
        let spans = splits
            .into_iter()
            .flat_map(|(field, split)| [(field, split.vaccinated), (field, split.unvaccinated)])
            .chain([("close_room_after_days", self.close_room_after_days)]);

        for (field, days) in spans {
            if days > MAX_POLICY_DAYS {
                return Err(InvalidPolicy::DurationTooLong {
                    policy: self.name.clone(),
                    field,
                    days,
                    max: MAX_POLICY_DAYS,
                });
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate), then make sure release dates computed at `now` stay
    /// representable.
    pub fn usable_at(&self, now: DateTime<Utc>) -> Result<(), InvalidPolicy> {
        self.validate()?;
        if now.checked_add_signed(days(MAX_POLICY_DAYS)).is_none() {
            return Err(InvalidPolicy::ClockOutOfRange {
                policy: self.name.clone(),
                now,
            });
        }
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::builtin()
    }
}

fn days(count: u32) -> Duration {
    Duration::days(i64::from(count))
}

/// Raised when neither the facility nor the global default supplies a policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no {}quarantine policy configured{}", default_only(.facility), for_facility(.facility))]
pub struct PolicyMissing {
    pub facility: Option<FacilityId>,
}

fn default_only(facility: &Option<FacilityId>) -> &'static str {
    if facility.is_none() {
        "default "
    } else {
        ""
    }
}

fn for_facility(facility: &Option<FacilityId>) -> String {
    facility
        .as_ref()
        .map(|id| format!(" for facility {id} and no default available"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPolicy {
    #[error("policy '{policy}': {field} is {days} days, longer than the {max} day limit")]
    DurationTooLong {
        policy: String,
        field: &'static str,
        days: u32,
        max: u32,
    },
    #[error("policy '{policy}' cannot compute release dates from {now}")]
    ClockOutOfRange { policy: String, now: DateTime<Utc> },
}

/// Resolves `facility.policy ?? global default`.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    default_policy: Option<Policy>,
}

impl PolicyResolver {
    pub fn new(default_policy: Option<Policy>) -> Self {
        Self { default_policy }
    }

    pub fn default_policy(&self) -> Option<&Policy> {
        self.default_policy.as_ref()
    }

    pub fn resolve<'a>(&'a self, facility: &'a Facility) -> Result<&'a Policy, PolicyMissing> {
        self.resolve_optional(Some(facility))
    }

    /// Like [`resolve`](Self::resolve) for members that are not attached to any facility.
    pub fn resolve_optional<'a>(
        &'a self,
        facility: Option<&'a Facility>,
    ) -> Result<&'a Policy, PolicyMissing> {
        facility
            .and_then(|facility| facility.policy.as_ref())
            .or(self.default_policy.as_ref())
            .ok_or_else(|| PolicyMissing {
                facility: facility.map(|facility| facility.id.clone()),
            })
    }
}
