use std::env;
use std::fmt;

use crate::workflows::quarantine::domain::TestType;
use crate::workflows::quarantine::policy::{InvalidPolicy, Policy, VaccinationSplit};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    /// Global fallback used when a facility has no policy of its own.
    pub default_policy: Option<Policy>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let show_targets = env::var("APP_LOG_TARGETS")
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let default_policy = match env::var("WARD_DEFAULT_POLICY")
            .unwrap_or_else(|_| "builtin".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "none" | "off" | "disabled" => None,
            "builtin" | "" => Some(policy_from_env(Policy::builtin())?),
            other => return Err(ConfigError::UnknownPolicySource(other.to_string())),
        };

        Ok(Self {
            environment,
            telemetry: TelemetryConfig {
                log_level,
                show_targets,
            },
            default_policy,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Bare level for the engine, or a full `EnvFilter` directive list.
    pub log_level: String,
    pub show_targets: bool,
}

fn policy_from_env(mut policy: Policy) -> Result<Policy, ConfigError> {
    if let Ok(name) = env::var("WARD_POLICY_NAME") {
        policy.name = name;
    }

    override_split(
        "WARD_POLICY_BASE_DAYS",
        &mut policy.base_quarantine_days,
    )?;
    override_split(
        "WARD_POLICY_POSITIVE_DAYS",
        &mut policy.positive_case_days,
    )?;
    override_split(
        "WARD_POLICY_CONTACT_AFTER_POSITIVE_DAYS",
        &mut policy.close_contact_after_positive_days,
    )?;
    override_split(
        "WARD_POLICY_CONTACT_NOT_POSITIVE_DAYS",
        &mut policy.close_contact_not_positive_days,
    )?;
    override_split(
        "WARD_POLICY_NEGATIVE_TESTS",
        &mut policy.required_negative_tests,
    )?;

    for (suffix, slot) in [
        ("VACCINATED", &mut policy.required_test_type.vaccinated),
        ("UNVACCINATED", &mut policy.required_test_type.unvaccinated),
    ] {
        let key = format!("WARD_POLICY_TEST_TYPE_{suffix}");
        if let Ok(raw) = env::var(&key) {
            *slot = parse_test_type(&key, &raw)?;
        }
    }

    if let Ok(raw) = env::var("WARD_POLICY_CLOSE_ROOM_AFTER_DAYS") {
        policy.close_room_after_days = parse_u32("WARD_POLICY_CLOSE_ROOM_AFTER_DAYS", &raw)?;
    }
    if let Ok(raw) = env::var("WARD_POLICY_VACCINATED_MIN_DOSES") {
        policy.vaccinated_min_doses = parse_u32("WARD_POLICY_VACCINATED_MIN_DOSES", &raw)?;
    }

    policy.validate().map_err(ConfigError::InvalidPolicy)?;
    Ok(policy)
}

fn override_split(prefix: &str, split: &mut VaccinationSplit<u32>) -> Result<(), ConfigError> {
    let vaccinated_key = format!("{prefix}_VACCINATED");
    if let Ok(raw) = env::var(&vaccinated_key) {
        split.vaccinated = parse_u32(&vaccinated_key, &raw)?;
    }

    let unvaccinated_key = format!("{prefix}_UNVACCINATED");
    if let Ok(raw) = env::var(&unvaccinated_key) {
        split.unvaccinated = parse_u32(&unvaccinated_key, &raw)?;
    }

    Ok(())
}

fn parse_u32(key: &str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidPolicyValue {
            key: key.to_string(),
            value: raw.to_string(),
        })
}

fn parse_test_type(key: &str, raw: &str) -> Result<Option<TestType>, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "any" | "" => Ok(None),
        "quick" | "quick_test" => Ok(Some(TestType::QuickTest)),
        "rt_pcr" | "rtpcr" | "pcr" => Ok(Some(TestType::RtPcr)),
        _ => Err(ConfigError::InvalidPolicyValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    UnknownPolicySource(String),
    InvalidPolicyValue { key: String, value: String },
    InvalidPolicy(InvalidPolicy),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownPolicySource(value) => write!(
                f,
                "WARD_DEFAULT_POLICY must be 'builtin' or 'none' (found '{}')",
                value
            ),
            ConfigError::InvalidPolicyValue { key, value } => {
                write!(f, "{} has an invalid value '{}'", key, value)
            }
            ConfigError::InvalidPolicy(err) => write!(f, "default policy is unusable: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPolicy(err) => Some(err),
            _ => None,
        }
    }
}
