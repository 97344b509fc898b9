use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, JobName};

pub const DEFAULT_SHUTDOWN_MESSAGE: &str = "Going to shut down";

/// Operator settings read by the gates. Loaded and saved by the shell; the
/// core only reads it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShutdownConfig {
    #[serde(default = "default_message")]
    pub shutdown_message: String,
    /// Every item queued when shutdown starts may still build.
    #[serde(default)]
    pub allow_all_queued_items: bool,
    /// Downstream items of still-building upstream runs count as permitted,
    /// not only those whose upstream already completed.
    #[serde(default)]
    pub allow_all_downstream_items: bool,
    #[serde(default)]
    pub allow_listed_enabled: bool,
    #[serde(default)]
    pub allow_listed_jobs: BTreeSet<JobName>,
}

fn default_message() -> String {
    DEFAULT_SHUTDOWN_MESSAGE.to_string()
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            shutdown_message: default_message(),
            allow_all_queued_items: false,
            allow_all_downstream_items: false,
            allow_listed_enabled: false,
            allow_listed_jobs: BTreeSet::new(),
        }
    }
}

impl ShutdownConfig {
    /// True only when allow-listing is switched on and `job` is listed.
    pub fn is_allow_listed(&self, job: &JobName) -> bool {
        self.allow_listed_enabled && self.allow_listed_jobs.contains(job)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allow_listed_jobs.iter().try_for_each(|job| validate_job_name(job.as_str()))
    }
}

/// Full job names are `/`-separated paths with non-empty segments.
pub fn validate_job_name(entry: &str) -> Result<(), ConfigError> {
    if entry.is_empty() {
        return Err(ConfigError::EmptyAllowListEntry);
    }
    if entry.contains('\n') || entry.contains('\r') {
        return Err(ConfigError::MultilineAllowListEntry { entry: entry.to_string() });
    }
    if entry.trim() != entry {
        return Err(ConfigError::UntrimmedAllowListEntry { entry: entry.to_string() });
    }
    if entry.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(ConfigError::MalformedJobName { entry: entry.to_string() });
    }
    Ok(())
}
