use thiserror::Error;

/// Rejected shutdown configuration. Raised when the configuration is saved,
/// never from inside an admission decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("allow-list entry is empty")]
    EmptyAllowListEntry,

    #[error("allow-list entry {entry:?} has leading or trailing whitespace")]
    UntrimmedAllowListEntry { entry: String },

    #[error("allow-list entry {entry:?} contains a line break")]
    MultilineAllowListEntry { entry: String },

    #[error("allow-list entry {entry:?} is not a full job name")]
    MalformedJobName { entry: String },
}

impl ConfigError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::EmptyAllowListEntry => "config_empty_entry",
            ConfigError::UntrimmedAllowListEntry { .. } => "config_untrimmed_entry",
            ConfigError::MultilineAllowListEntry { .. } => "config_multiline_entry",
            ConfigError::MalformedJobName { .. } => "config_malformed_job_name",
        }
    }
}
