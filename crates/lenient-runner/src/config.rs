use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lenient_core::{validate_job_name, JobName, ShutdownConfig};

/// On-disk settings file, `.lenient/lenient.toml` under the project root.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        cfg.shutdown.validate().with_context(|| format!("invalid allow list in {}", path.display()))?;
        Ok(cfg)
    }

    /// Refuses to write a configuration the gates would reject.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.shutdown.validate().context("refusing to save invalid configuration")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).context("serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".lenient").join("lenient.toml")
    }

    /// Allow list as operators type it: one full job name per line, blank
    /// lines ignored. Every remaining line must be a well-formed name.
    pub fn parse_allow_list_text(text: &str) -> Result<BTreeSet<JobName>> {
        text.split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty())
            .map(|line| -> Result<JobName> {
                validate_job_name(line).with_context(|| format!("allow list entry {line:?}"))?;
                Ok(JobName::from(line))
            })
            .collect()
    }

    /// Adds `job` to the allow list and switches allow-listing on. Returns
    /// false when it was already listed.
    pub fn allow(&mut self, job: &str) -> Result<bool> {
        validate_job_name(job).with_context(|| format!("allow list entry {job:?}"))?;
        self.shutdown.allow_listed_enabled = true;
        Ok(self.shutdown.allow_listed_jobs.insert(JobName::from(job)))
    }

    pub fn disallow(&mut self, job: &str) -> bool {
        self.shutdown.allow_listed_jobs.remove(&JobName::from(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crlf_and_skips_blank_lines() {
        let jobs = Config::parse_allow_list_text("ops/nightly-deploy\r\n\r\nrelease/tag\n  \n").unwrap();
        let names: Vec<_> = jobs.iter().map(JobName::as_str).collect();
        assert_eq!(names, vec!["ops/nightly-deploy", "release/tag"]);
    }

    #[test]
    fn rejects_padded_or_malformed_entries() {
        assert!(Config::parse_allow_list_text(" ops/nightly").is_err());
        assert!(Config::parse_allow_list_text("ops//nightly").is_err());
    }

    #[test]
    fn allow_switches_listing_on() {
        let mut cfg = Config::default();
        assert!(cfg.allow("ops/nightly").unwrap());
        assert!(!cfg.allow("ops/nightly").unwrap());
        assert!(cfg.shutdown.is_allow_listed(&JobName::from("ops/nightly")));
        assert!(cfg.disallow("ops/nightly"));
        assert!(!cfg.disallow("ops/nightly"));
    }
}
