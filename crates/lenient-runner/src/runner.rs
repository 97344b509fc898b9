use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::Config;

/// A project root with its `.lenient/` settings loaded.
pub struct Runner {
    pub root: PathBuf,
    pub cfg: Config,
}

impl Runner {
    /// Opens `root`, writing the default settings file on first use.
    pub fn open(root: PathBuf) -> Result<Self> {
        let cfg_path = Config::config_path(&root);
        let cfg = if cfg_path.exists() {
            Config::load_from(&cfg_path)?
        } else {
            let cfg = Config::default();
            cfg.save_to(&cfg_path)?;
            cfg
        };
        Ok(Self { root, cfg })
    }

    pub fn init_repo(root: &Path) -> Result<PathBuf> {
        let cfg_path = Config::config_path(root);
        if !cfg_path.exists() {
            Config::default().save_to(&cfg_path)?;
            info!(path = %cfg_path.display(), "wrote default configuration");
        }
        Ok(cfg_path)
    }

    pub fn save(&self) -> Result<()> {
        self.cfg.save_to(&Config::config_path(&self.root))
    }

    pub fn allow(&mut self, job: &str) -> Result<bool> {
        let added = self.cfg.allow(job)?;
        self.save()?;
        Ok(added)
    }

    /// Replaces the allow list with operator text, one job per line, and
    /// switches allow-listing on. Nothing is saved when a line is malformed.
    pub fn set_allow_list(&mut self, text: &str) -> Result<usize> {
        let jobs = Config::parse_allow_list_text(text)?;
        let count = jobs.len();
        self.cfg.shutdown.allow_listed_jobs = jobs;
        self.cfg.shutdown.allow_listed_enabled = true;
        self.save()?;
        Ok(count)
    }

    pub fn disallow(&mut self, job: &str) -> Result<bool> {
        let removed = self.cfg.disallow(job);
        self.save()?;
        Ok(removed)
    }
}

/// Expands `~` and environment variables in a user-supplied path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    Ok(PathBuf::from(shellexpand::full(raw)?.into_owned()))
}
