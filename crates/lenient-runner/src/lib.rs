pub mod config;
pub mod runner;
pub mod scenario;

pub use config::*;
pub use runner::*;

#[cfg(test)]
mod config_tests {
    use super::*;
    use lenient_core::JobName;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());

        let mut cfg = Config::default();
        cfg.shutdown.shutdown_message = "Maintenance window".into();
        cfg.shutdown.allow_all_downstream_items = true;
        cfg.allow("ops/nightly-deploy").unwrap();
        cfg.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn save_rejects_malformed_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());

        let mut cfg = Config::default();
        cfg.shutdown.allow_listed_jobs.insert(JobName::from("ops/ "));
        assert!(cfg.save_to(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn load_rejects_hand_edited_bad_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[shutdown]\nallow_listed_jobs = [\"\"]\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lenient.toml");
        std::fs::write(&path, "[shutdown]\nallow_all_queued_items = true\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert!(cfg.shutdown.allow_all_queued_items);
        assert_eq!(cfg.shutdown.shutdown_message, lenient_core::DEFAULT_SHUTDOWN_MESSAGE);
    }

    #[test]
    fn runner_persists_allow_list_changes() {
        let dir = tempfile::tempdir().unwrap();
        Runner::init_repo(dir.path()).unwrap();

        let mut runner = Runner::open(dir.path().to_path_buf()).unwrap();
        assert!(runner.allow("ops/nightly-deploy").unwrap());

        let reopened = Runner::open(dir.path().to_path_buf()).unwrap();
        assert!(reopened.cfg.shutdown.is_allow_listed(&JobName::from("ops/nightly-deploy")));

        let mut reopened = reopened;
        assert!(reopened.disallow("ops/nightly-deploy").unwrap());
        assert!(!reopened.disallow("ops/nightly-deploy").unwrap());
    }

    #[test]
    fn allow_list_text_replaces_whole_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Runner::open(dir.path().to_path_buf()).unwrap();
        runner.allow("old/job").unwrap();

        assert_eq!(runner.set_allow_list("ops/nightly-deploy\r\n\r\nrelease/tag\n").unwrap(), 2);
        let reopened = Runner::open(dir.path().to_path_buf()).unwrap();
        let jobs: Vec<_> = reopened.cfg.shutdown.allow_listed_jobs.iter().map(JobName::as_str).collect();
        assert_eq!(jobs, vec!["ops/nightly-deploy", "release/tag"]);

        assert!(runner.set_allow_list("fine/job\n bad/job").is_err());
        let unchanged = Runner::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(unchanged.cfg.shutdown.allow_listed_jobs.len(), 2);
    }
}
