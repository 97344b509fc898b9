use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lenient_runner::scenario::{simulate_file, ScenarioResult};
use lenient_runner::{expand_path, Config, Runner};

#[derive(Parser)]
#[command(name = "lenient", version)]
struct Cli {
    /// Project root holding `.lenient/` (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .lenient/lenient.toml with default settings
    Init,

    /// Print the active shutdown settings
    Config,

    /// Edit the allow list
    Allow {
        #[command(subcommand)]
        cmd: AllowCommand,
    },

    /// Replay a scenario file and compare verdicts with its expectations
    Simulate {
        file: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AllowCommand {
    /// Add a full job name, e.g. `ops/nightly-deploy`
    Add { job: String },
    Remove { job: String },
    /// Replace the whole list from a file with one job name per line
    Set {
        #[arg(long)]
        file: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let root = match &cli.root {
        Some(raw) => expand_path(raw)?,
        None => std::env::current_dir()?,
    };

    match cli.cmd {
        Command::Init => {
            let path = Runner::init_repo(&root)?;
            println!("Initialized lenient shutdown settings at {}", path.display());
        }
        Command::Config => {
            let r = Runner::open(root)?;
            print_config(&r.cfg, &Config::config_path(&r.root));
        }
        Command::Allow { cmd } => {
            let mut r = Runner::open(root)?;
            match cmd {
                AllowCommand::Add { job } => {
                    if r.allow(&job)? {
                        println!("Allow-listed {job}");
                    } else {
                        println!("{job} was already allow-listed");
                    }
                }
                AllowCommand::Remove { job } => {
                    if r.disallow(&job)? {
                        println!("Removed {job} from the allow list");
                    } else {
                        println!("{job} was not allow-listed");
                    }
                }
                AllowCommand::Set { file } => {
                    let path = resolve(&r.root, &file)?;
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("read allow list: {}", path.display()))?;
                    let count = r.set_allow_list(&text)?;
                    println!("Allow list replaced with {count} job(s)");
                }
            }
        }
        Command::Simulate { file, json } => {
            let path = resolve(&root, &file)?;
            tracing::info!(path = %path.display(), "replaying scenario");
            let res = simulate_file(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&res)?);
            } else {
                print_result(&res);
            }
            if !res.passed() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn resolve(root: &std::path::Path, raw: &str) -> anyhow::Result<PathBuf> {
    let path = expand_path(raw)?;
    Ok(if path.is_absolute() { path } else { root.join(path) })
}

fn print_config(cfg: &Config, path: &std::path::Path) {
    let s = &cfg.shutdown;
    println!("Settings: {}", path.display());
    println!("Message: {}", s.shutdown_message);
    println!("Allow all queued items: {}", s.allow_all_queued_items);
    println!("Allow all downstream items: {}", s.allow_all_downstream_items);
    println!("Allow list enabled: {}", s.allow_listed_enabled);
    for job in &s.allow_listed_jobs {
        println!("- {job}");
    }
}

fn print_result(res: &ScenarioResult) {
    println!("Scenario: {}", res.name);
    for step in &res.steps {
        let mark = if step.matches() { "ok" } else { "MISMATCH" };
        let expected = step.expected.map(|e| format!(" (expected {e:?})")).unwrap_or_default();
        let reason = step.reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default();
        println!("{:>3} {:<8} {} -> {:?}{expected}{reason}", step.index, mark, step.step, step.actual);
    }
    for row in &res.registry {
        println!("    {} {:?}", row.id, row.record);
    }
    println!("{} step(s), {} mismatch(es)", res.steps.len(), res.mismatches().len());
}
