//! ProfileSweep CLI
//!
//! Subcommands: `list` (inventory profiles across hosts) and `delete`
//! (remove named profiles or sweep all deletable profiles on a host).
//! Reports go to stdout, tracing output to stderr, so piped output stays
//! clean.

use clap::{Parser, Subcommand};
use profilesweep::core::{ExclusionSet, InventoryReport, Selection, SweepReport, Target};
use profilesweep::normalize::normalize_username_list;
use std::collections::HashSet;
use std::error::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "profilesweep")]
#[command(version)]
#[command(about = "Inventory and remove per-user Windows profiles across hosts")]
struct Cli {
    /// Maximum simultaneously in-flight tasks
    #[arg(long, global = true, default_value_t = profilesweep::constants::DEFAULT_WORKER_LIMIT)]
    limit: usize,

    /// Emit the report as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List profiles on one or more hosts (default: the local host)
    List {
        /// Hosts to inventory; "." and "localhost" mean the local host
        targets: Vec<String>,

        /// Username to omit from the listing (repeatable)
        #[arg(long = "exclude", value_name = "USER")]
        exclude: Vec<String>,
    },
    /// Delete profiles on a host
    Delete {
        /// Host to operate on
        target: String,

        /// Explicit username to delete (repeatable)
        #[arg(long = "user", value_name = "USER", conflicts_with = "all")]
        users: Vec<String>,

        /// Delete every deletable profile on the target
        #[arg(long)]
        all: bool,

        /// Username protected from --all (repeatable)
        #[arg(long = "exclude", value_name = "USER")]
        exclude: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            eprintln!("error: {}", err);
            2
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32, Box<dyn Error>> {
    let orchestrator = build_orchestrator(cli.limit)?;

    match cli.command {
        Commands::List { targets, exclude } => {
            let targets = parse_targets(&targets)?;
            let exclusions = ExclusionSet::new(normalize_username_list(exclude)?);
            let report = orchestrator.enumerate(&targets, &exclusions).await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_inventory(&report);
            }
            Ok(if report.failure_count() > 0 { 1 } else { 0 })
        }
        Commands::Delete {
            target,
            users,
            all,
            exclude,
        } => {
            if !all && users.is_empty() {
                return Err("specify --user at least once, or --all".into());
            }
            if !all && !exclude.is_empty() {
                // Exclusions protect the bulk sweep only; explicit names
                // always proceed to the loaded/existence checks.
                tracing::warn!("--exclude has no effect without --all");
            }

            let target = Target::parse(&target)?;
            let selection = if all {
                Selection::All {
                    exclusions: ExclusionSet::new(normalize_username_list(exclude)?),
                }
            } else {
                Selection::Named(normalize_username_list(users)?)
            };

            let report = orchestrator.sweep(&[target], &selection).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_sweep(&report);
            }
            Ok(if report.summary.failed > 0 { 1 } else { 0 })
        }
    }
}

#[cfg(windows)]
fn build_orchestrator(limit: usize) -> Result<profilesweep::Orchestrator, Box<dyn Error>> {
    use profilesweep::core::{Connector, WorkerPool};
    use profilesweep::platform::{PowerShellConnector, PowerShellPrerequisite};
    use std::sync::Arc;

    let connector: Arc<dyn Connector> = Arc::new(PowerShellConnector::new(credentials_from_env()?));
    Ok(profilesweep::Orchestrator::new(
        connector,
        WorkerPool::new(limit),
        &PowerShellPrerequisite,
    )?)
}

#[cfg(not(windows))]
fn build_orchestrator(_limit: usize) -> Result<profilesweep::Orchestrator, Box<dyn Error>> {
    Err("a Windows operator host with powershell.exe is required".into())
}

/// Credentials come from the environment, never from argv, so they are not
/// visible in process listings. Both variables or neither must be set.
#[cfg(windows)]
fn credentials_from_env() -> Result<Option<profilesweep::Credentials>, Box<dyn Error>> {
    use profilesweep::{Credentials, SecureString, Username};

    let username = std::env::var("PROFILESWEEP_USERNAME").ok();
    let password = std::env::var("PROFILESWEEP_PASSWORD").ok();
    match (username, password) {
        (Some(user), Some(pass)) => Ok(Some(Credentials::new(
            Username::new(user)?,
            SecureString::new(pass),
        ))),
        (None, None) => Ok(None),
        _ => Err("set both PROFILESWEEP_USERNAME and PROFILESWEEP_PASSWORD, or neither".into()),
    }
}

/// Parse hosts, defaulting to the local host, de-duplicating while keeping
/// first occurrence.
fn parse_targets(raw: &[String]) -> Result<Vec<Target>, Box<dyn Error>> {
    if raw.is_empty() {
        return Ok(vec![Target::Local]);
    }

    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for input in raw {
        let target = Target::parse(input)?;
        if seen.insert(target.as_str().to_string()) {
            targets.push(target);
        }
    }
    Ok(targets)
}

fn render_inventory(report: &InventoryReport) {
    for listing in &report.listings {
        println!("== {} ==", listing.target);

        if let Some(note) = &listing.note {
            println!("{}", note.message);
            println!();
            continue;
        }

        let user_width = listing
            .profiles
            .iter()
            .map(|p| p.user_name.len())
            .max()
            .unwrap_or(4)
            .max(4);
        println!(
            "{:<user_width$}  {:<6}  {:<20}  {:<12}  PATH",
            "USER", "LOADED", "LAST USED", "IDLE"
        );
        for row in &listing.profiles {
            let last_used = row
                .last_used
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!(
                "{:<user_width$}  {:<6}  {:<20}  {:<12}  {}",
                row.user_name,
                if row.loaded { "yes" } else { "no" },
                last_used,
                row.idle.to_string(),
                row.local_path
            );
        }
        println!();
    }
}

fn render_sweep(report: &SweepReport) {
    use profilesweep::core::Outcome;

    for row in &report.results {
        let label = match row.outcome {
            Outcome::Success => "ok    ",
            Outcome::Denied => "denied",
            Outcome::Failure => "FAILED",
        };
        println!("{} {}", label, row);
    }
    println!();
    println!("{}", report.summary);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn list_parses_targets_and_exclusions() {
        let cli = Cli::try_parse_from([
            "profilesweep",
            "list",
            "fs01",
            "fs02",
            "--exclude",
            "admin",
            "--exclude",
            "svc_backup",
        ])
        .expect("valid invocation");

        match cli.command {
            Commands::List { targets, exclude } => {
                assert_eq!(targets, vec!["fs01".to_string(), "fs02".to_string()]);
                assert_eq!(exclude.len(), 2);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn delete_rejects_user_combined_with_all() {
        let result = Cli::try_parse_from([
            "profilesweep",
            "delete",
            "fs01",
            "--user",
            "alice",
            "--all",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["profilesweep", "list", "--json", "--limit", "10"])
            .expect("valid invocation");
        assert!(cli.json);
        assert_eq!(cli.limit, 10);
    }

    #[test]
    fn parse_targets_defaults_to_local() {
        let targets = parse_targets(&[]).expect("default");
        assert_eq!(targets, vec![Target::Local]);
    }

    #[test]
    fn parse_targets_dedupes_canonical_names() {
        let raw = vec![
            "fs01".to_string(),
            "FS01".to_string(),
            "localhost".to_string(),
            ".".to_string(),
        ];
        let targets = parse_targets(&raw).expect("valid hosts");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].as_str(), "FS01");
        assert!(targets[1].is_local());
    }

    #[test]
    fn parse_targets_rejects_blank_host() {
        assert!(parse_targets(&["   ".to_string()]).is_err());
    }
}
