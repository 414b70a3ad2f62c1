//! LLM-Guardian Main Binary
//!
//! Drives the quality and health control engine from the command line:
//! - Replay: feed a JSON-lines event stream through all components
//! - Drift: compare a production sample against a reference sample
//! - Heal: run one self-healing tick for a health signal
//! - Status: print the effective configuration

mod engine;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::{Guardian, Output};
use llm_guardian_core::config::GuardianConfig;
use llm_guardian_detection::DriftMonitor;
use llm_guardian_healing::{HealthSignal, SelfHealingSystem};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// LLM-Guardian CLI arguments
#[derive(Debug, Parser)]
#[clap(name = "guardian", version, about = "Quality and health control for LLM pipelines")]
struct Cli {
    /// Configuration file path (YAML). Defaults plus GUARDIAN_* env vars when omitted.
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[clap(long, env = "GUARDIAN_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[clap(long, env = "GUARDIAN_LOG_JSON", global = true)]
    log_json: bool,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

/// Available subcommands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a JSON-lines event stream through the engine
    Replay {
        /// Event file, one JSON event per line
        #[clap(long)]
        input: PathBuf,

        /// Print outputs as JSON lines instead of a summary
        #[clap(long)]
        json: bool,

        /// Stop at the first rejected event
        #[clap(long)]
        fail_fast: bool,
    },
    /// Compare two samples for distribution drift
    Drift {
        /// JSON array of production values
        #[clap(long)]
        production: PathBuf,

        /// JSON array of reference values
        #[clap(long)]
        reference: PathBuf,
    },
    /// Run one self-healing tick
    Heal {
        /// Health signal as inline JSON; omitted fields take healthy defaults
        #[clap(long)]
        signal: String,
    },
    /// Print the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    info!("Starting LLM-Guardian v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            input,
            json,
            fail_fast,
        } => run_replay_command(config, &input, json, fail_fast).await,
        Commands::Drift {
            production,
            reference,
        } => run_drift_command(config, &production, &reference).await,
        Commands::Heal { signal } => run_heal_command(config, &signal),
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<GuardianConfig> {
    match path {
        Some(path) => GuardianConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => GuardianConfig::from_env().context("Invalid configuration from environment"),
    }
}

/// Run the replay subcommand
async fn run_replay_command(
    config: GuardianConfig,
    input: &Path,
    json_output: bool,
    fail_fast: bool,
) -> Result<()> {
    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open event file {}", input.display()))?;
    let mut lines = BufReader::new(file).lines();

    let guardian = Guardian::new(config);
    let mut line_no = 0usize;
    let mut rejected = 0usize;
    let mut outputs = Vec::new();

    while let Some(line) = lines.next_line().await.context("Failed to read event file")? {
        line_no += 1;
        match guardian.handle_line(&line) {
            Ok(Some(output)) => {
                if json_output {
                    println!("{}", serde_json::to_string(&output)?);
                }
                outputs.push(output);
            }
            Ok(None) => {}
            Err(e) if !fail_fast => {
                rejected += 1;
                warn!(line = line_no, error = %format!("{:#}", e), "Rejected event");
            }
            Err(e) => return Err(e.context(format!("line {}", line_no))),
        }
    }

    info!(
        events = line_no,
        outputs = outputs.len(),
        rejected,
        "Replay complete"
    );

    if json_output {
        println!("{}", serde_json::to_string(&guardian.status())?);
    } else {
        print_replay_summary(&guardian, &outputs, line_no, rejected);
    }

    Ok(())
}

fn print_replay_summary(guardian: &Guardian, outputs: &[Output], events: usize, rejected: usize) {
    println!("\n{}", "=".repeat(70));
    println!("REPLAY SUMMARY");
    println!("{}", "=".repeat(70));
    println!("Events:          {}", events);
    println!("Rejected:        {}", rejected);
    println!();

    for output in outputs {
        match output {
            Output::Alert(alert) => println!(
                "ALERT       {:<22} value={:<10.4} z={:<8.2} {}",
                alert.metric_name, alert.current_value, alert.z_score, alert.severity
            ),
            Output::Drift(report) => println!(
                "DRIFT       kl={:<8.4} psi={:<8.4} detected={} severity={}",
                report.kl_divergence, report.psi, report.drift_detected, report.severity
            ),
            Output::Assignment {
                experiment_id,
                user_id,
                variant,
            } => println!("ASSIGN      {:<22} {:<16} {}", experiment_id, user_id, variant),
            Output::ExperimentResult(result) => println!(
                "EXPERIMENT  {:<22} p={:<10.6} d={:<8.4} lift={:>7.2}% {}",
                result.experiment_id,
                result.p_value,
                result.cohens_d,
                result.improvement_pct,
                result.decision
            ),
            Output::Remediation(record) => println!(
                "REMEDIATE   {:<22} {:?}",
                record.issue.map(|i| i.as_str()).unwrap_or("none"),
                record.actions_taken
            ),
        }
    }

    let status = guardian.status();
    println!();
    println!("STATUS:");
    println!("  Metrics tracked:   {}", status.tracked_metrics.len());
    println!("  Observations:      {}", status.detector.observations);
    println!("  Alerts raised:     {}", status.detector.alerts_raised);
    println!("  Drift reports:     {}", status.drift_reports_retained);
    println!(
        "  Experiments:       {} ({} running, {} concluded)",
        status.experiments.experiments, status.experiments.running, status.experiments.concluded
    );
    println!("  Scale factor:      {}", status.healing.scale_factor);
    println!("  Cache TTL x:       {:.2}", status.healing.cache_ttl_multiplier);
    println!("  Routing mode:      {}", status.healing.routing_mode);
    println!("{}", "=".repeat(70));
}

async fn read_sample(path: &Path) -> Result<Vec<f64>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
}

/// Run the drift subcommand
async fn run_drift_command(config: GuardianConfig, production: &Path, reference: &Path) -> Result<()> {
    let production = read_sample(production).await?;
    let reference = read_sample(reference).await?;

    let monitor = DriftMonitor::new(config.drift);
    let report = monitor
        .detect_drift(&production, &reference)
        .context("Drift detection failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Run the heal subcommand
fn run_heal_command(config: GuardianConfig, signal: &str) -> Result<()> {
    let signal: HealthSignal =
        serde_json::from_str(signal).context("Failed to parse health signal JSON")?;

    let system = SelfHealingSystem::new(config.healing);
    let record = system.monitor_and_heal(&signal);

    println!("{}", serde_json::to_string_pretty(&record)?);
    println!("{}", serde_json::to_string_pretty(&system.get_status())?);
    Ok(())
}

/// Initialize logging
fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    // logs go to stderr so stdout stays machine-readable
    if cli.log_json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .with(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(log_level.into()),
            )
            .init();
    }

    info!("Logging initialized at level: {}", log_level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "guardian",
            "--log-level",
            "debug",
            "replay",
            "--input",
            "events.jsonl",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Replay { input, json, fail_fast } => {
                assert_eq!(input, PathBuf::from("events.jsonl"));
                assert!(json);
                assert!(!fail_fast);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["guardian"]).is_err());
    }

    #[test]
    fn test_load_config_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "anomaly:\n  min_data_points: 3\ndrift:\n  n_bins: 20").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.anomaly.min_data_points, 3);
        assert_eq!(config.drift.n_bins, 20);
    }

    #[test]
    fn test_load_config_missing_file_is_error() {
        let err = load_config(Some(Path::new("/nonexistent/guardian.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to load configuration"));
    }

    #[tokio::test]
    async fn test_replay_skips_bad_lines_unless_fail_fast() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for _ in 0..12 {
            writeln!(file, r#"{{"type": "observation", "metric": "latency_p95_ms", "value": 200}}"#).unwrap();
        }
        writeln!(file, r#"{{"type": "observation", "metric": "latency_p95_ms", "value": 900}}"#).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, r#"{{"type": "health_signal", "cache_hit_rate": 0.1}}"#).unwrap();

        run_replay_command(GuardianConfig::default(), file.path(), true, false)
            .await
            .unwrap();
        let result = run_replay_command(GuardianConfig::default(), file.path(), true, true).await;
        assert!(result.is_err());
    }
}
