use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use surge::alerts::{AlertConfig, AlertLoadTester};
use surge::{BreakpointReport, LoadTestConfig};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const BREAKPOINT_EXIT_CODE: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about = "Step-wise load tests with breakpoint detection")]
struct SurgeCli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ramp up alert POSTs against an ingestion endpoint
    Alerts(AlertArgs),
}

#[derive(Args, Debug)]
struct AlertArgs {
    #[arg(long)]
    endpoint: String,

    #[arg(long)]
    bearer_token: Option<String>,

    #[arg(long)]
    label: Option<String>,

    #[arg(long)]
    initial_concurrency: Option<usize>,

    #[arg(long)]
    step_increment: Option<usize>,

    #[arg(long)]
    max_concurrency: Option<usize>,

    #[arg(long)]
    requests_per_step: Option<usize>,

    #[arg(long)]
    max_consecutive_failures: Option<usize>,

    /// Pause between steps, e.g. `2s` or `500ms`
    #[arg(long, value_parser = humantime::parse_duration)]
    cooldown: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    request_timeout: Option<Duration>,

    #[arg(long)]
    class_id: Option<u32>,

    #[arg(long)]
    severity: Option<u8>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Exit with status 2 when a breakpoint is detected
    #[arg(long)]
    fail_on_breakpoint: bool,
}

impl AlertArgs {
    fn load_config(&self) -> LoadTestConfig {
        let mut config = AlertLoadTester::default_config();
        if let Some(label) = &self.label {
            config = config.label(label);
        }
        if let Some(n) = self.initial_concurrency {
            config = config.initial_concurrency(n);
        }
        if let Some(n) = self.step_increment {
            config = config.step_increment(n);
        }
        if let Some(n) = self.max_concurrency {
            config = config.max_concurrency(n);
        }
        if let Some(n) = self.requests_per_step {
            config = config.requests_per_step(n);
        }
        if let Some(n) = self.max_consecutive_failures {
            config = config.max_consecutive_failures(n);
        }
        if let Some(d) = self.cooldown {
            config = config.step_cooldown(d);
        }
        if let Some(d) = self.request_timeout {
            config = config.request_timeout(d);
        }
        config
    }

    fn alert_config(&self) -> AlertConfig {
        let mut alerts = AlertConfig::new(&self.endpoint);
        if let Some(id) = self.class_id {
            alerts = alerts.class_id(id);
        }
        if let Some(severity) = self.severity {
            alerts = alerts.severity(severity);
        }
        if let Some(token) = &self.bearer_token {
            alerts = alerts.bearer_token(token);
        }
        alerts
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("surge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = SurgeCli::parse();
    match cli.command {
        Command::Alerts(args) => run_alerts(args).await,
    }
}

async fn run_alerts(args: AlertArgs) -> anyhow::Result<ExitCode> {
    let tester = AlertLoadTester::new(args.alert_config(), args.load_config())
        .context("Unable to set up alert load test")?;

    let stop = tester.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current batch");
            stop.stop();
        }
    });

    info!("Targeting {}", args.endpoint);
    let report = tester.run().await;
    print_report(&report, args.json)?;

    if args.fail_on_breakpoint && report.detected() {
        Ok(ExitCode::from(BREAKPOINT_EXIT_CODE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_report(report: &BreakpointReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}
