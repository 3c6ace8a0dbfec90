//! Fraudline CLI
//!
//! Command-line interface for fraud-alert triage and its evaluation harness.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use fl_actions::ActionExecutor;
use fl_connectors::{
    ActionService, AlertSource, CachedAlertSource, DecisionService, HttpActionService,
    HttpAlertSource, HttpDecisionService,
};
use fl_core::{AlertStatus, RiskScore, TriageOutcome, TriageRequest};
use fl_evals::{DirectoryFixtures, EvalReport, EvaluationHarness};
use fl_observability::{
    init_logging_with_config, LoggingConfig, MetricsSink, ACTIONS_EXECUTED_TOTAL,
    ACTION_BLOCKED_TOTAL, AGENT_FALLBACK_TOTAL, RATE_LIMIT_BLOCK_TOTAL,
};
use fl_policy::{load_policy, PolicyConfig};
use fl_triage::TriageClient;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod demo;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "fraudline")]
#[command(version)]
#[command(about = "Fraud-alert triage orchestration and evaluation", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "config/fraudline.yaml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation harness
    Eval {
        /// Use the in-process demo services instead of the configured endpoint
        #[arg(long)]
        demo: bool,

        /// Directory of golden case files
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Where to write the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pause between cases in milliseconds
        #[arg(long)]
        case_delay_ms: Option<u64>,

        /// Skip the burst and leak probes
        #[arg(long)]
        no_probes: bool,
    },

    /// Triage a single alert
    Triage {
        /// Customer id
        #[arg(long)]
        customer: String,

        /// Suspect transaction id
        #[arg(long)]
        txn: Option<String>,

        /// Alert type
        #[arg(long)]
        alert_type: Option<String>,

        /// Free-text message from the customer
        #[arg(short, long, default_value = "")]
        message: String,

        /// One-time password for step-up actions
        #[arg(long)]
        otp: Option<String>,

        /// Use the in-process demo services
        #[arg(long)]
        demo: bool,
    },

    /// List alerts in the queue
    Alerts {
        /// Filter by status (open, in_review, resolved)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show current configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            if cli.verbose {
                eprintln!("Using default configuration ({:#})", e);
            }
            AppConfig::default()
        }
    };

    let mut logging = LoggingConfig::from_settings(&config.logging);
    if cli.verbose {
        logging.level = tracing::Level::DEBUG;
    }
    if let Err(e) = init_logging_with_config(logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Eval {
            demo,
            fixtures,
            output,
            case_delay_ms,
            no_probes,
        } => cmd_eval(config, demo, fixtures, output, case_delay_ms, no_probes, cli.format).await,
        Commands::Triage {
            customer,
            txn,
            alert_type,
            message,
            otp,
            demo,
        } => {
            let request = TriageRequest {
                customer_id: customer,
                suspect_txn_id: txn,
                alert_type,
                user_message: message,
            };
            cmd_triage(config, request, otp, demo, cli.format).await
        }
        Commands::Alerts { status } => cmd_alerts(config, status, cli.format).await,
        Commands::Config { show_secrets } => cmd_config(config, show_secrets, cli.format),
    }
}

/// Wires a triage client against the configured or demo services.
async fn build_client(config: &AppConfig, demo: bool) -> Result<TriageClient> {
    let policy = match &config.policy_file {
        Some(path) => load_policy(path)
            .with_context(|| format!("Failed to load policy file: {}", path.display()))?,
        None => PolicyConfig::default(),
    };

    let (decision, actions): (Arc<dyn DecisionService>, Arc<dyn ActionService>) = if demo {
        (
            Arc::new(demo::decision_service().await),
            Arc::new(demo::action_service()),
        )
    } else {
        (
            Arc::new(HttpDecisionService::new(config.service.connector("decision"))?),
            Arc::new(HttpActionService::new(config.service.connector("actions"))?),
        )
    };

    let metrics = MetricsSink::new();
    let executor = Arc::new(ActionExecutor::new(actions, metrics.clone()));
    Ok(TriageClient::new(decision, metrics)
        .with_executor(executor)
        .with_redactor(policy.redactor()?)
        .with_annotator(policy.annotator())
        .with_config(config.triage.clone()))
}

async fn cmd_eval(
    config: AppConfig,
    demo: bool,
    fixtures: Option<PathBuf>,
    output: Option<PathBuf>,
    case_delay_ms: Option<u64>,
    no_probes: bool,
    format: OutputFormat,
) -> Result<()> {
    let fixtures_dir = fixtures.unwrap_or_else(|| config.evals.fixtures_dir.clone());
    let report_path = output.unwrap_or_else(|| config.evals.report_path.clone());
    let mut harness_config = config.evals.harness.clone();
    if let Some(delay) = case_delay_ms {
        harness_config.case_delay_ms = delay;
    }
    if no_probes {
        harness_config.run_probes = false;
    }

    let client = Arc::new(build_client(&config, demo).await?);

    if format == OutputFormat::Text {
        println!(
            "{} {}",
            "Running evaluation cases from".cyan(),
            fixtures_dir.display()
        );
    }

    let mut harness = EvaluationHarness::new(client.clone(), DirectoryFixtures::new(fixtures_dir))
        .with_config(harness_config);
    let report = harness.run().await?;
    report.save(&report_path).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        print_counters(client.metrics()).await;
        println!("\nReport saved to {}", report_path.display());
    }
    client.metrics().shutdown().await;

    if !report.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &EvalReport) {
    println!();
    println!("{}", "Evaluation Report".bold());
    println!("─────────────────");
    for line in report.render_text().lines().skip(1) {
        if line.contains("[PASS]") {
            println!("{}", line.green());
        } else if line.contains("[FAIL]") {
            println!("{}", line.red());
        } else {
            println!("{}", line);
        }
    }

    let verdict = if report.all_passed() {
        "All cases and probes passed".green().bold()
    } else {
        "Some cases or probes failed".red().bold()
    };
    println!("{}", verdict);
}

async fn print_counters(metrics: &MetricsSink) {
    let snapshot = metrics.snapshot().await;
    println!();
    println!("{}", "Counters".bold());
    for name in [
        AGENT_FALLBACK_TOTAL,
        RATE_LIMIT_BLOCK_TOTAL,
        ACTION_BLOCKED_TOTAL,
        ACTIONS_EXECUTED_TOTAL,
    ] {
        println!("  {:<40} {}", name, snapshot.total(name));
    }
}

async fn cmd_triage(
    config: AppConfig,
    request: TriageRequest,
    otp: Option<String>,
    demo: bool,
    format: OutputFormat,
) -> Result<()> {
    let client = build_client(&config, demo).await?;
    let outcome = client.submit_with_guidance(&request, otp.as_deref()).await;
    client.metrics().shutdown().await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &TriageOutcome) {
    let decision = &outcome.decision;
    let risk = match decision.risk_score {
        RiskScore::High => decision.risk_score.as_str().red(),
        RiskScore::Medium => decision.risk_score.as_str().yellow(),
        RiskScore::Low => decision.risk_score.as_str().green(),
    };

    println!("{}", "Triage Outcome".bold());
    println!("──────────────");
    println!("  {} {}", "Risk:".cyan(), risk);
    println!("  {} {}", "Action:".cyan(), decision.recommended_action);
    println!("  {} {}", "Reasons:".cyan(), decision.reasons.join(", "));
    println!("  {} {}", "State:".cyan(), outcome.state);
    if decision.requires_otp {
        println!("  {} yes", "Requires OTP:".cyan());
    }
    if decision.fallback_used {
        println!("  {}", "Fallback decision".yellow());
    }
    if let Some(result) = &outcome.action_result {
        print!("  {} {} {}", "Result:".cyan(), result.action_type, result.status);
        if let Some(case_id) = &result.case_id {
            print!(" ({})", case_id);
        }
        println!();
    }
    if let Some(citation) = &outcome.citation {
        println!("  {} {} [{}]", "See:".cyan(), citation.title, citation.anchor);
    }
    println!();
    println!("{}", outcome.message);
}

fn parse_status(input: &str) -> Result<AlertStatus> {
    [AlertStatus::Open, AlertStatus::InReview, AlertStatus::Resolved]
        .into_iter()
        .find(|status| status.as_str() == input)
        .with_context(|| format!("Unknown alert status: {}", input))
}

async fn cmd_alerts(config: AppConfig, status: Option<String>, format: OutputFormat) -> Result<()> {
    let status = status.as_deref().map(parse_status).transpose()?;
    let source = CachedAlertSource::new(
        HttpAlertSource::new(config.service.connector("alerts"))?,
        config.alerts.clone(),
    );

    let alerts = match source.list_alerts(status).await {
        Ok(alerts) => alerts,
        Err(e) => bail!("Failed to list alerts from {}: {}", config.service.base_url, e),
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    println!("{}", "Alerts".bold());
    println!("──────");
    if alerts.is_empty() {
        println!("No alerts found");
    }
    for alert in &alerts {
        let risk = alert
            .risk_score
            .map(|risk| risk.as_str())
            .unwrap_or("-");
        println!(
            "  {} [{}] {} {} {} ({})",
            alert.id.cyan(),
            risk,
            alert.status.as_str(),
            alert.customer_id,
            alert.alert_type,
            alert.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        println!("{}", "Current Configuration".bold());
        println!("─────────────────────────");
        print!("{}", serde_yaml::to_string(&display_config)?);
    }
    Ok(())
}
