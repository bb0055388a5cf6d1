mod aggregation;
mod config;
mod credits;
mod error;
mod logging;
mod models;
mod notify;
mod period;
mod query;
mod render;
mod service;
mod source;
mod suggestions;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{
    config_path, ensure_initialized, get_secret, load_config, load_credentials, mask, set_secret,
    webhook_url, AppConfig, OPTIONAL_SECRETS, REQUIRED_SECRETS,
};
use error::AppError;
use models::{BillingReport, PeriodKind};
use notify::WebhookSink;
use render::{alert_for, render, render_credit_analysis, render_diagnostics, render_json};
use service::BillingService;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "billing-monitor")]
#[command(about = "AWS cost, usage and credit burn reporting")]
struct Cli {
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    Report {
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        count: Option<u32>,
        #[arg(long)]
        no_notify: bool,
        #[arg(long)]
        json: bool,
    },
    Credits,
    Check,
    Diagnose,
    SetSecret {
        name: String,
        #[arg(long)]
        value: String,
    },
}

fn apply_overrides(
    cfg: &mut AppConfig,
    period: Option<&str>,
    count: Option<u32>,
) -> Result<(), AppError> {
    if let Some(raw) = period {
        cfg.billing.period_kind = PeriodKind::from_str(raw)?;
    }
    if let Some(count) = count {
        cfg.billing.period_count = count;
    }
    cfg.validate()
}

async fn publish(cfg: &AppConfig, report: &BillingReport, chat: &str) -> Result<(), AppError> {
    if !cfg.notifications.enabled {
        debug!("notifications disabled");
        return Ok(());
    }
    let Some(url) = webhook_url(cfg) else {
        info!("no webhook configured; skipping notification");
        return Ok(());
    };
    let sink = WebhookSink::new(url)?;

    match sink.deliver(chat).await {
        Ok(()) => info!(channel = %cfg.notifications.channel, "report sent"),
        Err(err) => warn!(error = %err, "report delivery failed"),
    }

    if cfg.notifications.alert_on_low_credit && report.status.needs_alert() {
        if let Some(alert) = alert_for(report) {
            match sink.send_alert(&alert).await {
                Ok(()) => info!(status = %report.status, "low credit alert sent"),
                Err(err) => warn!(error = %err, "alert delivery failed"),
            }
        }
    }
    Ok(())
}

fn secret_line(name: &str) -> String {
    match get_secret(name) {
        Some(value) => format!("  {name:<24} {}", mask(&value)),
        None => format!("  {name:<24} (not set)"),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized billing-monitor config at {}", config_path()?.display());
        }
        Commands::SetSecret { name, value } => {
            set_secret(&name, &value)?;
            println!("Secret '{}' stored.", name.trim().to_ascii_uppercase());
        }
        Commands::Report {
            period,
            count,
            no_notify,
            json,
        } => {
            let mut cfg = load_config()?;
            apply_overrides(&mut cfg, period.as_deref(), count)?;
            let credentials = load_credentials()?;

            let svc = BillingService::from_config(&cfg, credentials)?;
            let report = svc.generate_report(&cfg, Utc::now()).await?;
            let rendered = render(&report);

            if json {
                println!("{}", render_json(&report)?);
            } else {
                println!("{}", rendered.console);
            }

            if no_notify {
                debug!("notification suppressed by --no-notify");
            } else if let Err(err) = publish(&cfg, &report, &rendered.chat).await {
                warn!(error = %err, "notification skipped");
            }
        }
        Commands::Credits => {
            let mut cfg = load_config()?;
            apply_overrides(&mut cfg, None, None)?;
            let credentials = load_credentials()?;

            let svc = BillingService::from_config(&cfg, credentials)?;
            let analysis = svc.analyze_credits(&cfg, Utc::now()).await?;
            println!("{}", render_credit_analysis(&analysis));
        }
        Commands::Diagnose => {
            let cfg = load_config()?;
            cfg.validate()?;
            let credentials = load_credentials()?;

            let svc = BillingService::from_config(&cfg, credentials)?;
            let report = svc.diagnose(Utc::now()).await;
            println!("{}", render_diagnostics(&report));
        }
        Commands::Check => {
            println!("Required secrets:");
            for name in REQUIRED_SECRETS {
                println!("{}", secret_line(name));
            }
            println!("Optional secrets:");
            for name in OPTIONAL_SECRETS {
                println!("{}", secret_line(name));
            }

            let path = config_path()?;
            let validated = load_config().and_then(|cfg| cfg.validate().map(|_| cfg));
            match &validated {
                Ok(cfg) => {
                    println!("Config: {} (valid)", path.display());
                    println!("  endpoint: {}", cfg.cost_endpoint());
                }
                Err(err) => println!("Config: {} (invalid: {err})", path.display()),
            }

            load_credentials()?;
            validated?;
            println!("All required settings present.");
        }
    }

    Ok(())
}
