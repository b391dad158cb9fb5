//! Toolgate CLI - status surface of the resilience layer
//!
//! Status commands report the collector and breakers of the CLI process
//! itself, which start empty; they are not a view into a running service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use toolgate::error::{ErrorCode, FixSuggestion, ToolgateError};
use toolgate::logging::init_tracing;
use toolgate::{ErrorSanitizer, ResilienceContext, SanitizationLevel, ToolgateConfig};

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Toolgate - resilience status for the document tools gateway")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/toolgate/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Health score of this process's collector (empty in a fresh CLI run)
    Health,

    /// Error/request summary of this process over a time window
    Summary {
        /// Window in seconds
        #[arg(short, long, default_value_t = 3600)]
        window: u64,
    },

    /// State of every configured circuit breaker in this process
    Circuits,

    /// Bucketed error trends of this process
    Trends {
        /// Window in seconds
        #[arg(short, long, default_value_t = 3600)]
        window: u64,

        /// Bucket size in seconds
        #[arg(short, long, default_value_t = 300)]
        bucket: u64,
    },

    /// Write this process's summary, trends and recent entries to a JSON file
    Export {
        /// Output file
        path: PathBuf,

        /// Window in seconds
        #[arg(short, long, default_value_t = 3600)]
        window: u64,
    },

    /// Print the resolved configuration
    Config,

    /// Show the client-safe payload for a raw error message
    Sanitize {
        message: String,

        /// development, staging or production
        #[arg(short, long, default_value = "production")]
        level: String,

        /// Taxonomy code, e.g. API_TIMEOUT
        #[arg(long)]
        code: Option<String>,
    },
}

fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e
            .downcast_ref::<ToolgateError>()
            .and_then(|err| err.fix_suggestion())
        {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ToolgateConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging)?;

    let ctx = ResilienceContext::from_config(&config);

    let value = match cli.command {
        Commands::Health => ctx.health_json()?,
        Commands::Summary { window } => ctx.metrics_summary_json(Duration::from_secs(window))?,
        Commands::Circuits => ctx.circuit_status_json()?,
        Commands::Trends { window, bucket } => {
            ctx.error_trends_json(Duration::from_secs(window), Duration::from_secs(bucket))?
        }
        Commands::Export { path, window } => {
            ctx.metrics()
                .export_metrics(&path, Duration::from_secs(window))
                .with_context(|| format!("exporting metrics to {}", path.display()))?;
            println!("{} Metrics written to {}", "✓".green(), path.display());
            return Ok(());
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }
        Commands::Sanitize {
            message,
            level,
            code,
        } => {
            let level: SanitizationLevel = level.parse()?;
            let code = code
                .map(|c| {
                    serde_json::from_value::<ErrorCode>(serde_json::Value::String(c.clone()))
                        .with_context(|| format!("unknown error code '{c}'"))
                })
                .transpose()?;
            serde_json::to_value(ErrorSanitizer::new(level).safe_response(&message, code))?
        }
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
