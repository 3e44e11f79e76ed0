//! Octopus bridge CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use octopus_bridge::{AppInfo, Engine, EngineOptions, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "octopus-bridge")]
#[command(about = "Run Rhai scripts through the Octopus script bridge", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate script files in order in one engine
    Run {
        /// Script files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Engine options file (YAML, TOML or JSON)
        #[arg(short, long, env = "OCTOPUS_BRIDGE_CONFIG")]
        config: Option<PathBuf>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    },

    /// Evaluate a single expression and print the result
    Eval {
        /// Script source
        expression: String,

        /// Engine options file (YAML, TOML or JSON)
        #[arg(short, long, env = "OCTOPUS_BRIDGE_CONFIG")]
        config: Option<PathBuf>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "warn")]
        log_level: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            files,
            config,
            log_level,
        } => {
            init_tracing(&log_level)?;
            let engine = build_engine(config.as_deref())?;

            let mut last = None;
            for file in &files {
                let source = std::fs::read_to_string(file)
                    .with_context(|| format!("Failed to read script {}", file.display()))?;
                let name = file.display().to_string();
                tracing::info!(script = %name, "Evaluating");
                last = Some(engine.evaluate(&source, Some(&name))?);
            }

            if let Some(value) = last {
                print_value(&value)?;
            }
            Ok(())
        }

        Commands::Eval {
            expression,
            config,
            log_level,
        } => {
            init_tracing(&log_level)?;
            let engine = build_engine(config.as_deref())?;
            let value = engine.evaluate(&expression, Some("<eval>"))?;
            print_value(&value)
        }

        Commands::Version => {
            println!("Octopus Script Bridge");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

fn build_engine(config: Option<&Path>) -> Result<Engine> {
    let options = match config {
        Some(path) => {
            tracing::info!("Config file: {}", path.display());
            EngineOptions::load(path)?
        }
        None => EngineOptions::default(),
    };

    let app_info = AppInfo::new("octopus-bridge", env!("CARGO_PKG_VERSION"))
        .with_application("octopus-cli", env!("CARGO_PKG_VERSION"));
    let engine = Engine::with_options(app_info, options)?;

    engine.set_event_callback("exit", |params| {
        let code = params
            .first()
            .and_then(|code| code.as_int().ok())
            .unwrap_or(0);
        tracing::info!(code, "Script requested exit");
        std::process::exit(code as i32);
    });
    Ok(engine)
}

fn print_value(value: &Value) -> Result<()> {
    if value.is_undefined() {
        return Ok(());
    }
    if value.is_object() || value.is_array() {
        println!("{}", serde_json::to_string_pretty(&value.to_json()?)?);
    } else {
        println!("{value}");
    }
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into()))
        .init();

    Ok(())
}
