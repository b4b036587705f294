mod config;
mod logging;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rcaflow_storage::conformance::run_conformance_suite;
use rcaflow_storage::MemoryStorage;

use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Failure investigation service.
#[derive(Parser)]
#[command(name = "rcaflow", version, about = "Failure investigation and RCA workflow service")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides the config file and RCAFLOW_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to the TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the storage conformance suite against the in-memory backend
    Conformance,

    /// Validate a configuration file without starting anything
    CheckConfig {
        /// Path to the TOML configuration file
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => cmd_serve(port, config.as_deref()),
        Commands::Conformance => cmd_conformance(cli.output),
        Commands::CheckConfig { config } => cmd_check_config(&config, cli.output),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        }
    }
}

fn cmd_serve(port: Option<u16>, path: Option<&Path>) {
    let mut config = match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("error: {e}");
        }
        process::exit(1);
    }

    logging::init(&config.logging);

    if let Err(e) = runtime().block_on(serve::start_server(&config)) {
        tracing::error!(error = %e, "server error");
        eprintln!("Server error: {e}");
        process::exit(1);
    }
}

fn cmd_conformance(output: OutputFormat) {
    let report = runtime().block_on(run_conformance_suite(|| async { MemoryStorage::new() }));

    match output {
        OutputFormat::Text => print!("{report}"),
        OutputFormat::Json => {
            let failures: Vec<serde_json::Value> = report
                .results
                .iter()
                .filter(|r| !r.passed)
                .map(|r| {
                    serde_json::json!({
                        "category": r.category,
                        "name": r.name,
                        "message": r.message,
                    })
                })
                .collect();
            let json = serde_json::json!({
                "passed": report.passed,
                "failed": report.failed,
                "total": report.total,
                "failures": failures,
            });
            println!("{json}");
        }
    }

    if !report.is_success() {
        process::exit(1);
    }
}

fn cmd_check_config(path: &Path, output: OutputFormat) {
    let errors = match Config::read(path) {
        Ok(config) => config.validate().err().unwrap_or_default(),
        Err(e) => vec![e.to_string()],
    };

    match output {
        OutputFormat::Text if errors.is_empty() => println!("{}: ok", path.display()),
        OutputFormat::Text => {
            for e in &errors {
                eprintln!("{}: {e}", path.display());
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "path": path.display().to_string(),
                "valid": errors.is_empty(),
                "errors": errors,
            });
            println!("{json}");
        }
    }

    if !errors.is_empty() {
        process::exit(1);
    }
}
