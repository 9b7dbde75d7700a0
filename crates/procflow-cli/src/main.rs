mod cmd;
mod output;

use clap::{Parser, Subcommand};
use procflow_core::config::{Config, WarnLevel};
use procflow_core::{ErrorKind, ProcflowError};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "procflow",
    about = "Business process discovery and analysis: parse, map, find gaps, measure and prioritize",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file (defaults are used when omitted)
    #[arg(long, global = true, env = "PROCFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a document, URL, image or transcript into a process document
    Parse(cmd::parse::ParseArgs),

    /// Render a process document as a Mermaid diagram
    Map(cmd::map::MapArgs),

    /// Find missing or inconsistent information in a process document
    Gaps(cmd::gaps::GapsArgs),

    /// Compute cycle time, bottlenecks and waste
    Efficiency(cmd::efficiency::EfficiencyArgs),

    /// Diff a current and a proposed process
    Compare(cmd::compare::CompareArgs),

    /// Score and rank improvements from a gap report
    Prioritize(cmd::prioritize::PrioritizeArgs),

    /// Check a process document against the schema
    Validate(cmd::validate::ValidateArgs),

    /// Report which optional external tools are available
    Capabilities(cmd::capabilities::CapabilitiesArgs),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Parse(args) => cmd::parse::run(args, &config),
        Commands::Map(args) => cmd::map::run(args, &config),
        Commands::Gaps(args) => cmd::gaps::run(args, &config),
        Commands::Efficiency(args) => cmd::efficiency::run(args, &config),
        Commands::Compare(args) => cmd::compare::run(args, &config),
        Commands::Prioritize(args) => cmd::prioritize::run(args, &config),
        Commands::Validate(args) => cmd::validate::run(args),
        Commands::Capabilities(args) => cmd::capabilities::run(args, &config),
    });

    if let Err(e) = result {
        let kind = error_kind(&e);
        eprintln!("error[{}]: {e:#}", kind.as_str());
        std::process::exit(kind.exit_code());
    }
}

/// Load and lint the config; lint errors abort before any work is done.
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::load(path).map_err(|e| match path {
        Some(p) => anyhow::Error::new(e).context(format!("failed to load config {}", p.display())),
        None => anyhow::Error::new(e),
    })?;

    let mut errors = Vec::new();
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            WarnLevel::Error => errors.push(w.message),
        }
    }
    if !errors.is_empty() {
        return Err(ProcflowError::InvalidArgument(format!(
            "invalid config: {}",
            errors.join("; ")
        ))
        .into());
    }
    Ok(config)
}

/// The taxonomy kind of the first core error in the chain.
fn error_kind(e: &anyhow::Error) -> ErrorKind {
    e.chain()
        .find_map(|cause| cause.downcast_ref::<ProcflowError>())
        .map(ProcflowError::kind)
        .unwrap_or(ErrorKind::Internal)
}
