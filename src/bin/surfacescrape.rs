//! CLI entry point for surfacescrape.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

/// surfacescrape — generate a target-language binding surface from C headers.
#[derive(Parser, Debug)]
#[command(name = "surfacescrape", version, about)]
struct Cli {
    /// Path to the surfacescrape.toml configuration file.
    #[arg(default_value = "surfacescrape.toml")]
    config: PathBuf,

    /// Output file path (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override `target_triples` from the config with a single ad-hoc
    /// triple, for a quick local run.
    #[arg(long)]
    target: Option<String>,
}

/// Exit codes per `spec.md` §6: 0 success, 1 fatal diagnostic/pipeline
/// error, 2 configuration error (bad TOML, unreadable header path).
const EXIT_SUCCESS: u8 = 0;
const EXIT_PIPELINE_ERROR: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("surfacescrape=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = match surfacescrape::config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(err = %e, "failed to load configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Some(target) = cli.target {
        cfg.target_triples = vec![target];
    }

    let base_dir = cli.config.parent().unwrap_or_else(|| std::path::Path::new("."));

    let result = match surfacescrape::generate_from_config(&cfg, base_dir) {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, "pipeline failed");
            return ExitCode::from(EXIT_PIPELINE_ERROR);
        }
    };

    let output_path = cli.output.unwrap_or_else(|| base_dir.join(&cfg.output.file));
    if let Err(e) = surfacescrape::emit::emit_to_file(
        &surfacescrape::emit::JsonEmitter,
        &result.tas,
        &output_path,
    ) {
        error!(err = %e, "failed to write output");
        return ExitCode::from(EXIT_PIPELINE_ERROR);
    }

    print_diagnostics(&result.diagnostics);

    if result.diagnostics.has_errors() {
        error!("fatal diagnostics were recorded during generation");
        return ExitCode::from(EXIT_PIPELINE_ERROR);
    }

    ExitCode::from(EXIT_SUCCESS)
}

/// Prints every diagnostic to stderr in the order it was produced
/// (`spec.md` §7's user-visible-behavior rule) — a plain-text summary
/// alongside the live `tracing` output each diagnostic already went
/// through when it was pushed.
fn print_diagnostics(diagnostics: &surfacescrape::diagnostics::Diagnostics) {
    for d in diagnostics.iter() {
        eprintln!(
            "{:?}: {} ({:?}) at {}:{}:{}",
            d.severity, d.name, d.kind, d.location.file, d.location.line, d.location.column
        );
    }
}
