use anyhow::{Context, Result};
use callscope::{
    capture,
    cli::Cli,
    config::{ProjectRoots, TracerConfig},
    session::SessionController,
};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Merge the config file with command-line overrides
fn load_config(args: &Cli) -> Result<TracerConfig> {
    let mut config = match &args.config {
        Some(path) => TracerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TracerConfig::default(),
    };

    if let Some(root) = &args.root {
        config.root = Some(root.clone());
    }
    if let Some(dir) = &args.dependency_root {
        config.dependency_root = Some(dir.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if args.no_detail {
        config.call_details = false;
    }
    if args.no_lines {
        config.line = false;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let roots = ProjectRoots::from_config(&config).context("Failed to resolve project roots")?;
    let mut controller = SessionController::new(config, &roots)?;

    let file = File::open(&args.capture)
        .with_context(|| format!("Failed to open capture {}", args.capture.display()))?;
    let summary = capture::replay(BufReader::new(file), &mut controller)?;

    for outcome in &summary.outcomes {
        if let Some(request) = &outcome.request {
            println!("=== {} {} ===", request.method, request.uri);
        }
        if let Some(report) = &outcome.report {
            print!("{}", report);
        }
        println!();
    }

    if let Some(last) = summary.outcomes.last() {
        for path in &last.exported {
            eprintln!("[callscope: wrote {}]", path.display());
        }
    }
    eprintln!(
        "[callscope: {} requests, {} events recorded, {} skipped, {} rejected records]",
        summary.outcomes.len(),
        summary.recorded_events,
        summary.skipped_events,
        summary.rejected_records
    );

    if summary.failed_exports > 0 {
        anyhow::bail!(
            "Exports failed for {} of {} requests",
            summary.failed_exports,
            summary.outcomes.len()
        );
    }
    Ok(())
}
