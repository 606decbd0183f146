use anyhow::{bail, Context, Result};
use clap::Parser;
use flightbit::{
    init_tracing, FlightConnector, FlushStatus, FrameReader, MemoryConnector, Registry,
    RuntimeConfig,
};
use flightbit_core::SinkConnector;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Replay newline-delimited JSON records into Arrow Flight endpoints
#[derive(Parser)]
#[command(name = "flightbit")]
#[command(version)]
#[command(about = "Replay newline-delimited JSON records into Arrow Flight endpoints", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Input file with one JSON record per line (defaults to stdin)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Keep batches in memory instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Default)]
struct RunReport {
    frames: usize,
    retries: usize,
    errors: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Step 1: Load configuration (file, then FLIGHTBIT_* environment)
    let mut config = RuntimeConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    // Step 2: Apply CLI overrides (highest priority)
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    init_tracing(&config);

    let input: Box<dyn BufRead> = match &cli.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };

    // Step 3: Run with the selected transport
    if cli.dry_run {
        let connector = MemoryConnector::new();
        let report = run(&config, connector.clone(), input);
        for session in connector.sessions() {
            let rows: usize = session.batches.iter().map(|b| b.num_rows()).sum();
            info!(
                endpoint = %session.endpoint,
                batches = session.batches.len(),
                rows,
                "dry run: session contents"
            );
        }
        report
    } else {
        let connector = FlightConnector::new().context("Failed to start Flight client")?;
        run(&config, connector, input)
    }
}

fn run<C: SinkConnector>(config: &RuntimeConfig, connector: C, input: impl BufRead) -> Result<()> {
    let registry = Registry::new(connector);

    let mut failed_registrations = 0usize;
    for lookup in config.output_lookups()? {
        if let Err(err) = registry.register(&lookup) {
            error!(error = %err, "failed to register output");
            failed_registrations += 1;
        }
    }
    if registry.ids().is_empty() {
        bail!("no output could be registered");
    }

    let ids = registry.ids();
    let mut report = RunReport::default();
    let mut frames = FrameReader::new(input, config.frame_size);
    for frame in frames.by_ref() {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                error!(error = %err, "input ended early");
                report.errors += 1;
                break;
            }
        };
        report.frames += 1;

        for id in &ids {
            match registry.flush(id, frame.iter().cloned()) {
                FlushStatus::Ok => {}
                FlushStatus::Retry => report.retries += 1,
                FlushStatus::Error => report.errors += 1,
            }
        }
    }

    let shutdown = registry.shutdown();

    info!(
        lines = frames.lines_read(),
        skipped_lines = frames.skipped(),
        frames = report.frames,
        retries = report.retries,
        errors = report.errors,
        "replay finished"
    );
    if report.retries > 0 {
        warn!(retries = report.retries, "some batches were dropped after transport errors");
    }

    shutdown.context("Failed to shut down outputs")?;
    if failed_registrations > 0 {
        bail!("{} output(s) failed to register", failed_registrations);
    }
    if report.errors > 0 {
        bail!("{} flush call(s) failed", report.errors);
    }
    Ok(())
}
