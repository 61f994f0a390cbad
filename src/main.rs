mod cli;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use fr_core::config::RecorderConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "fmp4rec=trace,fr_segmenter=trace,fr_media=debug,fr_core=debug".to_string()
        } else {
            "fmp4rec=info,fr_segmenter=info,fr_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Record { trace, output } => record_trace(&trace, cli.config.as_deref(), output),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("fmp4rec {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn record_trace(
    trace: &Path,
    config_path: Option<&Path>,
    output: Option<std::path::PathBuf>,
) -> Result<()> {
    let mut config = RecorderConfig::load_or_default(config_path);
    if let Some(dir) = output {
        config.output_dir = dir;
    }

    let file = File::open(trace).with_context(|| format!("cannot open trace {}", trace.display()))?;
    tracing::info!("Recording trace: {}", trace.display());

    let summary = fmp4rec::record(&config, BufReader::new(file))?;

    println!("Output: {}", config.output_dir.display());
    println!("Segments: {}", summary.segments);
    println!("Samples: {}", summary.samples);
    if summary.discarded > 0 {
        println!("Discarded (late): {}", summary.discarded);
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let Some(p) = path else {
        anyhow::bail!("No config file specified; pass one with --config or as an argument");
    };

    println!("Validating config: {:?}", p);
    let config = RecorderConfig::load(p)?;
    let warnings = config.validate()?;

    println!("✓ Configuration is valid");
    println!("  Output dir: {}", config.output_dir.display());
    println!("  Segment duration: {} ms", config.segment_duration_ms);
    println!("  Max lookback: {} ms", config.max_lookback_ms);
    println!("  Tracks: {}", config.tracks.len());
    for track in &config.tracks {
        println!("    [{}] {} @ {} Hz", track.id, track.codec, track.clock_rate);
    }
    for warning in &warnings {
        println!("⚠ {warning}");
    }

    Ok(())
}
