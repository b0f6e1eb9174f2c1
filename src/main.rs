use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use ocr_consolidate::LineGrouping;

#[derive(Parser, Debug)]
#[command(
    name = "ocr-consolidate",
    version,
    about = "Multi-pass OCR with de-duplicated, reading-ordered text output"
)]
struct Cli {
    /// Image to read; `-` or omitted reads the image from stdin
    #[arg(short = 'i', long = "image")]
    image: Option<String>,

    /// Run the HTTP service instead of a one-shot read (address defaults to settings)
    #[arg(long = "serve", num_args = 0..=1, default_missing_value = "")]
    serve: Option<String>,

    /// Minimum confidence for a detection to be kept
    #[arg(short = 'c', long = "confidence-threshold")]
    confidence_threshold: Option<f32>,

    /// Line grouping rule for reading order
    #[arg(long = "line-grouping", value_enum)]
    line_grouping: Option<LineGrouping>,

    /// Detector languages (e.g. en+ja); overrides settings
    #[arg(short = 'L', long = "languages")]
    languages: Option<String>,

    /// Run the original and enhanced passes concurrently
    #[arg(long = "parallel-passes")]
    parallel_passes: bool,

    /// Pretty-print the JSON result
    #[arg(long = "pretty")]
    pretty: bool,

    /// Additional settings file to merge last
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ocr_consolidate::logging::init(cli.verbose)?;

    let config = ocr_consolidate::Config {
        image: cli
            .image
            .as_deref()
            .filter(|value| value.trim() != "-")
            .map(PathBuf::from),
        settings_path: cli.read_settings,
        confidence_threshold: cli.confidence_threshold,
        line_grouping: cli.line_grouping,
        languages: cli.languages.into_iter().collect(),
        parallel_passes: cli.parallel_passes,
    };

    if let Some(addr) = cli.serve {
        let settings = ocr_consolidate::load_settings(&config)?;
        let addr = if addr.trim().is_empty() {
            settings.server_addr.clone()
        } else {
            addr
        };
        return ocr_consolidate::server::run_server(settings, addr).await;
    }

    let stdin_bytes = if config.image.is_none() {
        if io::stdin().is_terminal() {
            return Err(anyhow!("no image given (use --image or pipe one to stdin)"));
        }
        let mut buffer = Vec::new();
        io::stdin()
            .read_to_end(&mut buffer)
            .with_context(|| "failed to read stdin")?;
        Some(buffer)
    } else {
        None
    };

    let outcome =
        tokio::task::spawn_blocking(move || ocr_consolidate::run(config, stdin_bytes)).await??;
    let output = if cli.pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", output);
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
