use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use chosho_core::{
    BatchReport, FailurePolicy, InputFile, PipelineContext, ProgressEvent, config_file,
    process_batch,
};
use chosho_ingest::DocumentRasterizer;

mod output;

use output::ColorMode;

/// Payment statement extractor - read 支払調書 from PDFs and images into CSV
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract and aggregate payment statements from PDF, PNG or JPEG files
    Extract {
        /// Files to process, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write records.csv, aggregated.csv and result.json into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Google API key (overrides GOOGLE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Gemini model name (overrides GEMINI_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Resolution PDF pages are rendered at
        #[arg(long)]
        dpi: Option<u32>,

        /// Keep going when a file cannot be read (default: abort the batch)
        #[arg(long)]
        skip_failed: bool,

        /// Print the full result as JSON instead of a summary
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Print the location of the platform config file
    ConfigPath,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Page failures and skips already show above the progress bar.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ConfigPath => {
            match config_file::config_path() {
                Some(path) => println!("{}", path.display()),
                None => anyhow::bail!("Could not determine config directory"),
            }
            Ok(())
        }
        Command::Extract {
            files,
            output_dir,
            api_key,
            model,
            dpi,
            skip_failed,
            json,
            no_color,
        } => {
            let args = ExtractArgs {
                files,
                output_dir,
                api_key,
                model,
                dpi,
                skip_failed,
                json,
                color: ColorMode(!no_color && !json),
            };
            extract(args).await
        }
    }
}

struct ExtractArgs {
    files: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    api_key: Option<String>,
    model: Option<String>,
    dpi: Option<u32>,
    skip_failed: bool,
    json: bool,
    color: ColorMode,
}

async fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    // Resolve configuration: CLI flags > env vars > config file > defaults
    let mut config = config_file::resolve(&config_file::load_config());
    if let Some(key) = args.api_key {
        config.google_api_key = Some(key);
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(dpi) = args.dpi {
        config.render_dpi = dpi;
    }
    if args.skip_failed {
        config.failure_policy = FailurePolicy::Skip;
    }

    if !config.has_api_key() {
        anyhow::bail!(
            "No Google API key configured. Set GOOGLE_API_KEY, pass --api-key, or add it to {}",
            config_file::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        );
    }

    for path in &args.files {
        if !path.exists() {
            anyhow::bail!("File not found: {}", path.display());
        }
    }

    let rasterizer = Arc::new(DocumentRasterizer::new().with_dpi(config.render_dpi));
    let ctx = PipelineContext::from_config(&config, rasterizer);
    let inputs: Vec<InputFile> = args
        .files
        .iter()
        .map(|p| InputFile::from_path(p.clone()))
        .collect();

    let bar = ProgressBar::new(inputs.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:30.green/dim}] {pos}/{len} {prefix} {msg}",
        )?
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress_bar = bar.clone();
    let result = process_batch(inputs, &ctx, move |event| {
        apply_progress(&progress_bar, &event)
    })
    .await;
    bar.finish_and_clear();
    let report = result?;

    let mut out = std::io::stdout().lock();
    if args.json {
        let payload = output::json_payload(&report)?;
        writeln!(out, "{}", serde_json::to_string_pretty(&payload)?)?;
    } else {
        output::print_summary(&mut out, &report, args.color)?;
    }

    if let Some(dir) = args.output_dir {
        write_exports(&dir, &report, args.color)?;
    }
    Ok(())
}

fn apply_progress(bar: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::FileStarted {
            file_index,
            filename,
            ..
        } => {
            bar.set_position(*file_index as u64);
            bar.set_prefix(filename.clone());
            bar.set_message("");
        }
        ProgressEvent::PageStarted { page, total } => {
            bar.set_message(format!("(page {page}/{total})"));
        }
        ProgressEvent::FileSkipped { filename } => {
            bar.println(format!("Skipping unsupported file: {filename}"));
        }
        ProgressEvent::PageFailed { page, message } => {
            bar.println(format!("Page {page} failed: {message}"));
        }
        ProgressEvent::PagesCounted { .. } => {}
    }
}

fn write_exports(
    dir: &std::path::Path,
    report: &BatchReport,
    color: ColorMode,
) -> anyhow::Result<()> {
    let paths = chosho_reporting::write_exports(dir, report)?;
    let mut err = std::io::stderr().lock();
    for path in [&paths.records_csv, &paths.aggregated_csv, &paths.json] {
        output::print_written(&mut err, path, color)?;
    }
    Ok(())
}
