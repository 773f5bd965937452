//! # File Converter - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Caricamento della configurazione e costruzione del `FormatCatalog`
//! - Avvio della conversione in background con spinner o output JSON
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, formato, preset, config)
//! 2. Configura il logging (`RUST_LOG`, INFO di default, DEBUG con `--verbose`)
//! 3. Carica la configurazione e risolve il percorso di `ffmpeg`
//! 4. Costruisce la richiesta (target esplicito o primo target disponibile)
//! 5. Esegue la conversione e riporta l'esito; exit code 1 in caso di errore
//!
//! ## Esempio di utilizzo:
//! ```bash
//! converter holiday.mp4 --to mkv --quality High
//! converter report.docx --to pdf --json
//! converter photo.png --list-formats
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use file_converter::catalog::extension_of;
use file_converter::file_manager::FileManager;
use file_converter::json_output::JsonMessage;
use file_converter::progress::ProgressManager;
use file_converter::{
    Config, ConversionError, ConversionOrchestrator, ConversionOutcome, FormatCatalog, ToolPathResolver,
    TranscoderSettings,
};

#[derive(Parser)]
#[command(name = "converter")]
#[command(about = "Convert documents, images, audio and video between formats")]
struct Args {
    /// File to convert
    input: PathBuf,

    /// Target format extension (e.g. pdf, .png, mkv)
    #[arg(short, long)]
    to: Option<String>,

    /// Output path (defaults to the input path with the target extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Quality preset for video transcodes (Low, Medium, High, Very High)
    #[arg(short, long)]
    quality: Option<String>,

    /// Configuration file (overrides ./config.json and the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the formats INPUT can be converted to and exit
    #[arg(long)]
    list_formats: bool,

    /// Emit one JSON object per line on stdout instead of the spinner
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let config = Config::load(args.config.as_deref()).await?;
    let catalog = Arc::new(FormatCatalog::from_config(&config).context("Invalid format catalog")?);

    if args.list_formats {
        return Ok(list_formats(&catalog, &args.input, args.json));
    }

    let resolver = ToolPathResolver::new();
    let settings = TranscoderSettings::from_config(&config.transcoder, &resolver);
    debug!("Transcoder: {}", settings.program.display());
    let orchestrator = ConversionOrchestrator::new(catalog, settings);

    let request = match orchestrator.request_for(
        &args.input,
        args.to.as_deref(),
        args.output.as_deref(),
        args.quality.clone(),
    ) {
        Ok(request) => request,
        Err(e) => {
            report_failure(&e, args.json, &ProgressManager::hidden());
            return Ok(ExitCode::FAILURE);
        }
    };

    let strategy = orchestrator.strategy_for(&request).ok();
    let progress = if args.json {
        JsonMessage::start(&request, strategy).emit();
        ProgressManager::hidden()
    } else {
        let pipeline = strategy.map(|s| format!(" ({})", s)).unwrap_or_default();
        ProgressManager::spinner(&format!(
            "Converting {} -> {}{}",
            request.input_path().display(),
            request.output_path().display(),
            pipeline
        ))
    };

    let task = {
        let orchestrator = orchestrator.clone();
        let request = request.clone();
        tokio::spawn(async move { orchestrator.convert(&request).await })
    };
    let result = task
        .await
        .unwrap_or_else(|e| Err(ConversionError::Unknown(format!("conversion task failed: {}", e))));

    let outcome = ConversionOutcome::from(&result);
    match result {
        Ok(report) => {
            let bytes = FileManager::file_size(&report.output_path).await.ok();
            if args.json {
                JsonMessage::complete(&report, bytes).emit();
            } else {
                progress.finish(&report, bytes);
            }
        }
        Err(e) => report_failure(&e, args.json, &progress),
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn report_failure(error: &ConversionError, json: bool, progress: &ProgressManager) {
    if json {
        JsonMessage::error(error).emit();
    } else {
        progress.fail(&format!("{} ({})", error, error.kind()));
        if progress.is_quiet() {
            eprintln!("❌ {}", error);
        }
    }
}

fn list_formats(catalog: &FormatCatalog, input: &Path, json: bool) -> ExitCode {
    let input_ext = extension_of(input).unwrap_or_default();

    if json {
        JsonMessage::formats(catalog, &input_ext).emit();
    } else if let Some(targets) = catalog.allowed_outputs(&input_ext) {
        let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
        println!("{} -> {}", input_ext, targets.join(", "));
        if catalog.is_video(&input_ext) {
            println!("Quality presets: {}", catalog.preset_names().join(", "));
        }
    } else {
        eprintln!("❌ Unsupported format: {:?}", input_ext);
        eprintln!("Supported inputs: {}", catalog.input_formats().join(", "));
    }

    if catalog.contains(&input_ext) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
