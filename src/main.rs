//! # Asset Compressify - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file JSON + override da CLI)
//! - Enqueue dei file, avvio della compressione e report finale
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, quality, max dimension, output, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica e valida la configurazione
//! 4. Legge i file e li mette in coda, segnalando quelli rifiutati
//! 5. Esegue `compress_all` mostrando progress bar o eventi JSON
//! 6. Stampa statistiche finali
//!
//! ## Esempio di utilizzo:
//! ```bash
//! compressify ~/Pictures/trip clip.mov --quality 60 --output ./compressed
//! ```

use anyhow::Result;
use asset_compressify::file_manager::FileManager;
use asset_compressify::json_output::JsonMessage;
use asset_compressify::progress::{ProgressManager, RunSummary};
use asset_compressify::video_processor::VideoProcessor;
use asset_compressify::{
    AggregateStats, CompressError, CompressionOrchestrator, Config, EntryId, EntryState, MediaKind,
    Quality, QueueEntry, QueueEvent, SourcePayload,
};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "compressify")]
#[command(about = "Compress images and videos before uploading them")]
struct Args {
    /// Files or directories to compress
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Compression quality in percent (lower = smaller files)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(10..=100))]
    quality: Option<u8>,

    /// Longest allowed image side in pixels
    #[arg(long)]
    max_dimension: Option<u32>,

    /// Size budget per image in megabytes
    #[arg(long)]
    max_size_mb: Option<f64>,

    /// Directory for compressed files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let json = args.json;
    let result = match load_config(&args).await {
        Ok(config) => run(config, &args.inputs).await,
        Err(e) => Err(e),
    };

    if let Err(ref e) = result {
        if json {
            JsonMessage::error(e.to_string()).emit();
        }
    }
    result
}

/// File config first, then CLI overrides, then validation
async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::from_file(&path).await?,
        None => Config::default(),
    };

    if let Some(quality) = args.quality {
        config.quality = f64::from(quality) / 100.0;
    }
    if let Some(max_dimension) = args.max_dimension {
        config.max_dimension = max_dimension;
    }
    if args.max_size_mb.is_some() {
        config.max_size_mb = args.max_size_mb;
    }
    if args.output.is_some() {
        config.output_path = args.output.clone();
    }
    if args.json {
        config.json_output = true;
    }

    config.validate()?;

    if let Some(ref output_dir) = config.output_path {
        if !output_dir.exists() {
            tokio::fs::create_dir_all(output_dir).await?;
            info!("Created output directory: {}", output_dir.display());
        }
    }

    Ok(config)
}

async fn load_payloads(files: &[PathBuf]) -> Vec<SourcePayload> {
    let mut payloads = Vec::with_capacity(files.len());
    for file in files {
        match FileManager::load_payload(file).await {
            Ok(payload) => payloads.push(payload),
            Err(e) => warn!("Could not read {}: {}", file.display(), e),
        }
    }
    payloads
}

async fn run(config: Config, inputs: &[PathBuf]) -> Result<()> {
    let start_time = Instant::now();
    let quality = Quality::new(config.quality)?;
    let json = config.json_output;

    let files = FileManager::expand_inputs(inputs)?;
    let payloads = load_payloads(&files).await;

    let orchestrator = CompressionOrchestrator::with_default_services(config);
    let events = orchestrator.subscribe();

    let outcome = orchestrator.enqueue(payloads).await;
    for rejected in &outcome.rejected {
        if json {
            let name = match rejected {
                CompressError::UnsupportedMediaKind { name, .. } => name.clone(),
                _ => String::new(),
            };
            JsonMessage::Rejected {
                name,
                reason: rejected.to_string(),
            }
            .emit();
        } else {
            warn!("Skipping: {}", rejected);
        }
    }

    if outcome.accepted.is_empty() {
        warn!("No images or videos to compress");
    }

    if json {
        JsonMessage::Start {
            total_entries: outcome.accepted.len(),
            rejected: outcome.rejected.len(),
            quality: quality.value(),
        }
        .emit();
    } else {
        info!(
            "Queued {} files ({} rejected), quality {:.0}%",
            outcome.accepted.len(),
            outcome.rejected.len(),
            quality.value() * 100.0
        );
    }

    let has_video = orchestrator
        .entries()
        .await
        .iter()
        .any(|e| e.kind == MediaKind::Video);
    if has_video {
        if let Err(e) = VideoProcessor::check_dependencies().await {
            warn!("{}; video entries will fail", e);
        }
    }

    let reporter = tokio::spawn(report_events(events, outcome.accepted.len() as u64, json));

    let summary = orchestrator.compress_all(quality).await?;
    let stats = orchestrator.stats().await;
    let entries = orchestrator.entries().await;

    // closes the event channel so the reporter can finish
    drop(orchestrator);
    let progress = reporter.await?;

    let duration = start_time.elapsed().as_secs_f64();
    if json {
        JsonMessage::Complete {
            summary,
            stats,
            duration_seconds: duration,
        }
        .emit();
    } else {
        if let Some(progress) = progress {
            progress.finish(&summary.format_summary());
        }
        print_final_stats(&summary, &stats, &entries, duration);
    }

    Ok(())
}

/// Render queue events as a progress bar or JSON lines until the channel closes
async fn report_events(
    mut events: broadcast::Receiver<QueueEvent>,
    total_entries: u64,
    json: bool,
) -> Option<ProgressManager> {
    let progress = (!json && total_entries > 0).then(|| ProgressManager::new(total_entries));
    let mut names: HashMap<EntryId, (String, u64)> = HashMap::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!("Progress display skipped {} events", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            QueueEvent::Enqueued { id, name, size } => {
                names.insert(id, (name, size));
            }
            QueueEvent::StateChanged {
                id,
                state: EntryState::Compressing,
            } => {
                let Some((name, size)) = names.get(&id) else {
                    continue;
                };
                if json {
                    JsonMessage::EntryStart {
                        id,
                        name: name.clone(),
                        size: *size,
                    }
                    .emit();
                } else if let Some(ref progress) = progress {
                    progress.set_entry_progress(name, 0);
                }
            }
            QueueEvent::Progress { id, percent } => {
                if json {
                    JsonMessage::Progress { id, percent }.emit();
                } else if let (Some(progress), Some((name, _))) = (progress.as_ref(), names.get(&id)) {
                    progress.set_entry_progress(name, percent);
                }
            }
            QueueEvent::Completed {
                id,
                original_size,
                compressed_size,
                compression_ratio,
                location,
            } => {
                let name = names.get(&id).map(|(n, _)| n.clone()).unwrap_or_default();
                if json {
                    JsonMessage::EntryComplete {
                        id,
                        name,
                        original_size,
                        compressed_size,
                        compression_ratio,
                        location,
                    }
                    .emit();
                } else if let Some(ref progress) = progress {
                    progress.update(&format!("[OK] {}: {}% saved", name, compression_ratio));
                }
            }
            QueueEvent::Failed { id, error } => {
                let name = names.get(&id).map(|(n, _)| n.clone()).unwrap_or_default();
                if json {
                    JsonMessage::EntryFailed { id, name, error }.emit();
                } else if let Some(ref progress) = progress {
                    progress.update(&format!("[ERROR] {}: {}", name, error));
                }
            }
            _ => {}
        }
    }

    progress
}

fn print_final_stats(summary: &RunSummary, stats: &AggregateStats, entries: &[QueueEntry], duration: f64) {
    info!("Compression completed in {:.1}s", duration);

    for entry in entries {
        match (&entry.state, &entry.result, &entry.error) {
            (EntryState::Done, Some(result), _) => {
                let location = result
                    .location
                    .as_ref()
                    .map(|p| format!(" -> {}", p.display()))
                    .unwrap_or_default();
                info!(
                    "  {}: {} -> {} ({}%, {} saved){}",
                    entry.source.name,
                    FileManager::format_size(result.original_size),
                    FileManager::format_size(result.compressed_size),
                    result.compression_ratio,
                    FileManager::format_size(result.bytes_saved()),
                    location
                );
            }
            (EntryState::Failed, _, error) => {
                warn!(
                    "  {}: failed ({})",
                    entry.source.name,
                    error.as_deref().unwrap_or("unknown error")
                );
            }
            _ => {}
        }
    }

    if summary.entries_failed > 0 {
        warn!("{} files failed to compress", summary.entries_failed);
    }

    if stats.all_done {
        info!(
            "Total savings: {}% ({} saved)",
            stats.total_savings_percent,
            FileManager::format_size(stats.bytes_saved())
        );
    } else {
        info!(
            "Total: {} -> {} ({} of {} entries done)",
            FileManager::format_size(stats.total_original_size),
            FileManager::format_size(stats.total_compressed_size),
            stats.done_entries,
            stats.total_entries
        );
    }
}
