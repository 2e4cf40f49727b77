//! # Compression Orchestrator
//!
//! Orchestratore principale: possiede la coda e porta ogni entry attraverso
//! la sua macchina a stati.
//!
//! ## Macchina a stati per-entry:
//! ```text
//! pending ──► compressing ──(progress*)──► done
//!                         └──────────────► failed
//! ```
//!
//! ## Regole:
//! - Un solo worker logico: l'entry N+1 parte solo quando la N è terminale
//! - Lo stato `compressing` è pubblicato prima di chiamare il servizio
//! - Il fallimento di un'entry non ferma il run
//! - Un secondo `compress_all` durante un run viene rifiutato
//! - Il lock della coda non è mai tenuto durante una chiamata a un servizio

use crate::compressor::{
    CompressedOutput, ImageOptions, ProgressSink, Quality, Service, ServiceTable, VideoOptions,
};
use crate::config::Config;
use crate::error::{CompressError, Result};
use crate::file_manager::FileManager;
use crate::image_processor::ImageProcessor;
use crate::media::{classify, MediaKind, SourcePayload};
use crate::orchestrator::events::QueueEvent;
use crate::progress::RunSummary;
use crate::queue::{AggregateStats, CompressionResult, EntryId, EntryState, Queue, QueueEntry};
use crate::video_processor::VideoProcessor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Result of an `enqueue` call
#[derive(Debug, Default)]
pub struct EnqueueOutcome {
    /// Ids of the new entries, in submission order
    pub accepted: Vec<EntryId>,
    /// One `UnsupportedMediaKind` per rejected file
    pub rejected: Vec<CompressError>,
}

/// Owns the queue and drives entries through compression
pub struct CompressionOrchestrator {
    queue: Mutex<Queue>,
    services: ServiceTable,
    config: Config,
    processing: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

/// Clears the processing flag when a run ends, however it ends.
///
/// `ProcessingChanged` is only published once the run is announced, so a run
/// with nothing eligible stays silent.
struct ProcessingGuard<'a> {
    orchestrator: &'a CompressionOrchestrator,
    announced: bool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(orchestrator: &'a CompressionOrchestrator) -> Option<Self> {
        orchestrator
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            orchestrator,
            announced: false,
        })
    }

    fn announce(&mut self) {
        self.announced = true;
        self.orchestrator.publish(QueueEvent::ProcessingChanged(true));
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.processing.store(false, Ordering::Release);
        if self.announced {
            self.orchestrator.publish(QueueEvent::ProcessingChanged(false));
        }
    }
}

impl CompressionOrchestrator {
    pub fn new(config: Config, services: ServiceTable) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            queue: Mutex::new(Queue::new()),
            services,
            config,
            processing: AtomicBool::new(false),
            events,
        }
    }

    /// Orchestrator backed by the in-process image encoder and ffmpeg
    pub fn with_default_services(config: Config) -> Self {
        let services = ServiceTable::new(
            Arc::new(ImageProcessor::new()),
            Arc::new(VideoProcessor::new(config.clone())),
        );
        Self::new(config, services)
    }

    /// Observe every queue mutation from now on
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: QueueEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Classify and append files in submission order. Nothing is compressed yet.
    pub async fn enqueue(&self, files: Vec<SourcePayload>) -> EnqueueOutcome {
        let mut outcome = EnqueueOutcome::default();
        let mut queue = self.queue.lock().await;

        for file in files {
            let Some(kind) = classify(&file).media_kind() else {
                warn!("Rejecting {}: unsupported media type {}", file.name, file.mime);
                outcome.rejected.push(CompressError::UnsupportedMediaKind {
                    name: file.name,
                    mime: file.mime,
                });
                continue;
            };

            let name = file.name.clone();
            let size = file.size();
            let id = queue.push(file, kind);
            debug!("Enqueued {} as {} entry {}", name, kind, id);
            self.publish(QueueEvent::Enqueued { id, name, size });
            outcome.accepted.push(id);
        }

        outcome
    }

    /// Remove an entry. Returns false if no entry had that id.
    pub async fn remove(&self, id: EntryId) -> bool {
        let mut queue = self.queue.lock().await;
        let removed = queue.remove(id);
        if removed {
            self.publish(QueueEvent::Removed { id });
        }
        removed
    }

    /// Drop every entry (session reset)
    pub async fn clear(&self) {
        let mut queue = self.queue.lock().await;
        queue.clear();
        self.publish(QueueEvent::Cleared);
    }

    /// Snapshot of the queue in order
    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.queue.lock().await.entries().to_vec()
    }

    pub async fn entry(&self, id: EntryId) -> Option<QueueEntry> {
        self.queue.lock().await.get(id).cloned()
    }

    /// Aggregate statistics computed from the live queue
    pub async fn stats(&self) -> AggregateStats {
        self.queue.lock().await.stats()
    }

    /// Compress every pending entry, one at a time, in queue order.
    ///
    /// Entries that fail are marked `Failed` and the run moves on; the only
    /// error returned is `ReentrantCompressionRequest`.
    pub async fn compress_all(&self, quality: Quality) -> Result<RunSummary> {
        let Some(mut guard) = ProcessingGuard::acquire(self) else {
            warn!("compress_all requested while a run is in progress, ignoring");
            return Err(CompressError::ReentrantCompressionRequest);
        };

        let eligible = self.queue.lock().await.pending_ids();
        if eligible.is_empty() {
            debug!("Nothing to compress");
            return Ok(RunSummary::new());
        }
        guard.announce();

        info!(
            "Compressing {} entries (quality: {:.2})",
            eligible.len(),
            quality.value()
        );

        let mut summary = RunSummary::new();
        for id in eligible {
            let Some((source, kind)) = self.begin_entry(id).await else {
                debug!("Entry {} is no longer pending, skipping", id);
                continue;
            };

            let outcome = match self.run_service(id, &source, kind, quality).await {
                Ok(output) => self.build_result(id, &source, output).await,
                Err(e) => Err(e),
            };

            self.finish_entry(id, kind, &source, outcome, &mut summary).await;
        }

        info!("{}", summary.format_summary());
        Ok(summary)
    }

    /// pending → compressing, published before any service call
    async fn begin_entry(&self, id: EntryId) -> Option<(Arc<SourcePayload>, MediaKind)> {
        let mut queue = self.queue.lock().await;
        let entry = queue.get_mut(id)?;
        if entry.state != EntryState::Pending || entry.result.is_some() {
            return None;
        }

        entry.state = EntryState::Compressing;
        entry.progress = 0;
        self.publish(QueueEvent::StateChanged {
            id,
            state: EntryState::Compressing,
        });

        info!("Compressing {} {} ({})", entry.kind, entry.source.name, FileManager::format_size(entry.source.size()));
        Some((entry.source.clone(), entry.kind))
    }

    async fn run_service(
        &self,
        id: EntryId,
        source: &SourcePayload,
        kind: MediaKind,
        quality: Quality,
    ) -> Result<CompressedOutput> {
        match self.services.service_for(kind) {
            Service::Image(service) => {
                let options = ImageOptions {
                    target_quality: quality,
                    max_dimension: self.config.max_dimension,
                    max_size_bytes: self.config.max_size_bytes(),
                };
                service.compress(source, &options).await
            }
            Service::Video(service) => {
                let options = VideoOptions {
                    target_quality: quality,
                };
                let (sink, mut reports) = ProgressSink::channel();
                let mut work = service.compress(source, &options, sink);

                let result = loop {
                    tokio::select! {
                        biased;
                        Some(percent) = reports.recv() => self.record_progress(id, percent).await,
                        result = &mut work => break result,
                    }
                };

                // reports sent just before completion still count
                while let Ok(percent) = reports.try_recv() {
                    self.record_progress(id, percent).await;
                }
                result
            }
        }
    }

    /// Apply a progress report if it moves the entry forward
    async fn record_progress(&self, id: EntryId, percent: u8) {
        let mut queue = self.queue.lock().await;
        let Some(entry) = queue.get_mut(id) else {
            return;
        };

        let percent = percent.min(100);
        if entry.state == EntryState::Compressing && percent > entry.progress {
            entry.progress = percent;
            self.publish(QueueEvent::Progress { id, percent });
        }
    }

    /// Turn service output into a result, writing the artifact when an output directory is set
    async fn build_result(
        &self,
        id: EntryId,
        source: &SourcePayload,
        output: CompressedOutput,
    ) -> Result<CompressionResult> {
        let mut result = CompressionResult::new(source, output.bytes, output.mime);

        if let Some(ref output_dir) = self.config.output_path {
            let path =
                FileManager::write_artifact(output_dir, source, &result.mime, id, &result.payload).await?;
            debug!("Wrote {} to {}", source.name, path.display());
            result.location = Some(path);
        }

        Ok(result)
    }

    /// compressing → done | failed
    async fn finish_entry(
        &self,
        id: EntryId,
        kind: MediaKind,
        source: &SourcePayload,
        outcome: Result<CompressionResult>,
        summary: &mut RunSummary,
    ) {
        let mut queue = self.queue.lock().await;
        let Some(entry) = queue.get_mut(id) else {
            debug!("Entry {} was removed while compressing, discarding outcome", id);
            return;
        };

        match outcome {
            Ok(result) => {
                info!(
                    "[OK] {}: {} -> {} ({}% saved)",
                    source.name,
                    FileManager::format_size(result.original_size),
                    FileManager::format_size(result.compressed_size),
                    result.compression_ratio
                );
                summary.add_done(result.original_size, result.compressed_size);

                if entry.progress < 100 {
                    entry.progress = 100;
                    self.publish(QueueEvent::Progress { id, percent: 100 });
                }
                entry.state = EntryState::Done;
                self.publish(QueueEvent::StateChanged {
                    id,
                    state: EntryState::Done,
                });
                self.publish(QueueEvent::Completed {
                    id,
                    original_size: result.original_size,
                    compressed_size: result.compressed_size,
                    compression_ratio: result.compression_ratio,
                    location: result.location.clone(),
                });
                entry.result = Some(result);
            }
            Err(e) => {
                let error = match e {
                    e @ CompressError::CompressionServiceFailure { .. } => e,
                    other => CompressError::service(kind, other.to_string()),
                };
                warn!("[ERROR] {}: {}", source.name, error);
                summary.add_failed(source.size());

                entry.state = EntryState::Failed;
                entry.error = Some(error.to_string());
                self.publish(QueueEvent::StateChanged {
                    id,
                    state: EntryState::Failed,
                });
                self.publish(QueueEvent::Failed {
                    id,
                    error: error.to_string(),
                });
            }
        }
    }
}
