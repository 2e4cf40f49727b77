use super::*;
use crate::compressor::{
    CompressedOutput, ImageCompressor, ImageOptions, ProgressSink, Quality, ServiceTable,
    VideoCompressor, VideoOptions,
};
use crate::config::Config;
use crate::error::{CompressError, Result};
use crate::media::SourcePayload;
use crate::queue::{EntryId, EntryState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use tokio::sync::{broadcast, Notify};
use tokio_test::{assert_err, assert_ok};

#[derive(Clone, Default)]
struct CallLog(Arc<StdMutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Clone)]
enum Behaviour {
    Shrink(usize),
    Fail(&'static str),
}

fn respond(behaviour: Option<&Behaviour>, payload: &SourcePayload, mime: &str) -> Result<CompressedOutput> {
    match behaviour {
        Some(Behaviour::Shrink(size)) => Ok(CompressedOutput::new(vec![7u8; *size], mime)),
        Some(Behaviour::Fail(reason)) => Err(CompressError::FFmpeg(reason.to_string())),
        None => Ok(CompressedOutput::new(vec![7u8; payload.bytes.len() / 2], mime)),
    }
}

#[derive(Default)]
struct FakeImage {
    log: CallLog,
    behaviours: HashMap<String, Behaviour>,
    seen: StdMutex<Vec<ImageOptions>>,
}

impl FakeImage {
    fn with_log(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Default::default()
        }
    }

    fn behave(mut self, name: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(name.to_string(), behaviour);
        self
    }
}

#[async_trait]
impl ImageCompressor for FakeImage {
    async fn compress(&self, payload: &SourcePayload, options: &ImageOptions) -> Result<CompressedOutput> {
        self.log.push(format!("image:{}", payload.name));
        self.seen.lock().unwrap().push(options.clone());
        respond(self.behaviours.get(&payload.name), payload, "image/jpeg")
    }
}

#[derive(Default)]
struct FakeVideo {
    log: CallLog,
    behaviours: HashMap<String, Behaviour>,
    steps: Vec<u8>,
    seen: StdMutex<Vec<VideoOptions>>,
}

impl FakeVideo {
    fn with_log(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Default::default()
        }
    }

    fn behave(mut self, name: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(name.to_string(), behaviour);
        self
    }

    fn steps(mut self, steps: &[u8]) -> Self {
        self.steps = steps.to_vec();
        self
    }
}

#[async_trait]
impl VideoCompressor for FakeVideo {
    async fn compress(
        &self,
        payload: &SourcePayload,
        options: &VideoOptions,
        progress: ProgressSink,
    ) -> Result<CompressedOutput> {
        self.log.push(format!("video:{}", payload.name));
        self.seen.lock().unwrap().push(options.clone());
        for step in &self.steps {
            progress.report(*step);
            tokio::task::yield_now().await;
        }
        respond(self.behaviours.get(&payload.name), payload, "video/mp4")
    }
}

/// Video service that blocks until released
#[derive(Clone, Default)]
struct GatedVideo {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl VideoCompressor for GatedVideo {
    async fn compress(
        &self,
        payload: &SourcePayload,
        _options: &VideoOptions,
        progress: ProgressSink,
    ) -> Result<CompressedOutput> {
        progress.report(10);
        self.started.notify_one();
        self.release.notified().await;
        Ok(CompressedOutput::new(vec![0u8; payload.bytes.len() / 4], "video/mp4"))
    }
}

/// Image service that records the entry state it sees when called
#[derive(Default)]
struct ProbeImage {
    orchestrator: OnceLock<Weak<CompressionOrchestrator>>,
    observed: StdMutex<Vec<(EntryState, u8)>>,
}

#[async_trait]
impl ImageCompressor for ProbeImage {
    async fn compress(&self, payload: &SourcePayload, _options: &ImageOptions) -> Result<CompressedOutput> {
        let orchestrator = self
            .orchestrator
            .get()
            .and_then(Weak::upgrade)
            .expect("orchestrator registered");
        let entries = orchestrator.entries().await;
        let entry = entries
            .iter()
            .find(|e| e.source.name == payload.name)
            .expect("entry exists");
        self.observed.lock().unwrap().push((entry.state, entry.progress));
        Ok(CompressedOutput::new(vec![1u8; 10], "image/jpeg"))
    }
}

fn build(image: impl ImageCompressor + 'static, video: impl VideoCompressor + 'static) -> CompressionOrchestrator {
    build_with_config(Config::default(), image, video)
}

fn build_with_config(
    config: Config,
    image: impl ImageCompressor + 'static,
    video: impl VideoCompressor + 'static,
) -> CompressionOrchestrator {
    CompressionOrchestrator::new(config, ServiceTable::new(Arc::new(image), Arc::new(video)))
}

fn image(name: &str, size: usize) -> SourcePayload {
    SourcePayload::new(name, "image/jpeg", vec![0u8; size])
}

fn video(name: &str, size: usize) -> SourcePayload {
    SourcePayload::new(name, "video/mp4", vec![0u8; size])
}

fn drain(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress_of(events: &[QueueEvent], id: EntryId) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            QueueEvent::Progress { id: entry, percent } if *entry == id => Some(*percent),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_enqueue_rejects_unsupported_files() {
    let orchestrator = build(FakeImage::default(), FakeVideo::default());

    let outcome = orchestrator
        .enqueue(vec![
            image("a.jpg", 10),
            SourcePayload::new("doc.pdf", "application/pdf", vec![1u8; 5]),
            video("b.mp4", 20),
        ])
        .await;

    assert_eq!(outcome.accepted.len(), 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert!(matches!(
        &outcome.rejected[0],
        CompressError::UnsupportedMediaKind { name, .. } if name == "doc.pdf"
    ));

    let entries = orchestrator.entries().await;
    let names: Vec<_> = entries.iter().map(|e| e.source.name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.mp4"]);
    assert!(entries.iter().all(|e| e.state == EntryState::Pending && e.result.is_none()));
    assert_ne!(entries[0].id, entries[1].id);
}

#[tokio::test]
async fn test_image_ten_to_four_megabytes_is_sixty_percent() {
    let orchestrator = build(
        FakeImage::default().behave("big.jpg", Behaviour::Shrink(4_000_000)),
        FakeVideo::default(),
    );
    let outcome = orchestrator.enqueue(vec![image("big.jpg", 10_000_000)]).await;

    let summary = assert_ok!(orchestrator.compress_all(Quality::default()).await);
    assert_eq!(summary.entries_done, 1);

    let entry = orchestrator.entry(outcome.accepted[0]).await.unwrap();
    assert_eq!(entry.state, EntryState::Done);
    assert_eq!(entry.progress, 100);
    let result = entry.result.unwrap();
    assert_eq!(result.original_size, 10_000_000);
    assert_eq!(result.compressed_size, 4_000_000);
    assert_eq!(result.compression_ratio, 60);
    assert_eq!(result.location, None);

    let stats = orchestrator.stats().await;
    assert_eq!(stats.total_savings_percent, 60);
    assert!(stats.all_done);
    assert!(!stats.has_pending);
}

#[tokio::test]
async fn test_zero_byte_file_compresses_without_error() {
    let orchestrator = build(
        FakeImage::default().behave("empty.jpg", Behaviour::Shrink(0)),
        FakeVideo::default(),
    );
    let outcome = orchestrator.enqueue(vec![image("empty.jpg", 0)]).await;

    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    let entry = orchestrator.entry(outcome.accepted[0]).await.unwrap();
    assert_eq!(entry.state, EntryState::Done);
    let result = entry.result.unwrap();
    assert_eq!(result.compression_ratio, 0);
    assert_eq!(result.compressed_size, 0);
    assert_eq!(orchestrator.stats().await.total_savings_percent, 0);
}

#[tokio::test]
async fn test_larger_output_keeps_original_size() {
    let orchestrator = build(
        FakeImage::default().behave("tiny.jpg", Behaviour::Shrink(500)),
        FakeVideo::default(),
    );
    let outcome = orchestrator.enqueue(vec![image("tiny.jpg", 100)]).await;

    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    let result = orchestrator.entry(outcome.accepted[0]).await.unwrap().result.unwrap();
    assert_eq!(result.compressed_size, 100);
    assert_eq!(result.compression_ratio, 0);
    assert_eq!(result.payload.len(), 100);
}

#[tokio::test]
async fn test_services_are_called_in_queue_order() {
    let log = CallLog::default();
    let orchestrator = build(FakeImage::with_log(&log), FakeVideo::with_log(&log));
    orchestrator
        .enqueue(vec![image("a.jpg", 100), video("b.mp4", 100), image("c.jpg", 100)])
        .await;

    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    assert_eq!(log.calls(), vec!["image:a.jpg", "video:b.mp4", "image:c.jpg"]);
}

#[tokio::test]
async fn test_partial_failure_does_not_stop_the_run() {
    let log = CallLog::default();
    let orchestrator = build(
        FakeImage::with_log(&log),
        FakeVideo::with_log(&log)
            .steps(&[20, 45])
            .behave("b.mp4", Behaviour::Fail("decoder exploded")),
    );
    let ids = orchestrator
        .enqueue(vec![image("a.jpg", 1_000), video("b.mp4", 4_000), image("c.jpg", 2_000)])
        .await
        .accepted;

    let summary = assert_ok!(orchestrator.compress_all(Quality::default()).await);
    assert_eq!(summary.entries_done, 2);
    assert_eq!(summary.entries_failed, 1);
    assert_eq!(log.calls().len(), 3);

    let a = orchestrator.entry(ids[0]).await.unwrap();
    let b = orchestrator.entry(ids[1]).await.unwrap();
    let c = orchestrator.entry(ids[2]).await.unwrap();

    assert_eq!(a.state, EntryState::Done);
    assert!(a.result.is_some());
    assert_eq!(c.state, EntryState::Done);
    assert!(c.result.is_some());

    assert_eq!(b.state, EntryState::Failed);
    assert!(b.result.is_none());
    assert_eq!(b.progress, 45);
    assert!(b.error.unwrap().contains("decoder exploded"));

    for entry in [&a, &c] {
        let ratio = entry.result.as_ref().unwrap().compression_ratio;
        assert!(ratio <= 100);
    }

    let stats = orchestrator.stats().await;
    assert!(!stats.all_done);
    assert!(stats.has_pending);
    assert_eq!(stats.failed_entries, 1);
    assert_eq!(stats.total_original_size, 7_000);
    // a and c halve, b keeps its source size
    assert_eq!(stats.total_compressed_size, 500 + 4_000 + 1_000);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let log = CallLog::default();
    let orchestrator = build(FakeImage::with_log(&log), FakeVideo::with_log(&log));
    orchestrator.enqueue(vec![image("a.jpg", 100), video("b.mp4", 100)]).await;

    assert_ok!(orchestrator.compress_all(Quality::default()).await);
    let calls_after_first = log.calls().len();
    let stats_after_first = orchestrator.stats().await;

    let mut rx = orchestrator.subscribe();
    let summary = assert_ok!(orchestrator.compress_all(Quality::default()).await);

    assert_eq!(summary.entries_processed, 0);
    assert_eq!(log.calls().len(), calls_after_first);
    assert_eq!(orchestrator.stats().await, stats_after_first);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_empty_run_releases_the_processing_flag() {
    let orchestrator = build(FakeImage::default(), FakeVideo::default());
    let mut rx = orchestrator.subscribe();

    assert_ok!(orchestrator.compress_all(Quality::default()).await);
    assert!(!orchestrator.is_processing());
    assert!(drain(&mut rx).is_empty());

    let id = orchestrator.enqueue(vec![image("late.jpg", 100)]).await.accepted[0];
    let summary = assert_ok!(orchestrator.compress_all(Quality::default()).await);
    assert_eq!(summary.entries_done, 1);

    let events: Vec<QueueEvent> = drain(&mut rx)
        .into_iter()
        .filter(|event| !matches!(event, QueueEvent::Enqueued { .. }))
        .collect();
    assert_eq!(events.first(), Some(&QueueEvent::ProcessingChanged(true)));
    assert_eq!(events.last(), Some(&QueueEvent::ProcessingChanged(false)));
    let toggles = events
        .iter()
        .filter(|event| matches!(event, QueueEvent::ProcessingChanged(_)))
        .count();
    assert_eq!(toggles, 2);
    assert_eq!(orchestrator.entry(id).await.unwrap().state, EntryState::Done);
}

#[tokio::test]
async fn test_failed_entries_are_not_retried_in_place() {
    let log = CallLog::default();
    let orchestrator = build(
        FakeImage::with_log(&log).behave("bad.jpg", Behaviour::Fail("corrupt")),
        FakeVideo::with_log(&log),
    );
    let ids = orchestrator.enqueue(vec![image("bad.jpg", 100)]).await.accepted;

    assert_ok!(orchestrator.compress_all(Quality::default()).await);
    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    assert_eq!(log.calls(), vec!["image:bad.jpg"]);
    assert_eq!(orchestrator.entry(ids[0]).await.unwrap().state, EntryState::Failed);

    // removal and re-add makes the file eligible again
    assert!(orchestrator.remove(ids[0]).await);
    orchestrator.enqueue(vec![image("bad.jpg", 100)]).await;
    assert_ok!(orchestrator.compress_all(Quality::default()).await);
    assert_eq!(log.calls().len(), 2);
}

#[tokio::test]
async fn test_video_progress_is_monotonic() {
    let orchestrator = build(
        FakeImage::default(),
        FakeVideo::default().steps(&[10, 5, 40, 40, 90, 250]),
    );
    let id = orchestrator.enqueue(vec![video("clip.mp4", 1_000)]).await.accepted[0];
    let mut rx = orchestrator.subscribe();

    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    let events = drain(&mut rx);
    let progress = progress_of(&events, id);
    assert_eq!(progress, vec![10, 40, 90, 100]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(events.first(), Some(&QueueEvent::ProcessingChanged(true)));
    assert_eq!(
        events[1],
        QueueEvent::StateChanged { id, state: EntryState::Compressing }
    );
    assert_eq!(events.last(), Some(&QueueEvent::ProcessingChanged(false)));
    assert!(events.contains(&QueueEvent::StateChanged { id, state: EntryState::Done }));
}

#[tokio::test]
async fn test_image_jumps_straight_to_done() {
    let orchestrator = build(FakeImage::default(), FakeVideo::default());
    let id = orchestrator.enqueue(vec![image("a.jpg", 100)]).await.accepted[0];
    let mut rx = orchestrator.subscribe();

    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    let events: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.entry_id() == Some(id))
        .collect();
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], QueueEvent::StateChanged { id, state: EntryState::Compressing });
    assert_eq!(events[1], QueueEvent::Progress { id, percent: 100 });
    assert_eq!(events[2], QueueEvent::StateChanged { id, state: EntryState::Done });
    assert!(matches!(
        events[3],
        QueueEvent::Completed { compressed_size: 50, compression_ratio: 50, .. }
    ));
}

#[tokio::test]
async fn test_compressing_is_visible_before_service_call() {
    let probe = Arc::new(ProbeImage::default());
    let orchestrator = Arc::new(CompressionOrchestrator::new(
        Config::default(),
        ServiceTable::new(probe.clone(), Arc::new(FakeVideo::default())),
    ));
    probe
        .orchestrator
        .set(Arc::downgrade(&orchestrator))
        .expect("set once");

    orchestrator.enqueue(vec![image("a.jpg", 100), image("b.jpg", 100)]).await;
    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    let observed = probe.observed.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec![(EntryState::Compressing, 0), (EntryState::Compressing, 0)]
    );
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let gate = GatedVideo::default();
    let orchestrator = Arc::new(build(FakeImage::default(), gate.clone()));
    let id = orchestrator.enqueue(vec![video("long.mp4", 400)]).await.accepted[0];

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.compress_all(Quality::default()).await })
    };

    gate.started.notified().await;
    assert!(orchestrator.is_processing());
    assert_eq!(orchestrator.entry(id).await.unwrap().state, EntryState::Compressing);

    let second = orchestrator.compress_all(Quality::default()).await;
    let error = assert_err!(second);
    assert!(matches!(error, CompressError::ReentrantCompressionRequest));

    gate.release.notify_one();
    let summary = runner.await.unwrap().unwrap();
    assert_eq!(summary.entries_done, 1);
    assert!(!orchestrator.is_processing());

    let entry = orchestrator.entry(id).await.unwrap();
    assert_eq!(entry.state, EntryState::Done);
    assert_eq!(entry.result.unwrap().compression_ratio, 75);
}

#[tokio::test]
async fn test_empty_queue_never_starts_processing() {
    let orchestrator = build(FakeImage::default(), FakeVideo::default());
    let mut rx = orchestrator.subscribe();

    let summary = assert_ok!(orchestrator.compress_all(Quality::default()).await);

    assert_eq!(summary.entries_processed, 0);
    assert!(!orchestrator.is_processing());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_quality_is_forwarded_unchanged() {
    let log = CallLog::default();
    let image_service = Arc::new(FakeImage::with_log(&log));
    let video_service = Arc::new(FakeVideo::with_log(&log));
    let config = Config {
        max_dimension: 1280,
        max_size_mb: Some(1.0),
        ..Default::default()
    };
    let orchestrator = CompressionOrchestrator::new(
        config,
        ServiceTable::new(image_service.clone(), video_service.clone()),
    );
    orchestrator.enqueue(vec![image("a.jpg", 100), video("b.mp4", 100)]).await;

    let quality = Quality::new(0.3).unwrap();
    assert_ok!(orchestrator.compress_all(quality).await);

    let image_options = image_service.seen.lock().unwrap().clone();
    assert_eq!(
        image_options,
        vec![ImageOptions {
            target_quality: quality,
            max_dimension: 1280,
            max_size_bytes: Some(1_048_576),
        }]
    );
    let video_options = video_service.seen.lock().unwrap().clone();
    assert_eq!(video_options, vec![VideoOptions { target_quality: quality }]);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let orchestrator = build(FakeImage::default(), FakeVideo::default());
    let ids = orchestrator
        .enqueue(vec![image("a.jpg", 100), image("b.jpg", 300)])
        .await
        .accepted;
    let mut rx = orchestrator.subscribe();

    assert!(orchestrator.remove(ids[0]).await);
    assert!(!orchestrator.remove(ids[0]).await);
    assert_eq!(orchestrator.stats().await.total_original_size, 300);

    orchestrator.clear().await;
    let stats = orchestrator.stats().await;
    assert_eq!(stats.total_entries, 0);
    assert!(!stats.all_done);

    assert_eq!(
        drain(&mut rx),
        vec![QueueEvent::Removed { id: ids[0] }, QueueEvent::Cleared]
    );
}

#[tokio::test]
async fn test_results_are_written_to_output_directory() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config = Config {
        output_path: Some(temp_dir.path().join("out")),
        ..Default::default()
    };
    let orchestrator = build_with_config(config, FakeImage::default(), FakeVideo::default());
    let ids = orchestrator
        .enqueue(vec![image("photo.png", 1_000), video("clip.mov", 800)])
        .await
        .accepted;

    assert_ok!(orchestrator.compress_all(Quality::default()).await);

    let photo = orchestrator.entry(ids[0]).await.unwrap().result.unwrap();
    let photo_path = photo.location.expect("artifact written");
    assert!(photo_path.ends_with("photo_compressed.jpg"));
    assert_eq!(std::fs::read(&photo_path).unwrap().len() as u64, photo.compressed_size);

    let clip = orchestrator.entry(ids[1]).await.unwrap().result.unwrap();
    assert!(clip.location.unwrap().ends_with("clip_compressed.mp4"));
}
