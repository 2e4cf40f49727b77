//! # Compression Service Contracts
//!
//! Contratti dei servizi di compressione usati dall'orchestratore.
//!
//! ## Responsabilità:
//! - `ImageCompressor`: re-encode atomico di un'immagine (nessun progress intermedio)
//! - `VideoCompressor`: transcode lento che riporta il progresso su un `ProgressSink`
//! - `ServiceTable`: tabella di dispatch indicizzata per `MediaKind`
//! - `Quality`: scalare [0,1] passato invariato al servizio scelto
//!
//! I due servizi sono liberi di interpretare la qualità in modo diverso
//! (qualità JPEG vs CRF), l'orchestratore non la modifica mai.

use crate::error::{CompressError, Result};
use crate::media::{MediaKind, SourcePayload};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Quality scalar in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quality(f64);

impl Quality {
    pub fn new(value: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(CompressError::Validation(format!(
                "Quality must be between 0.0 and 1.0, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Build from a slider percentage (0-100)
    pub fn from_percent(percent: u8) -> Result<Self> {
        Self::new(f64::from(percent) / 100.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(0.75)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    pub target_quality: Quality,
    pub max_dimension: u32,
    /// Output size budget in bytes, if any
    pub max_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoOptions {
    pub target_quality: Quality,
}

/// Re-encoded payload returned by a service
#[derive(Debug, Clone)]
pub struct CompressedOutput {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl CompressedOutput {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Sending half of a per-entry progress channel
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: mpsc::UnboundedSender<u8>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Sink that drops every report
    pub fn detached() -> Self {
        Self::channel().0
    }

    pub fn report(&self, percent: u8) {
        // receiver gone means nobody is watching any more
        let _ = self.sender.send(percent.min(100));
    }
}

#[async_trait]
pub trait ImageCompressor: Send + Sync {
    async fn compress(&self, payload: &SourcePayload, options: &ImageOptions) -> Result<CompressedOutput>;
}

#[async_trait]
pub trait VideoCompressor: Send + Sync {
    /// Reports must be non-decreasing integers in [0, 100].
    async fn compress(
        &self,
        payload: &SourcePayload,
        options: &VideoOptions,
        progress: ProgressSink,
    ) -> Result<CompressedOutput>;
}

/// Service selected for one media kind
pub enum Service<'a> {
    Image(&'a dyn ImageCompressor),
    Video(&'a dyn VideoCompressor),
}

/// Dispatch table from media kind to compression service
#[derive(Clone)]
pub struct ServiceTable {
    image: Arc<dyn ImageCompressor>,
    video: Arc<dyn VideoCompressor>,
}

impl ServiceTable {
    pub fn new(image: Arc<dyn ImageCompressor>, video: Arc<dyn VideoCompressor>) -> Self {
        Self { image, video }
    }

    pub fn service_for(&self, kind: MediaKind) -> Service<'_> {
        match kind {
            MediaKind::Image => Service::Image(self.image.as_ref()),
            MediaKind::Video => Service::Video(self.video.as_ref()),
        }
    }
}
