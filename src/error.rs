//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` enum per categorizzare tutti gli errori possibili
//! - Distingue gli errori di ingestione (sincroni) da quelli per-entry (recuperati)
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `UnsupportedMediaKind`: File né immagine né video, rifiutato all'enqueue
//! - `CompressionServiceFailure`: Errore di un servizio di compressione, recuperato per-entry
//! - `ReentrantCompressionRequest`: `compress_all` invocato mentre un run è già attivo
//! - `Io` / `Image` / `FFmpeg`: Errori interni dei servizi di default
//! - `MissingDependency`: Tool esterno mancante (ffmpeg, ffprobe)
//! - `Validation`: Errori di validazione input
//!
//! ## Politica di propagazione:
//! Solo `UnsupportedMediaKind` arriva al chiamante di `enqueue`. Ogni errore
//! di compressione diventa lo stato `Failed` della singola entry e non
//! interrompe mai il run.
//!
//! ## Esempio:
//! ```rust,ignore
//! if !tool_exists {
//!     return Err(CompressError::MissingDependency("ffmpeg".to_string()));
//! }
//! ```

use crate::media::MediaKind;

/// Custom error types for media compression
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("Unsupported media kind for {name}: {mime}")]
    UnsupportedMediaKind { name: String, mime: String },

    #[error("{kind} compression failed: {reason}")]
    CompressionServiceFailure { kind: MediaKind, reason: String },

    #[error("A compression run is already in progress")]
    ReentrantCompressionRequest,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl CompressError {
    /// Shorthand for a service failure of the given media kind
    pub fn service(kind: MediaKind, reason: impl Into<String>) -> Self {
        Self::CompressionServiceFailure {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = CompressError> = std::result::Result<T, E>;
