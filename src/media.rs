//! # Media Classification Module
//!
//! Distingue immagini e video a partire dalla categoria MIME dichiarata.
//!
//! ## Responsabilità:
//! - Definisce `SourcePayload`, il file originale immutabile (bytes, nome, MIME)
//! - Definisce `MediaKind`, la variante taggata usata per il dispatch ai servizi
//! - `classify()`: funzione pura e totale sul prefisso MIME
//!
//! Un file `Unsupported` viene rifiutato all'enqueue, mai in fase di compressione.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Original file submitted by the user. Immutable once created.
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl SourcePayload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// File name without its last extension
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// Lowercased last extension, if any
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext.to_lowercase())
    }
}

/// Media categories that have a compression service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Outcome of classifying a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Supported(MediaKind),
    Unsupported,
}

impl Classification {
    pub fn media_kind(self) -> Option<MediaKind> {
        match self {
            Self::Supported(kind) => Some(kind),
            Self::Unsupported => None,
        }
    }
}

/// Classify a payload by the category prefix of its declared MIME type.
pub fn classify(payload: &SourcePayload) -> Classification {
    classify_mime(&payload.mime)
}

pub fn classify_mime(mime: &str) -> Classification {
    let Some((category, _)) = mime.split_once('/') else {
        return Classification::Unsupported;
    };
    let category = category.trim().to_ascii_lowercase();

    match category.as_str() {
        "image" => Classification::Supported(MediaKind::Image),
        "video" => Classification::Supported(MediaKind::Video),
        _ => Classification::Unsupported,
    }
}
