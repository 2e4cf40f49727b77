//! # Queue Module
//!
//! Questo modulo contiene il modello dati della coda di compressione.
//!
//! ## Strutture dati:
//! - `EntryId`: Identificatore opaco, unico per tutta la vita della coda
//! - `EntryState`: `Pending | Compressing | Done | Failed`
//! - `QueueEntry`: Un file e il suo ciclo di vita di compressione
//! - `CompressionResult`: Payload compresso, dimensioni e ratio
//! - `Queue`: Sequenza ordinata (l'ordine di inserimento guida elaborazione e display)
//! - `AggregateStats`: Statistiche derivate, ricalcolate a ogni lettura
//!
//! ## Invarianti:
//! - `result` presente sse lo stato è `Done`, impostato al più una volta
//! - `compression_ratio` mai negativo: se l'output non è più piccolo si tiene l'originale

use crate::media::{MediaKind, SourcePayload};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Opaque identifier of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Pending,
    Compressing,
    Done,
    Failed,
}

impl EntryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Outcome of a successful compression
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub payload: Arc<[u8]>,
    pub mime: String,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: u8,
    /// Where the compressed payload was written, when an output directory is configured
    pub location: Option<PathBuf>,
}

impl CompressionResult {
    /// Build a result, keeping the original payload when the compressed one is not smaller.
    pub fn new(source: &SourcePayload, payload: Vec<u8>, mime: String) -> Self {
        let original_size = source.size();
        let compressed_size = payload.len() as u64;

        if original_size == 0 || compressed_size >= original_size {
            return Self {
                payload: source.bytes.clone(),
                mime: source.mime.clone(),
                original_size,
                compressed_size: original_size,
                compression_ratio: 0,
                location: None,
            };
        }

        Self {
            payload: payload.into(),
            mime,
            original_size,
            compressed_size,
            compression_ratio: compression_ratio(original_size, compressed_size),
            location: None,
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }
}

/// Integer percent reduction, floor-rounded and clamped to 0.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> u8 {
    if original_size == 0 || compressed_size >= original_size {
        return 0;
    }
    let saved = (original_size - compressed_size) as u128;
    (saved * 100 / original_size as u128) as u8
}

/// One user-submitted file and its compression lifecycle
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: EntryId,
    pub source: Arc<SourcePayload>,
    pub kind: MediaKind,
    pub state: EntryState,
    pub progress: u8,
    pub result: Option<CompressionResult>,
    pub error: Option<String>,
}

impl QueueEntry {
    fn new(id: EntryId, source: SourcePayload, kind: MediaKind) -> Self {
        Self {
            id,
            source: Arc::new(source),
            kind,
            state: EntryState::Pending,
            progress: 0,
            result: None,
            error: None,
        }
    }

    /// Size used for aggregate totals: compressed if available, original otherwise
    pub fn effective_size(&self) -> u64 {
        self.result
            .as_ref()
            .map(|r| r.compressed_size)
            .unwrap_or_else(|| self.source.size())
    }
}

/// Ordered sequence of entries. Only the orchestrator mutates it.
#[derive(Debug, Default)]
pub struct Queue {
    entries: Vec<QueueEntry>,
    next_id: u64,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new pending entry and return its fresh id
    pub fn push(&mut self, source: SourcePayload, kind: MediaKind) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.push(QueueEntry::new(id, source, kind));
        id
    }

    pub fn remove(&mut self, id: EntryId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Drop every entry. Ids keep increasing so old handles never alias new entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut QueueEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of the entries still waiting for compression, in queue order
    pub fn pending_ids(&self) -> Vec<EntryId> {
        self.entries
            .iter()
            .filter(|e| e.state == EntryState::Pending && e.result.is_none())
            .map(|e| e.id)
            .collect()
    }

    pub fn stats(&self) -> AggregateStats {
        AggregateStats::from_entries(&self.entries)
    }
}

/// Statistics derived from a queue snapshot. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub total_entries: usize,
    pub done_entries: usize,
    pub failed_entries: usize,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub total_savings_percent: u32,
    pub all_done: bool,
    pub has_pending: bool,
}

impl AggregateStats {
    pub fn from_entries(entries: &[QueueEntry]) -> Self {
        let total_original_size: u64 = entries.iter().map(|e| e.source.size()).sum();
        let total_compressed_size: u64 = entries.iter().map(QueueEntry::effective_size).sum();

        let total_savings_percent = if total_original_size > 0 {
            let kept = total_compressed_size as f64 / total_original_size as f64;
            ((1.0 - kept) * 100.0).round().max(0.0) as u32
        } else {
            0
        };

        Self {
            total_entries: entries.len(),
            done_entries: entries.iter().filter(|e| e.state == EntryState::Done).count(),
            failed_entries: entries.iter().filter(|e| e.state == EntryState::Failed).count(),
            total_original_size,
            total_compressed_size,
            total_savings_percent,
            all_done: !entries.is_empty() && entries.iter().all(|e| e.result.is_some()),
            has_pending: entries.iter().any(|e| e.result.is_none()),
        }
    }

    pub fn bytes_saved(&self) -> u64 {
        self.total_original_size.saturating_sub(self.total_compressed_size)
    }
}
