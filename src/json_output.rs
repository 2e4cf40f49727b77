//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per comunicazione con altri processi.
//!
//! ## Responsabilità:
//! - Emette messaggi JSON line-delimited su stdout
//! - Traduce gli eventi della coda (`QueueEvent`) in messaggi stabili
//! - Fornisce il riepilogo finale con `AggregateStats`
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del run (entry accettate e rifiutate)
//! - `rejected`: File rifiutato all'enqueue
//! - `entry_start`: Un'entry entra in `compressing`
//! - `progress`: Progresso di un'entry
//! - `entry_complete`: Entry `done` con dimensioni e ratio
//! - `entry_failed`: Entry `failed` con l'errore
//! - `complete`: Fine del run con statistiche aggregate
//! - `error`: Errore generale

use crate::progress::RunSummary;
use crate::queue::{AggregateStats, EntryId};
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        total_entries: usize,
        rejected: usize,
        quality: f64,
    },
    Rejected {
        name: String,
        reason: String,
    },
    EntryStart {
        id: EntryId,
        name: String,
        size: u64,
    },
    Progress {
        id: EntryId,
        percent: u8,
    },
    EntryComplete {
        id: EntryId,
        name: String,
        original_size: u64,
        compressed_size: u64,
        compression_ratio: u8,
        location: Option<PathBuf>,
    },
    EntryFailed {
        id: EntryId,
        name: String,
        error: String,
    },
    Complete {
        summary: RunSummary,
        stats: AggregateStats,
        duration_seconds: f64,
    },
    Error {
        message: String,
    },
}

impl JsonMessage {
    /// Serialize as one line on stdout
    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to serialize JSON message: {}", e),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
