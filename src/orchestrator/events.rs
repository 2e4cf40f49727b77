//! # Queue Events
//!
//! Eventi pubblicati dall'orchestratore a ogni mutazione della coda.
//! I subscriber li ricevono tramite un canale `broadcast`; chi preferisce il
//! polling usa `entries()` / `stats()`.

use crate::queue::{EntryId, EntryState};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Enqueued {
        id: EntryId,
        name: String,
        size: u64,
    },
    Removed {
        id: EntryId,
    },
    Cleared,
    StateChanged {
        id: EntryId,
        state: EntryState,
    },
    Progress {
        id: EntryId,
        percent: u8,
    },
    Completed {
        id: EntryId,
        original_size: u64,
        compressed_size: u64,
        compression_ratio: u8,
        location: Option<PathBuf>,
    },
    Failed {
        id: EntryId,
        error: String,
    },
    ProcessingChanged(bool),
}

impl QueueEvent {
    /// Entry this event refers to, if any
    pub fn entry_id(&self) -> Option<EntryId> {
        match self {
            Self::Enqueued { id, .. }
            | Self::Removed { id }
            | Self::StateChanged { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. } => Some(*id),
            Self::Cleared | Self::ProcessingChanged(_) => None,
        }
    }
}
