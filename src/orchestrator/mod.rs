//! # Orchestrator Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `compression_orchestrator`: Proprietario della coda e macchina a stati per-entry
//! - `events`: Eventi pubblicati verso i subscriber

pub mod compression_orchestrator;
pub mod events;

#[cfg(test)]
mod tests;

pub use compression_orchestrator::{CompressionOrchestrator, EnqueueOutcome};
pub use events::QueueEvent;
