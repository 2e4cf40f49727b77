//! # Asset Compressify Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `media`: Payload sorgente e classificazione immagine/video
//! - `queue`: Entry, stati, risultati e statistiche aggregate
//! - `compressor`: Contratti dei servizi di compressione e tabella di dispatch
//! - `image_processor`: Re-encode delle immagini (JPEG/PNG)
//! - `video_processor`: Transcode video con FFmpeg
//! - `orchestrator`: Orchestratore della coda (il core)
//! - `file_manager`: Operazioni sui file e formattazione dimensioni
//! - `progress`: Progress bar e riepilogo del run
//! - `json_output`: Output JSON per uso programmatico
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use asset_compressify::{CompressionOrchestrator, Config, Quality};
//!
//! let orchestrator = CompressionOrchestrator::with_default_services(Config::default());
//! orchestrator.enqueue(payloads).await;
//! orchestrator.compress_all(Quality::new(0.75)?).await?;
//! println!("{:?}", orchestrator.stats().await);
//! ```

pub mod compressor;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod media;
pub mod orchestrator;
pub mod platform;
pub mod progress;
pub mod queue;
pub mod utils;
pub mod video_processor;

pub use compressor::{Quality, ServiceTable};
pub use config::Config;
pub use error::CompressError;
pub use media::{classify, Classification, MediaKind, SourcePayload};
pub use orchestrator::{CompressionOrchestrator, QueueEvent};
pub use queue::{AggregateStats, EntryId, EntryState, QueueEntry};
