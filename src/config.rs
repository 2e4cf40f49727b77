//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di compressione
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità di compressione (0.0-1.0, default: 0.75)
//! - `max_dimension`: Lato massimo delle immagini in pixel (default: 1920)
//! - `max_size_mb`: Budget opzionale di dimensione per immagine (default: None)
//! - `video_max_width`: Larghezza massima video (default: 1280)
//! - `video_preset`: Preset x264 (default: "ultrafast")
//! - `audio_bitrate`: Bitrate audio video (default: "96k")
//! - `video_threads`: Thread per ffmpeg (default: 1)
//! - `output_path`: Directory in cui scrivere i file compressi (default: None)
//! - `json_output`: Output JSON per uso programmatico (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quality: 0.6,
//!     max_dimension: 1280,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for media compression
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compression quality (0.0-1.0, lower = smaller files)
    pub quality: f64,
    /// Longest allowed image side in pixels
    pub max_dimension: u32,
    /// Image size budget in megabytes
    pub max_size_mb: Option<f64>,
    /// Videos wider than this are scaled down keeping aspect ratio
    pub video_max_width: u32,
    /// x264 preset
    pub video_preset: String,
    /// Video audio bitrate
    pub audio_bitrate: String,
    /// Threads handed to ffmpeg
    pub video_threads: u32,
    /// Output directory for compressed files (None = keep results in memory only)
    pub output_path: Option<PathBuf>,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: 0.75,
            max_dimension: 1920,
            max_size_mb: None,
            video_max_width: 1280,
            video_preset: "ultrafast".to_string(),
            audio_bitrate: "96k".to_string(),
            video_threads: 1,
            output_path: None,
            json_output: false,
        }
    }
}

const X264_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast",
    "medium", "slow", "slower", "veryslow", "placebo",
];

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(anyhow::anyhow!("Quality must be between 0.0 and 1.0"));
        }

        if self.max_dimension == 0 {
            return Err(anyhow::anyhow!("Max dimension must be greater than 0"));
        }

        if let Some(max_size_mb) = self.max_size_mb {
            if !(max_size_mb > 0.0) {
                return Err(anyhow::anyhow!("Max size must be greater than 0 MB"));
            }
        }

        if self.video_max_width < 2 {
            return Err(anyhow::anyhow!("Video max width must be at least 2 pixels"));
        }

        if !X264_PRESETS.contains(&self.video_preset.as_str()) {
            return Err(anyhow::anyhow!("Unknown x264 preset: {}", self.video_preset));
        }

        if self.video_threads == 0 {
            return Err(anyhow::anyhow!("Video threads must be greater than 0"));
        }

        if let Some(ref output_path) = self.output_path {
            if output_path.exists() && !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// Image size budget in bytes
    pub fn max_size_bytes(&self) -> Option<u64> {
        self.max_size_mb.map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }

    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("compressify").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
