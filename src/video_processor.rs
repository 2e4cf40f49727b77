//! # Video Processing Module
//!
//! Servizio di compressione video di default basato su FFmpeg.
//!
//! ## Responsabilità:
//! - Transcode H.264 + AAC in MP4 con `+faststart` (pronto per upload/streaming)
//! - Scala i video più larghi di `video_max_width` mantenendo l'aspect ratio
//! - Converte la qualità [0,1] in CRF
//! - Riporta il progresso leggendo `-progress pipe:1` di FFmpeg
//! - Analizza la durata con ffprobe per calcolare la percentuale
//!
//! ## Pipeline di compressione:
//! 1. Scrive il payload in un file temporaneo (estensione originale)
//! 2. Legge la durata con ffprobe (se fallisce il progresso resta a 0 fino alla fine)
//! 3. Lancia FFmpeg:
//!    - Filtro: `scale='min(W,iw)':-2`
//!    - Codec video: libx264, preset configurabile (default ultrafast)
//!    - CRF: `round(51 - quality * 28)` (0.75 → 30, 1.0 → 23, 0.0 → 51)
//!    - Codec audio: AAC, bitrate configurabile (default 96k)
//!    - Thread: configurabile (default 1)
//! 4. Legge l'output temporaneo e lo restituisce come `video/mp4`
//!
//! ## Controllo qualità (CRF):
//! - 23: Alta qualità (quality = 1.0)
//! - 30: Default bilanciato (quality = 0.75)
//! - 51: Minima qualità, file più piccoli (quality = 0.0)
//!
//! ## Dipendenze richieste:
//! - `ffmpeg`: Transcode
//! - `ffprobe`: Durata del video
//!
//! ## Esempio:
//! ```rust,ignore
//! let processor = VideoProcessor::new(config);
//! let output = processor.compress(&payload, &options, sink).await?;
//! ```

use crate::args;
use crate::compressor::{CompressedOutput, ProgressSink, Quality, VideoCompressor, VideoOptions};
use crate::config::Config;
use crate::error::{CompressError, Result};
use crate::media::{MediaKind, SourcePayload};
use crate::platform::PlatformCommands;
use crate::utils::path_arg;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const CRF_BEST: f64 = 23.0;
const CRF_WORST: f64 = 51.0;

/// Handles video compression
pub struct VideoProcessor {
    config: Config,
}

impl VideoProcessor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Map quality [0,1] to an x264 CRF value
    pub fn crf_for(quality: Quality) -> u8 {
        (CRF_WORST - quality.value() * (CRF_WORST - CRF_BEST)).round() as u8
    }

    fn transcode_args(&self, input: &Path, output: &Path, crf: u8) -> Result<Vec<String>> {
        let scale = format!("scale='min({},iw)':-2", self.config.video_max_width);
        Ok(args![
            "-y",
            "-hide_banner",
            "-loglevel", "error",
            "-i", path_arg(input)?,
            "-vf", scale,
            "-c:v", "libx264",
            "-preset", self.config.video_preset,
            "-crf", crf,
            "-threads", self.config.video_threads,
            "-c:a", "aac",
            "-b:a", self.config.audio_bitrate,
            "-movflags", "+faststart",
            "-progress", "pipe:1",
            "-nostats",
            path_arg(output)?,
        ])
    }

    /// Duration in seconds, if ffprobe can read it
    async fn probe_duration(&self, input: &Path) -> Option<f64> {
        let ffprobe_cmd = PlatformCommands::instance().get_command("ffprobe");
        let input = path_arg(input).ok()?;

        let output = Command::new(ffprobe_cmd)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", &input])
            .output()
            .await
            .map_err(|e| warn!("Failed to execute {}: {}", ffprobe_cmd, e))
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
        info["format"]["duration"]
            .as_str()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0)
    }

    async fn run_ffmpeg(&self, args: &[String], duration: Option<f64>, progress: &ProgressSink) -> Result<()> {
        let ffmpeg_cmd = PlatformCommands::instance().get_command("ffmpeg");
        debug!("Running {} {}", ffmpeg_cmd, args.join(" "));

        let mut child = Command::new(ffmpeg_cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CompressError::FFmpeg(format!("Failed to execute {}: {}", ffmpeg_cmd, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CompressError::FFmpeg("ffmpeg stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| CompressError::FFmpeg("ffmpeg stderr not captured".to_string()))?;

        let read_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut last = 0u8;
            while let Some(line) = lines.next_line().await? {
                if let Some(percent) = parse_progress_line(&line, duration) {
                    if percent > last {
                        last = percent;
                        progress.report(percent);
                    }
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let read_stderr = async {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer).await;
            buffer
        };

        let (progress_result, stderr_text) = futures::future::join(read_progress, read_stderr).await;
        progress_result?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(CompressError::FFmpeg(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr_text.trim()
            )));
        }

        Ok(())
    }

    /// Check if required tools are available
    pub async fn check_dependencies() -> Result<()> {
        let platform = PlatformCommands::instance();
        for tool in ["ffmpeg", "ffprobe"] {
            if !platform.is_command_available(tool).await {
                return Err(CompressError::MissingDependency(format!(
                    "{} is required for video processing",
                    tool
                )));
            }
        }
        Ok(())
    }
}

/// Percent complete from one `key=value` line of ffmpeg's `-progress` output.
pub fn parse_progress_line(line: &str, duration: Option<f64>) -> Option<u8> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(100),
        // despite its name, out_time_ms is in microseconds too
        "out_time_us" | "out_time_ms" => {
            let duration = duration?;
            let micros = value.parse::<i64>().ok()?.max(0);
            let percent = (micros as f64 / 1_000_000.0) / duration * 100.0;
            Some(percent.floor().clamp(0.0, 99.0) as u8)
        }
        _ => None,
    }
}

#[async_trait]
impl VideoCompressor for VideoProcessor {
    async fn compress(
        &self,
        payload: &SourcePayload,
        options: &VideoOptions,
        progress: ProgressSink,
    ) -> Result<CompressedOutput> {
        info!("Starting video transcode: {} ({} bytes)", payload.name, payload.size());
        let start_time = std::time::Instant::now();

        let suffix = format!(".{}", payload.extension().unwrap_or_else(|| "mp4".to_string()));
        let input_file = tempfile::Builder::new().prefix("input_").suffix(&suffix).tempfile()?;
        let output_file = NamedTempFile::with_suffix(".mp4")?;

        tokio::fs::write(input_file.path(), &payload.bytes[..]).await?;

        let duration = self.probe_duration(input_file.path()).await;
        if duration.is_none() {
            warn!("Could not read duration of {}, progress will jump to 100", payload.name);
        }

        let crf = Self::crf_for(options.target_quality);
        let args = self.transcode_args(input_file.path(), output_file.path(), crf)?;

        self.run_ffmpeg(&args, duration, &progress)
            .await
            .map_err(|e| CompressError::service(MediaKind::Video, e.to_string()))?;

        let bytes = tokio::fs::read(output_file.path()).await?;
        info!(
            "Video transcode completed in {:.1}s: {} -> {} bytes",
            start_time.elapsed().as_secs_f64(),
            payload.size(),
            bytes.len()
        );

        // Both temp files are deleted when they go out of scope
        Ok(CompressedOutput::new(bytes, "video/mp4"))
    }
}
