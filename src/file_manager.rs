//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery di media.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file in directory
//! - Caricamento di un file in un `SourcePayload` con MIME dedotto dall'estensione
//! - Scrittura dei payload compressi nella directory di output
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati riconosciuti:
//! - **Immagini**: JPG, JPEG, PNG, WebP, GIF, BMP, TIFF, AVIF, HEIC
//! - **Video**: MP4, MOV, AVI, MKV, WebM, M4V
//!
//! Tutto il resto riceve `application/octet-stream` e viene rifiutato dal classifier.
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_files(Path::new("/path/to/media"))?;
//! for file in files {
//!     let payload = FileManager::load_payload(&file).await?;
//! }
//! ```

use crate::media::SourcePayload;
use crate::queue::EntryId;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

const SIZE_UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find every regular file below a directory, sorted for a stable queue order
    pub fn find_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Expand a list of files and directories into files
    pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            if input.is_dir() {
                files.extend(Self::find_files(input)?);
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }
        }
        Ok(files)
    }

    /// Read a file into a payload
    pub async fn load_payload(path: &Path) -> Result<SourcePayload> {
        let bytes = fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(SourcePayload::new(name, Self::guess_mime(path), bytes))
    }

    /// MIME type from the file extension (case-insensitive)
    pub fn guess_mime(path: &Path) -> &'static str {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "avif" => "image/avif",
            "heic" => "image/heic",
            "mp4" | "m4v" => "video/mp4",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            "mkv" => "video/x-matroska",
            "webm" => "video/webm",
            _ => "application/octet-stream",
        }
    }

    /// Extension matching a MIME type produced by the compression services
    pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
        match mime {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/webp" => Some("webp"),
            "video/mp4" => Some("mp4"),
            _ => None,
        }
    }

    /// Name of the artifact written for a compressed entry: `<stem>_compressed[_<id>].<ext>`
    pub fn artifact_name(source: &SourcePayload, mime: &str, id: EntryId, disambiguate: bool) -> String {
        let ext = Self::extension_for_mime(mime)
            .map(str::to_string)
            .or_else(|| source.extension())
            .unwrap_or_else(|| "bin".to_string());

        if disambiguate {
            format!("{}_compressed_{}.{}", source.stem(), id, ext)
        } else {
            format!("{}_compressed.{}", source.stem(), ext)
        }
    }

    /// Write a compressed payload into the output directory and return its path
    pub async fn write_artifact(
        output_dir: &Path,
        source: &SourcePayload,
        mime: &str,
        id: EntryId,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        fs::create_dir_all(output_dir).await?;

        let mut path = output_dir.join(Self::artifact_name(source, mime, id, false));
        if fs::try_exists(&path).await? {
            path = output_dir.join(Self::artifact_name(source, mime, id, true));
        }

        fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Human-readable size: unit from `floor(log1024(bytes))`, value rounded to 2 decimals.
    pub fn format_size(bytes: u64) -> String {
        if bytes == 0 {
            return "0 Bytes".to_string();
        }

        let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
        let exponent = exponent.min(SIZE_UNITS.len() - 1);
        let value = bytes as f64 / 1024f64.powi(exponent as i32);

        // exact ties round up, not to even
        let scaled = value * 100.0;
        let mut cents = scaled.floor();
        if scaled - cents >= 0.5 {
            cents += 1.0;
        }
        let rounded = format!("{:.2}", cents / 100.0);
        let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
        format!("{} {}", trimmed, SIZE_UNITS[exponent])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(0), "0 Bytes");
        assert_eq!(FileManager::format_size(1), "1 Bytes");
        assert_eq!(FileManager::format_size(500), "500 Bytes");
        assert_eq!(FileManager::format_size(1023), "1023 Bytes");
        assert_eq!(FileManager::format_size(1024), "1 KB");
        assert_eq!(FileManager::format_size(1536), "1.5 KB");
        assert_eq!(FileManager::format_size(1_048_576), "1 MB");
        assert_eq!(FileManager::format_size(10_000_000), "9.54 MB");
        assert_eq!(FileManager::format_size(4_000_000), "3.81 MB");
    }

    #[test]
    fn test_format_size_rounds_ties_up() {
        assert_eq!(FileManager::format_size(1152), "1.13 KB");
        assert_eq!(FileManager::format_size(1664), "1.63 KB");
        assert_eq!(FileManager::format_size(1408), "1.38 KB");
        assert_eq!(FileManager::format_size(1_179_648), "1.13 MB");
        assert_eq!(FileManager::format_size(1_207_959_552), "1.13 GB");
        // just below a tie stays down
        assert_eq!(FileManager::format_size(1151), "1.12 KB");
    }

    #[test]
    fn test_format_size_caps_at_gigabytes() {
        assert_eq!(FileManager::format_size(1024u64.pow(4)), "1024 GB");
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(FileManager::guess_mime(Path::new("a/IMG_001.JPG")), "image/jpeg");
        assert_eq!(FileManager::guess_mime(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(FileManager::guess_mime(Path::new("notes.pdf")), "application/octet-stream");
        assert_eq!(FileManager::guess_mime(Path::new("README")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_load_payload_and_find_files() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("trip");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("b.png"), [1u8, 2, 3]).unwrap();
        std::fs::write(temp_dir.path().join("a.mp4"), [0u8; 10]).unwrap();

        let files = FileManager::find_files(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.mp4"));

        let payload = FileManager::load_payload(&files[1]).await.unwrap();
        assert_eq!(payload.name, "b.png");
        assert_eq!(payload.mime, "image/png");
        assert_eq!(payload.size(), 3);
    }

    #[test]
    fn test_expand_inputs_rejects_missing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.jpg");
        assert!(FileManager::expand_inputs(&[missing]).is_err());
    }

    #[tokio::test]
    async fn test_write_artifact_avoids_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let source = SourcePayload::new("clip.mov", "video/quicktime", vec![0u8; 4]);
        let mut queue = crate::queue::Queue::new();
        let first = queue.push(source.clone(), crate::media::MediaKind::Video);
        let second = queue.push(source.clone(), crate::media::MediaKind::Video);

        let a = FileManager::write_artifact(temp_dir.path(), &source, "video/mp4", first, b"aa")
            .await
            .unwrap();
        let b = FileManager::write_artifact(temp_dir.path(), &source, "video/mp4", second, b"bb")
            .await
            .unwrap();

        assert!(a.ends_with("clip_compressed.mp4"));
        assert_ne!(a, b);
        assert_eq!(std::fs::read(&b).unwrap(), b"bb");
    }
}
