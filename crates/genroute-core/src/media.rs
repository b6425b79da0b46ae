//! File saving for generated media.
//!
//! Adapters hand over raw bytes or base64 text; this module decodes, names,
//! and writes the file.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::{GenError, Result};
use crate::utils::{file_stamp, safe_filename};

/// Payload to persist.
#[derive(Clone, Debug)]
pub enum MediaData {
    Bytes(Vec<u8>),
    /// Plain base64; a `data:<mime>;base64,` prefix is tolerated.
    Base64(String),
}

impl MediaData {
    /// Decode into raw bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            MediaData::Bytes(b) => Ok(b),
            MediaData::Base64(s) => {
                let raw = match s.split_once(";base64,") {
                    Some((_, rest)) => rest,
                    None => s.as_str(),
                };
                STANDARD
                    .decode(raw.trim())
                    .map_err(|e| GenError::InvalidRequest(format!("invalid base64 payload: {e}")))
            }
        }
    }
}

/// Where and how to save one artifact.
#[derive(Clone, Debug)]
pub struct SaveOptions {
    pub directory: PathBuf,
    /// Exact filename; generated from `kind` and a timestamp when absent.
    pub filename: Option<String>,
    /// `"image"`, `"audio"`, `"video"`.
    pub kind: String,
    /// File extension without the dot.
    pub format: String,
}

impl SaveOptions {
    /// Split a requested output path into directory + filename.
    pub fn for_path(path: &Path, kind: &str, default_format: &str) -> Self {
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(default_format)
            .to_string();
        Self {
            directory,
            filename: path.file_name().and_then(|n| n.to_str()).map(String::from),
            kind: kind.to_string(),
            format,
        }
    }
}

/// Write `data` to disk and return the final path.
pub fn save_media(data: MediaData, opts: &SaveOptions) -> Result<PathBuf> {
    let bytes = data.into_bytes()?;

    std::fs::create_dir_all(&opts.directory)?;

    let filename = match &opts.filename {
        Some(name) => name.clone(),
        None => safe_filename(&format!("{}_{}.{}", opts.kind, file_stamp(), opts.format)),
    };
    let path = opts.directory.join(filename);

    std::fs::write(&path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "saved media");
    Ok(path)
}

/// Filename for result `index` of `total`.
///
/// A single result keeps `name` as-is; several get `stem_0.ext`, `stem_1.ext`, ….
pub fn indexed_filename(name: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{index}.{ext}"),
        _ => format!("{name}_{index}"),
    }
}
