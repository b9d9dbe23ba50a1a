//! Media intake for the assessor.
//!
//! Only formats the vision endpoint accepts are loaded, and the type
//! check runs before any file I/O or network traffic so an unsupported
//! file costs nothing.

use crate::VisionError;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use std::fs;
use std::path::{Path, PathBuf};

/// Media type by extension, for the formats the endpoint accepts.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// An image read into memory and ready for submission.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, VisionError> {
        let path = path.into();
        let mime = mime_for_path(&path).ok_or_else(|| VisionError::UnsupportedMedia {
            path: path.clone(),
        })?;
        let bytes = fs::read(&path).map_err(|source| VisionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { path, mime, bytes })
    }

    /// Inline `data:` URL for the chat-completions image content block.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64_STANDARD.encode(&self.bytes))
    }
}
