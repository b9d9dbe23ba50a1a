//! Imagery assessment against an OpenAI-compatible vision endpoint.
//!
//! Feed it an image file, get back a structured [`Assessment`] of what
//! the model saw. The boundary is strict on input (media type checked
//! before anything is read or sent) and forgiving on output (model text
//! is mined for the first parseable JSON object).

pub mod assessment;
pub mod client;
pub mod media;

use std::path::PathBuf;
use thiserror::Error;

pub use assessment::{extract_assessment, Assessment};
pub use client::{VisionClient, USER_AGENT};
pub use media::{mime_for_path, MediaFile};

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("unsupported media type: {}", .path.display())]
    UnsupportedMedia { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("vision request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vision endpoint rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("vision endpoint returned HTTP {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("vision response had no choices")]
    EmptyResponse,

    #[error("assessment not parseable: {reason}")]
    MalformedAssessment { reason: String },
}
