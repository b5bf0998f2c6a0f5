//! Cheap sanity check for cached model files.
//!
//! This is a heuristic, not an integrity check: it only catches files that
//! are obviously truncated or that hold an HTML error page instead of model
//! weights. Use [`crate::ModelInfo::sha256`] when a real checksum is known.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, error};

use crate::error::ModelError;

/// Files larger than this pass regardless of their header.
pub const MIN_MODEL_BYTES: u64 = 1_000_000;

/// Two-byte headers of the containers we know how to load.
///
/// `PK` is a zip archive (`.task` bundles), `GG` the start of `GGUF`.
pub const KNOWN_SIGNATURES: [&[u8; 2]; 2] = [b"PK", b"GG"];

/// Outcome of validating a model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// First two bytes, lossily decoded.
    pub signature: String,
    /// File size in bytes.
    pub size: u64,
    /// Whether the file passed.
    pub valid: bool,
}

/// Validate a model file on disk.
///
/// Errors only when the file cannot be opened or stat'ed.
pub fn validate_model_file(path: &Path) -> Result<Validation, ModelError> {
    let size = std::fs::metadata(path)?.len();

    let mut header = [0u8; 2];
    let mut file = File::open(path)?;
    let read = read_header(&mut file, &mut header)?;

    let known = read == header.len() && KNOWN_SIGNATURES.iter().any(|sig| **sig == header);
    let valid = known || size > MIN_MODEL_BYTES;
    let signature = String::from_utf8_lossy(&header[..read]).into_owned();

    debug!(
        "Model validation: signature='{}', size={}, valid={}",
        signature, size, valid
    );

    Ok(Validation {
        signature,
        size,
        valid,
    })
}

/// Like [`validate_model_file`], but any error counts as invalid.
pub fn is_valid_model_file(path: &Path) -> bool {
    match validate_model_file(path) {
        Ok(validation) => validation.valid,
        Err(e) => {
            error!("Model validation failed for {}: {}", path.display(), e);
            false
        }
    }
}

fn read_header(file: &mut File, header: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
