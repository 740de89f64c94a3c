//! File ingestion: content hashing, staging into the uploads directory, and
//! reading upstream-extracted page text.
//!
//! PDF/OCR text extraction is a supplied capability; TaxClaw consumes page
//! text, it does not produce it. The page-text reader here handles the plain
//! UTF-8 handoff format (one page per form-feed-separated block).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::pipeline::classify::PageText;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a file")]
    NotAFile(PathBuf),

    #[error("page text is not valid UTF-8: {0}")]
    InvalidText(PathBuf),
}

/// A staged source file, shared by every record extracted from it.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    /// SHA-256 of the content, hex.
    pub hash: String,
    pub original_filename: String,
    pub stored_path: PathBuf,
}

/// SHA-256 content hash, hex-encoded.
pub fn sha256_hex(path: &Path) -> Result<String, IngestError> {
    let content = std::fs::read(path)?;
    let hash = Sha256::digest(&content);
    Ok(hash.iter().map(|b| format!("{b:02x}")).collect())
}

/// Copy a source file into the uploads directory as `<hash12>_<name>`.
/// Idempotent: identical bytes land on the same destination path.
pub fn stage_file(src: &Path, uploads_dir: &Path) -> Result<IngestedFile, IngestError> {
    if !src.is_file() {
        return Err(IngestError::NotAFile(src.to_path_buf()));
    }
    let hash = sha256_hex(src)?;
    let original_filename = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    std::fs::create_dir_all(uploads_dir)?;
    let dest = uploads_dir.join(format!("{}_{original_filename}", &hash[..12]));
    if !dest.exists() {
        std::fs::copy(src, &dest)?;
    }

    Ok(IngestedFile {
        hash,
        original_filename,
        stored_path: dest,
    })
}

/// Read upstream-extracted page text. Pages are separated by form feeds;
/// a file without any form feed is a single page.
pub fn read_page_text(path: &Path) -> Result<Vec<PageText>, IngestError> {
    let bytes = std::fs::read(path)?;
    let text =
        String::from_utf8(bytes).map_err(|_| IngestError::InvalidText(path.to_path_buf()))?;

    Ok(text
        .split('\u{c}')
        .enumerate()
        .map(|(i, page)| PageText {
            number: (i + 1) as u32,
            text: page.to_string(),
        })
        .collect())
}
