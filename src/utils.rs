use std::hash::Hasher;
use std::io;
use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHasher;
use unicode_normalization::UnicodeNormalization;

use crate::errors::{Result, RetrievalError};

lazy_static! {
    // A newline, optional horizontal whitespace, then another newline.
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\r?\n[ \t]*\r?\n").unwrap();
}

/// Splits text into paragraphs at blank lines, dropping whitespace-only pieces.
/// Order is preserved.
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(str::to_string)
        .collect()
}

/// NFC-normalizes text so equal text always embeds the same way
pub fn normalize_text(text: &str) -> String {
    text.nfc().collect()
}

pub fn content_hash(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(text.as_bytes());
    hasher.finish()
}

/// Reads the document at `path`, giving up after `timeout`.
pub async fn load_document(path: &Path, timeout: Duration) -> Result<String> {
    let read = tokio::time::timeout(timeout, tokio::fs::read_to_string(path)).await;

    let source = match read {
        Ok(Ok(content)) => return Ok(content),
        Ok(Err(e)) => e,
        Err(_) => io::Error::new(
            io::ErrorKind::TimedOut,
            format!("read did not finish within {timeout:?}"),
        ),
    };

    Err(RetrievalError::DocumentUnavailable {
        path: path.to_path_buf(),
        source,
    })
}
