//! JSONL inbound documents: one request or notification per line.
//!
//! Blank lines and `#` comments are skipped. Files are checked for NUL
//! bytes and invalid UTF-8 before any line is parsed.

use lnp_kernel::InboundDocument;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A parsed document and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberedDocument {
    pub line: usize,
    pub document: InboundDocument,
}

pub fn read_documents(reader: impl BufRead) -> Result<Vec<NumberedDocument>, JsonlError> {
    let mut documents = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| JsonlError::Io(line_no + 1, e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let document: InboundDocument = serde_json::from_str(trimmed)
            .map_err(|e| JsonlError::Parse(line_no + 1, e.to_string()))?;
        documents.push(NumberedDocument {
            line: line_no + 1,
            document,
        });
    }
    Ok(documents)
}

pub fn read_documents_from_path(
    path: impl AsRef<Path>,
) -> Result<Vec<NumberedDocument>, JsonlError> {
    let path = path.as_ref();
    let bytes =
        fs::read(path).map_err(|e| JsonlError::Io(0, format!("{}: {e}", path.display())))?;
    validate_bytes(path, &bytes)?;
    read_documents(BufReader::new(bytes.as_slice()))
}

fn validate_bytes(path: &Path, bytes: &[u8]) -> Result<(), JsonlError> {
    if bytes.contains(&0) {
        return Err(JsonlError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(JsonlError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    #[error("line {0}: I/O error: {1}")]
    Io(usize, String),

    #[error("line {0}: parse error: {1}")]
    Parse(usize, String),

    #[error("corrupted input: {0}")]
    Corrupt(String),
}
