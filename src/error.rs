// src/error.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while extracting, caching or analyzing a conversation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to parse '{input}': {reason}")]
    Parse { input: String, reason: String },
    #[error("Malformed message #{index}: missing {missing}")]
    Extraction { index: usize, missing: &'static str },
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV error at cache row {row}: {source}")]
    Csv {
        row: u64,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to save chart to '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl Error {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        Error::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
