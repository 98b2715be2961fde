//! Error types for the linker and incremental tiers.

use std::path::PathBuf;
use thiserror::Error;

use crate::extractor::ExtractError;
use crate::incremental::UpdateResult;
use crate::types::{CompositeSymbolId, FileId};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("File not registered: {path}")]
    UnknownFile { path: PathBuf },

    #[error("No file registered with id {id}")]
    UnknownFileId { id: FileId },

    #[error("File id space exhausted ({limit} files)")]
    TooManyFiles { limit: u32 },

    #[error("No extractor registered for {path}")]
    NoExtractor { path: PathBuf },

    #[error("Failed to set up {language} parser: {reason}")]
    ParserSetup { language: String, reason: String },

    #[error("Parser produced no tree for {path}")]
    ParseFailed { path: PathBuf },

    #[error("Symbol extraction failed for {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("Symbol {id} not found")]
    SymbolNotFound { id: CompositeSymbolId },

    #[error(
        "Cascade update depth exceeded limit of {limit} waves (possible circular dependency); {} files already updated",
        .partial.updated_files.len()
    )]
    CascadeOverflow {
        limit: usize,
        partial: Box<UpdateResult>,
    },

    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    /// Partial result attached to a cascade overflow.
    pub fn partial_result(&self) -> Option<&UpdateResult> {
        match self {
            Self::CascadeOverflow { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
