use media_history_sources::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

/// The previous canonical dataset exists but cannot be trusted
#[derive(Debug, Error)]
#[error("history file {} is unreadable: {reason}", .path.display())]
pub struct HistoryCorruptError {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("failed to write {}: {reason}", .path.display())]
pub struct ExportError {
    pub path: PathBuf,
    pub reason: String,
}

/// Errors that abort a whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("load stage: {0}")]
    HistoryCorrupt(#[from] HistoryCorruptError),

    #[error("normalize stage: {0}")]
    Schema(#[from] SchemaError),

    #[error("fetch stage: no category could be fetched ({})", .failures.join("; "))]
    NoCategorySucceeded { failures: Vec<String> },

    #[error("export stage: {0}")]
    Export(#[from] ExportError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::HistoryCorrupt(_) => "load",
            PipelineError::Schema(_) => "normalize",
            PipelineError::NoCategorySucceeded { .. } => "fetch",
            PipelineError::Export(_) => "export",
        }
    }
}
