pub mod aggregate;
pub mod error;
pub mod export;
pub mod history;
pub mod merge;
pub mod pipeline;

pub use aggregate::{aggregate, UNKNOWN_LANGUAGE};
pub use error::{ExportError, HistoryCorruptError, PipelineError};
pub use export::{Exporter, RunManifest, CANONICAL_FILE, GENRES_FILE, MANIFEST_FILE, SCHEMA_VERSION};
pub use history::{load_history, write_canonical, History, CANONICAL_COLUMNS};
pub use merge::{merge, MergeOutcome};
pub use pipeline::{CategoryFailure, Pipeline, PipelineEvent, PipelineOptions, RunReport};
