//! Failure modes of the analysis pipeline

use std::path::PathBuf;

/// Errors reported by the data adapters and the analysis steps
///
/// The pipeline orchestrator is the only place where these are acted upon.
/// Every variant aborts the run, except [`Error::MissingOptionalColumn`] which
/// merely causes the step that needed the column to be skipped.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The store could not be reached or opened
    #[error("failed to connect to {target}: {message}")]
    Connection { target: String, message: String },

    /// The source table is absent or could not be read
    #[error("failed to query table {table}: {message}")]
    Query { table: String, message: String },

    /// A column that the analysis cannot do without is absent
    #[error("the dataset must contain a '{column}' column")]
    Schema { column: String },

    /// Writing a result table failed
    #[error("failed to save data to table {table}: {message}")]
    Write { table: String, message: String },

    /// A column that enables an optional analysis step is absent
    #[error("no '{column}' column found in the dataset")]
    MissingOptionalColumn { column: String },

    /// The sentiment lexicon could not be loaded
    #[error("failed to load sentiment lexicon {path:?}: {message}")]
    Lexicon { path: PathBuf, message: String },
}

/// Result type of the analysis pipeline's building blocks
pub type Result<T> = std::result::Result<T, Error>;
