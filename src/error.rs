//! Error taxonomy for the engine.
//!
//! Every failure is returned at the point of detection. Nothing in the engine
//! retries; that decision belongs to the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::data::Axis;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Dataset unreadable or missing required columns. Fatal at startup.
    #[error("failed to load dataset {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// A filter named a label that does not exist on the axis.
    #[error("label {label:?} does not exist on the {axis} axis")]
    InvalidFilter { axis: Axis, label: String },

    /// The cascading filters leave nothing to choose from on this axis.
    #[error("no {axis} options have data under the current selection")]
    EmptyOptions { axis: Axis },

    /// Plotting configuration document is malformed.
    #[error("malformed plotting config {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    /// Writing notes or plotting configuration failed.
    #[error("failed to write {path}: {reason}")]
    StoreWrite { path: PathBuf, reason: String },

    /// Opening or reading the notes store failed.
    #[error("failed to read {path}: {reason}")]
    StoreRead { path: PathBuf, reason: String },

    /// The dataset's source-scenarios do not have the expected PRIMAP-hist
    /// release layout.
    #[error("unexpected source-scenario layout: {reason}")]
    SourceLayout { reason: String },
}

impl EngineError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::Load { path: path.into(), reason: reason.to_string() }
    }

    pub fn store_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::StoreWrite { path: path.into(), reason: reason.to_string() }
    }

    pub fn store_read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::StoreRead { path: path.into(), reason: reason.to_string() }
    }

    pub fn config_parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        EngineError::ConfigParse { path: path.into(), reason: reason.to_string() }
    }

    pub fn source_layout(reason: impl ToString) -> Self {
        EngineError::SourceLayout { reason: reason.to_string() }
    }

    /// Errors an interactive session should render as an empty state rather
    /// than abort on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::InvalidFilter { .. } | EngineError::EmptyOptions { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
