//! Error types for the sweep harness.
//!
//! Only [`SetupError`] is fatal. Everything else degrades to partial results.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Problems detected before the first benchmark invocation. The sweep never starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A sweep needs at least one run per algorithm.
    #[error("--runs must be at least 1 (got {0})")]
    InvalidRuns(u32),

    /// The file filter does not compile as a regular expression.
    #[error("invalid file filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The result document cannot be written at the requested location.
    #[error("cannot use output path {}: {reason}", path.display())]
    OutputPath { path: PathBuf, reason: String },

    /// The benchmarking tool is not where the configuration says it is.
    #[error("benchmark tool not found: {}", path.display())]
    ToolNotFound { path: PathBuf },

    /// The sweep was configured with an empty algorithm list.
    #[error("no algorithms selected")]
    NoAlgorithms,
}

/// Failure to drive one child process to completion.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The program could not be started at all.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading the merged output stream or waiting on the child failed.
    #[error("i/o error while running benchmark: {0}")]
    Io(#[from] io::Error),

    /// The child exceeded the configured per-invocation timeout and was killed.
    #[error("benchmark timed out after {0:?}")]
    TimedOut(Duration),

    /// The operator interrupted the sweep; the child was killed.
    #[error("interrupted")]
    Interrupted,
}

/// Writing the result document failed. The in-memory document stays authoritative.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reading a previously persisted result document failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed result document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// The baseline algorithm has no recorded samples (or a zero average), so nothing can be
    /// expressed relative to it. `baseline` is empty when the algorithm is not known.
    #[error(
        "baseline {} has no results",
        if baseline.is_empty() { "value" } else { baseline.as_str() }
    )]
    MissingBaseline { baseline: String },
}

impl StatsError {
    pub fn for_baseline(name: &str) -> Self {
        StatsError::MissingBaseline {
            baseline: name.to_string(),
        }
    }
}
