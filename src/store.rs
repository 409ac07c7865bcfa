//! The result document plus its on-disk copy.
//!
//! Every accepted record is followed by a full rewrite of the document: serialize, write to a
//! temp file beside the target, fsync, rename over the target. A crash at any point leaves either
//! the previous complete document or the new one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{PersistError, StoreError};
use crate::schema::{MeasurementRecord, ResultsDocument};
use crate::Algorithm;

#[derive(Debug)]
pub struct ResultStore {
    document: ResultsDocument,
    path: Option<PathBuf>,
}

impl ResultStore {
    /// A store that rewrites `path` after every append.
    pub fn create(document: ResultsDocument, path: impl Into<PathBuf>) -> Self {
        Self {
            document,
            path: Some(path.into()),
        }
    }

    /// A store with no backing file; `append` never fails.
    pub fn in_memory(document: ResultsDocument) -> Self {
        Self {
            document,
            path: None,
        }
    }

    /// Read a persisted document. `Ok(None)` when nothing has been written yet.
    pub fn load(path: &Path) -> Result<Option<ResultsDocument>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn document(&self) -> &ResultsDocument {
        &self.document
    }

    pub fn into_document(self) -> ResultsDocument {
        self.document
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record `record` under `(algorithm, run)` and persist the whole document.
    ///
    /// The record is kept in memory even when the write fails.
    pub fn append(
        &mut self,
        algorithm: Algorithm,
        run: u32,
        record: MeasurementRecord,
    ) -> Result<(), PersistError> {
        self.document
            .compressions
            .entry_mut(algorithm.as_str())
            .run_mut(run)
            .results
            .push(record);
        self.flush()
    }

    /// Persist the current document (no-op for in-memory stores).
    pub fn flush(&self) -> Result<(), PersistError> {
        match &self.path {
            Some(path) => write_atomic(path, &self.document),
            None => Ok(()),
        }
    }
}

fn write_atomic(path: &Path, document: &ResultsDocument) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(document)?;
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
