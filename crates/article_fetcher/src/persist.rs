//! On-disk layout of a [`FileDataStore`](crate::FileDataStore).
//!
//! Each article is one JSON document. A document is first written to a hidden
//! partial file in the same directory and then renamed over the previous
//! version, so a reader sees either the old or the new article.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fetch_logging::{fetch_debug, fetch_warn};
use tempfile::NamedTempFile;

use crate::StoreError;

const PARTIAL_PREFIX: &str = ".partial-";
const DOCUMENT_SUFFIX: &str = ".json";

#[derive(Debug, Clone)]
pub(crate) struct ArticleDir {
    root: PathBuf,
}

impl ArticleDir {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory when missing and check that it accepts new files.
    pub(crate) fn prepare(&self) -> Result<(), StoreError> {
        self.ensure_exists()?;
        self.partial_file().map_err(|source| self.unwritable(source))?;
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), StoreError> {
        match fs::metadata(&self.root) {
            Ok(meta) if !meta.is_dir() => {
                return Err(StoreError::NotADirectory(self.root.clone()));
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.root).map_err(|source| self.unwritable(source))?;
            }
            Err(source) => return Err(self.unwritable(source)),
        }
        Ok(())
    }

    /// Replace `filename` with `document`. Returns the path of the document.
    pub(crate) fn write_document(
        &self,
        filename: &str,
        document: &[u8],
    ) -> Result<PathBuf, StoreError> {
        self.ensure_exists()?;

        let target = self.root.join(filename);
        let write_failed = |source: io::Error| StoreError::Write {
            path: target.clone(),
            source,
        };
        let mut partial = self.partial_file().map_err(write_failed)?;
        partial.write_all(document).map_err(write_failed)?;
        partial.as_file_mut().sync_all().map_err(write_failed)?;

        // A rename onto an existing file fails on some platforms.
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(write_failed(err)),
        }
        partial
            .persist(&target)
            .map_err(|err| write_failed(err.error))?;
        Ok(target)
    }

    /// Delete partial files left by writes that never finished.
    pub(crate) fn sweep_partials(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                fetch_warn!("Cannot list store directory {:?}: {}", self.root, err);
                return 0;
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(PARTIAL_PREFIX) || !name.ends_with(DOCUMENT_SUFFIX) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => fetch_warn!("Cannot remove partial article {:?}: {}", name, err),
            }
        }
        if removed > 0 {
            fetch_debug!("Removed {} partial article file(s) from {:?}", removed, self.root);
        }
        removed
    }

    fn partial_file(&self) -> io::Result<NamedTempFile> {
        tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .suffix(DOCUMENT_SUFFIX)
            .tempfile_in(&self.root)
    }

    fn unwritable(&self, source: io::Error) -> StoreError {
        StoreError::Unwritable {
            path: self.root.clone(),
            source,
        }
    }
}
