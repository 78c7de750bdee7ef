use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fetch_logging::{fetch_debug, fetch_warn};
use thiserror::Error;

use crate::persist::ArticleDir;
use crate::{deterministic_filename, Article, Title};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store path {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("store directory {path:?} is not writable: {source}")]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write article file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Destination for fetched articles.
pub trait DataStore: Send + Sync {
    fn save_article(&self, article: &Article) -> Result<(), StoreError>;

    fn article(&self, title: &Title) -> Option<Article>;
}

#[derive(Debug, Default)]
pub struct MemoryDataStore {
    articles: Mutex<HashMap<String, Article>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.articles.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataStore for MemoryDataStore {
    fn save_article(&self, article: &Article) -> Result<(), StoreError> {
        let mut articles = self.articles.lock().map_err(|_| StoreError::Poisoned)?;
        articles.insert(article.title.page_key(), article.clone());
        Ok(())
    }

    fn article(&self, title: &Title) -> Option<Article> {
        let articles = self.articles.lock().ok()?;
        articles.get(&title.page_key()).cloned()
    }
}

/// One pretty-printed JSON file per article.
///
/// The directory is created on the first save when missing.
#[derive(Debug, Clone)]
pub struct FileDataStore {
    dir: ArticleDir,
}

impl FileDataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: ArticleDir::new(dir.into()),
        }
    }

    /// Prepare the directory up front and drop partial files left by an
    /// interrupted run.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(dir);
        store.dir.prepare()?;
        store.dir.sweep_partials();
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        self.dir.root()
    }

    pub fn path_for(&self, title: &Title) -> PathBuf {
        self.dir().join(deterministic_filename(title))
    }
}

impl DataStore for FileDataStore {
    fn save_article(&self, article: &Article) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(article)?;
        let path = self
            .dir
            .write_document(&deterministic_filename(&article.title), &content)?;
        fetch_debug!("Saved {} to {:?}", article.title, path);
        Ok(())
    }

    fn article(&self, title: &Title) -> Option<Article> {
        let path = self.path_for(title);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                fetch_warn!("Failed to read stored article {:?}: {}", path, err);
                return None;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(article) => Some(article),
            Err(err) => {
                fetch_warn!("Failed to parse stored article {:?}: {}", path, err);
                None
            }
        }
    }
}
