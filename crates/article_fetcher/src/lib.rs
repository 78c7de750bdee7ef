//! Article fetcher: section requests, delivery contract and persistence.
mod article;
mod delivery;
mod engine;
mod fetcher;
mod filename;
mod manager;
mod mobileview;
mod persist;
mod store;
mod title;
mod types;

pub use article::{Article, Editor, Section};
pub use engine::{EngineError, EngineEvent, EngineHandle, JobId};
pub use fetcher::{ArticleFetcher, FetchHandle, FetchId};
pub use filename::deterministic_filename;
pub use manager::{FetchSettings, HttpManager, ProgressSink, ReqwestManager};
pub use mobileview::{decode_sections, sections_request_url};
pub use store::{DataStore, FileDataStore, MemoryDataStore, StoreError};
pub use title::{Site, Title, TitleError};
pub use types::{FailureKind, FetchError, Response, ResponseMetadata, TransferProgress};
