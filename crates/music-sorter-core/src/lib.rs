pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod indexer;
pub mod metadata;
pub mod migrator;
pub mod progress;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use dedupe::DuplicateStats;
pub use engine::Pipeline;
pub use error::{Error, Result};
pub use indexer::IndexResult;
pub use metadata::{MetadataReader, MetadataResult, TagReader};
pub use migrator::{MigrationMode, MigrationResult, PathMapping};
pub use progress::{CancelToken, ProgressReporter, ProgressUpdate, SilentReporter, Stage};
