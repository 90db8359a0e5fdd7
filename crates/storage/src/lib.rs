#![forbid(unsafe_code)]

pub mod json;
pub mod repository;
pub mod sqlite;

pub use repository::{
    DEFAULT_HISTORY_LIMIT, InMemoryRepository, QuestionSetLoader, ResultHistoryRepository,
    SnapshotRepository, Storage, StorageError,
};
