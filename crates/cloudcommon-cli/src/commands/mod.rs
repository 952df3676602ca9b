pub mod storage;

pub use storage::{StorageArgs, StorageCommand};
