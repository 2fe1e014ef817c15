//! Watch-mode support: file watching and change batching.

pub mod watcher;

pub use watcher::{FileChange, FileWatcher, next_batch};
