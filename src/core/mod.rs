pub mod comparator;
pub mod engine;
pub mod scanner;

pub use comparator::{FileComparator, SyncAction, SyncPlan};
pub use engine::{DirectoryRole, SyncConfig, SyncDirectory, SyncEngine, SyncMode, SyncReport};
pub use scanner::{FileScanner, FileSet, SENTINEL_FILE};
