mod sqlite_batch_row_repository;
mod sqlite_firing_repository;
mod sqlite_task_repository;

pub use sqlite_batch_row_repository::SqliteBatchRowRepository;
pub use sqlite_firing_repository::SqliteFiringRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
