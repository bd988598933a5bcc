pub mod database;
pub mod recorder;

pub use database::sqlite::{
    SqliteBatchRowRepository, SqliteFiringRepository, SqliteTaskRepository,
};
pub use database::{connect_sqlite, run_migrations};
pub use recorder::DbResultRecorder;
