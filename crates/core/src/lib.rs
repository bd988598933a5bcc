pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{Result, SchedulerError};
pub use models::{
    BatchRow, BatchRowStatus, FetchOutcome, FetchSpec, FiringOutcome, JobKind, JobOutcome,
    OutcomeStatus, TaskConfig, TaskFiring,
};
pub use traits::{
    ArtifactFetcher, BatchRowRepository, FiringRepository, JobControlService, JobExecutor,
    ResultRecorder, TaskRepository,
};
