pub mod executor;
pub mod repository;
pub mod scheduler;

pub use executor::{ArtifactFetcher, JobExecutor, ResultRecorder};
pub use repository::{BatchRowRepository, FiringRepository, TaskRepository};
pub use scheduler::JobControlService;
