pub mod batch_row;
pub mod fetch;
pub mod firing;
pub mod task;

pub use batch_row::{BatchRow, BatchRowStatus};
pub use fetch::{FetchOutcome, FetchSpec};
pub use firing::{FiringOutcome, JobOutcome, OutcomeStatus, TaskFiring};
pub use task::{JobKind, TaskConfig};
