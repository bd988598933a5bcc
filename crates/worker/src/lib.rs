pub mod batch;
pub mod convert;
pub mod fetcher;
pub mod runner;

pub use batch::{BatchCall, BatchInvoker, CallResponse, HttpBatchCaller};
pub use convert::unl_gz_to_csv;
pub use fetcher::UnlFetcher;
pub use runner::JobRunner;
