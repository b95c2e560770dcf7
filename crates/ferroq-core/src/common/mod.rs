pub mod config;
pub mod deadline;
pub mod error;
pub mod types;

pub use config::QueueConfig;
pub use error::{Error, InvokeError, Result, StoreError};
pub use types::{Batch, ShardCounter, ShardId, SubmitRequest, Task, TaskId};
