pub mod task_executor;

pub use task_executor::{panic_message, RetryPolicy, TaskExecutor};
