pub mod engine;
pub mod execution_ctx;
pub mod fan_out;
pub mod notifier;
pub mod state;

pub use engine::{Collaborators, ExecutionHandle, ExecutionReport, WorkflowEngine};
pub use execution_ctx::{ExecutionCtx, ExecutionOutcome, StageOutput};
pub use fan_out::{FanOut, FanOutOutcome, FanOutPolicy, WorkerLost};
pub use notifier::Notifier;
pub use state::{StateTransition, WorkflowState};
