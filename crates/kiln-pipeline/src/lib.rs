pub mod error;
pub mod log;
pub mod stage;

pub use error::PipelineError;
pub use log::{spawn_log_consumer, LogEntry};
pub use stage::{run_stage, Stage, StageWorker};
