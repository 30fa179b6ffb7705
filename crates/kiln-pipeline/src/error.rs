use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage worker panicked: {0}")]
    WorkerPanicked(#[from] tokio::task::JoinError),
}
