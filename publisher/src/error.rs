use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("record build failed for sequence {sequence_id}: {reason}")]
    RecordBuild { sequence_id: u64, reason: String },

    #[error("sink {channel} notification failed: {reason}")]
    SinkInvocation {
        channel: &'static str,
        reason: String,
    },

    #[error("resource sample failed: {0}")]
    ResourceSample(String),

    #[error("task {task} did not shut down cleanly: {reason}")]
    ShutdownStep { task: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("processor already started")]
    AlreadyStarted,

    #[error("processor is stopped")]
    Stopped,
}
