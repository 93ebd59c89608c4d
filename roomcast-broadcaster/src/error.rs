use thiserror::Error;

/// Failure of a single publish attempt on the cluster transport.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport unavailable: {0}")]
    Transport(String),

    #[error("Cluster channel closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum BroadcasterError {
    #[error("Publish to room '{room}' failed: {source}")]
    Publish {
        room: String,
        #[source]
        source: PublishError,
    },

    #[error("{failed} of {attempted} room publishes failed")]
    PartialPublish { failed: usize, attempted: usize },

    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BroadcasterError>;
