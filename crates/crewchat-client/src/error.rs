use thiserror::Error;

use crewchat_store::StoreError;

/// Errors surfaced by the client layer.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Storage failure (write errors, invalid ids, image encoding).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The thread's actor task is no longer running.
    #[error("Thread is no longer running")]
    ThreadClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
