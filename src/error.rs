use std::io;

use crate::session::SessionState;
use crate::store::{SessionToken, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unable to read {context}")]
    SourceUnavailable {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start upload session")]
    SessionStartFailure(#[source] StoreError),

    #[error("failed to upload part {part_number}")]
    PartUploadFailure {
        part_number: u32,
        #[source]
        source: StoreError,
    },

    #[error("failed to finalize upload session")]
    FinalizeFailure(#[source] StoreError),

    #[error("failed to abort upload session {session_token}")]
    AbortFailure {
        session_token: SessionToken,
        #[source]
        source: StoreError,
    },

    #[error("upload cancelled")]
    Cancelled,

    #[error("cannot {operation} an upload session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("out-of-order session call: {0}")]
    OutOfOrder(&'static str),

    /// The upload failed and its remote session was discarded.
    #[error("upload session aborted")]
    Aborted {
        #[source]
        cause: Box<UploadError>,
    },

    /// The upload failed and its remote session could not be discarded.
    #[error(
        "upload session {session_token} could not be aborted ({abort_error}), manual cleanup required"
    )]
    Orphaned {
        #[source]
        cause: Box<UploadError>,
        session_token: SessionToken,
        abort_error: StoreError,
    },
}

impl UploadError {
    /// The failure that ended the upload, looking through the abort outcome.
    pub fn cause(&self) -> &UploadError {
        match self {
            UploadError::Aborted { cause } | UploadError::Orphaned { cause, .. } => cause,
            other => other,
        }
    }

    /// Whether a remote session may have been left behind.
    pub fn is_orphaned(&self) -> bool {
        matches!(self, UploadError::Orphaned { .. })
    }
}
