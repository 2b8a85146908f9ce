use std::fmt::{self, Display};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Capabilities a blob store must offer to take part in a multipart upload.
#[async_trait]
pub trait MultipartStore: Send + Sync {
    async fn begin_session(&self, key: &ObjectKey) -> Result<SessionToken, StoreError>;

    /// Uploads one part. The part length is `data.len()`.
    async fn put_part(
        &self,
        token: &SessionToken,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<IntegrityTag, StoreError>;

    /// `acks` is in increasing part-number order.
    async fn complete_session(
        &self,
        token: &SessionToken,
        acks: &[PartAck],
    ) -> Result<ObjectLocation, StoreError>;

    async fn abort_session(&self, token: &SessionToken) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request to store failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store rejected request: {status} - {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("malformed store response: {0}")]
    Protocol(String),
}

macro_rules! opaque_string {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_string!(
    /// Identifier the store issues for one multipart session.
    SessionToken
);
opaque_string!(
    /// Store acknowledgment for a received part, echoed back verbatim on completion.
    IntegrityTag
);
opaque_string!(ObjectLocation);

/// Destination key of the uploaded object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Result<Self, UploadError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(UploadError::InvalidArgument(
                "object key must not be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartAck {
    pub part_number: u32,
    pub integrity_tag: IntegrityTag,
}
