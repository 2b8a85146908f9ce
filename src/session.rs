use std::fmt::{self, Display};
use std::future::Future;
use std::io;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::planner;
use crate::source::ByteSource;
use crate::store::{MultipartStore, ObjectKey, ObjectLocation, PartAck, SessionToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Active,
    Completed,
    Aborted,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::NotStarted => write!(f, "not started"),
            SessionState::Active => write!(f, "active"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Aborted => write!(f, "aborted"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

/// One multipart upload of `object_size` bytes to `key`.
///
/// The session moves `NotStarted -> Active -> {Completed, Aborted}`. Once
/// `begin` succeeds the caller owns a remote resource: exactly one of
/// `finalize` or `abort` has to resolve it.
pub struct UploadSession<'a, S: MultipartStore + ?Sized> {
    store: &'a S,
    key: ObjectKey,
    object_size: u64,
    part_size: u64,
    state: SessionState,
    token: Option<SessionToken>,
    acks: Vec<PartAck>,
    transfer_started: bool,
    all_parts_acknowledged: bool,
    finalize_attempted: bool,
    progress: Option<watch::Sender<UploadProgress>>,
}

impl<'a, S: MultipartStore + ?Sized> UploadSession<'a, S> {
    pub fn new(store: &'a S, key: ObjectKey, object_size: u64, part_size: u64) -> Self {
        Self {
            store,
            key,
            object_size,
            part_size,
            state: SessionState::NotStarted,
            token: None,
            acks: Vec::new(),
            transfer_started: false,
            all_parts_acknowledged: false,
            finalize_attempted: false,
            progress: None,
        }
    }

    /// Publishes cumulative progress after every acknowledged part.
    pub fn with_progress(mut self, progress: watch::Sender<UploadProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn acks(&self) -> &[PartAck] {
        &self.acks
    }

    pub async fn begin(&mut self) -> Result<(), UploadError> {
        self.expect_state("begin", SessionState::NotStarted)?;

        let token = self
            .store
            .begin_session(&self.key)
            .await
            .map_err(UploadError::SessionStartFailure)?;

        info!(key = %self.key, session_token = %token, "upload session started");
        self.token = Some(token);
        self.state = SessionState::Active;
        Ok(())
    }

    /// Uploads every planned part in order, stopping at the first failure.
    pub async fn upload_all_parts<R: ByteSource + ?Sized>(
        &mut self,
        source: &R,
    ) -> Result<(), UploadError> {
        let token = self.active_token("upload parts of")?;
        if self.transfer_started {
            return Err(UploadError::OutOfOrder(
                "parts of this session were already transferred",
            ));
        }
        self.transfer_started = true;

        let ranges = planner::plan(self.object_size, self.part_size)?;
        let mut bytes_uploaded = 0u64;

        for range in ranges {
            let part_number = range.part_number();
            let data = source
                .read_range(range.start(), range.end())
                .await
                .map_err(|err| UploadError::SourceUnavailable {
                    context: format!(
                        "bytes {}..{} of {}",
                        range.start(),
                        range.end(),
                        source.describe()
                    ),
                    source: err,
                })?;

            if data.len() as u64 != range.len() {
                return Err(UploadError::SourceUnavailable {
                    context: format!("part {} of {}", part_number, source.describe()),
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("expected {} bytes, read {}", range.len(), data.len()),
                    ),
                });
            }

            debug!(
                part_number,
                start = range.start(),
                end = range.end(),
                "uploading part"
            );

            let integrity_tag = self
                .store
                .put_part(&token, part_number, data)
                .await
                .map_err(|err| UploadError::PartUploadFailure {
                    part_number,
                    source: err,
                })?;

            debug!(part_number, integrity_tag = %integrity_tag, "part acknowledged");
            self.acks.push(PartAck {
                part_number,
                integrity_tag,
            });

            bytes_uploaded += range.len();
            if let Some(progress) = &self.progress {
                progress.send_replace(UploadProgress {
                    bytes_uploaded,
                    total_bytes: self.object_size,
                });
            }
        }

        self.all_parts_acknowledged = true;
        Ok(())
    }

    pub async fn finalize(&mut self) -> Result<ObjectLocation, UploadError> {
        let token = self.active_token("finalize")?;
        if !self.all_parts_acknowledged {
            return Err(UploadError::OutOfOrder(
                "finalize requires every planned part to be acknowledged",
            ));
        }
        if self.finalize_attempted {
            return Err(UploadError::OutOfOrder(
                "completion of this session was already requested",
            ));
        }
        self.finalize_attempted = true;

        let location = self
            .store
            .complete_session(&token, &self.acks)
            .await
            .map_err(UploadError::FinalizeFailure)?;

        info!(
            key = %self.key,
            session_token = %token,
            parts = self.acks.len(),
            location = %location,
            "upload session completed"
        );
        self.state = SessionState::Completed;
        Ok(location)
    }

    /// Discards the remote session. The session is `Aborted` afterwards even
    /// when the store call fails.
    pub async fn abort(&mut self) -> Result<(), UploadError> {
        let token = self.active_token("abort")?;

        let result = self.store.abort_session(&token).await;
        self.state = SessionState::Aborted;

        match result {
            Ok(()) => {
                warn!(key = %self.key, session_token = %token, "upload session aborted");
                Ok(())
            }
            Err(err) => {
                error!(
                    key = %self.key,
                    session_token = %token,
                    error = %err,
                    "failed to abort upload session, uploaded parts are orphaned and need manual cleanup"
                );
                Err(UploadError::AbortFailure {
                    session_token: token,
                    source: err,
                })
            }
        }
    }

    async fn transfer<R: ByteSource + ?Sized>(
        &mut self,
        source: &R,
    ) -> Result<ObjectLocation, UploadError> {
        self.upload_all_parts(source).await?;
        self.finalize().await
    }

    /// Aborts after `cause` and folds the abort outcome into the error.
    async fn fail(&mut self, cause: UploadError) -> UploadError {
        if self.state != SessionState::Active {
            return cause;
        }

        warn!(error = %cause, "upload failed, aborting session");
        match self.abort().await {
            Ok(()) => UploadError::Aborted {
                cause: Box::new(cause),
            },
            Err(UploadError::AbortFailure {
                session_token,
                source,
            }) => UploadError::Orphaned {
                cause: Box::new(cause),
                session_token,
                abort_error: source,
            },
            Err(_) => cause,
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: SessionState,
    ) -> Result<(), UploadError> {
        if self.state != expected {
            return Err(UploadError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn active_token(&self, operation: &'static str) -> Result<SessionToken, UploadError> {
        self.expect_state(operation, SessionState::Active)?;
        self.token.clone().ok_or(UploadError::InvalidState {
            operation,
            state: self.state,
        })
    }
}

impl<S: MultipartStore + ?Sized> Drop for UploadSession<'_, S> {
    fn drop(&mut self) {
        if self.state == SessionState::Active
            && let Some(token) = &self.token
        {
            error!(
                key = %self.key,
                session_token = %token,
                "upload session dropped while active, remote parts were not cleaned up"
            );
        }
    }
}

/// Uploads all of `source` to `key` in parts of `part_size` bytes.
///
/// The source is measured and the part count checked before any remote call.
/// Once the session has begun, any failure, or `cancel` resolving before the
/// upload completes, aborts the session exactly once. The returned error is
/// then [`UploadError::Aborted`] or [`UploadError::Orphaned`], wrapping the
/// original failure.
pub async fn upload_object<S, R, C>(
    store: &S,
    source: &R,
    key: ObjectKey,
    part_size: u64,
    progress: Option<watch::Sender<UploadProgress>>,
    cancel: C,
) -> Result<ObjectLocation, UploadError>
where
    S: MultipartStore + ?Sized,
    R: ByteSource + ?Sized,
    C: Future<Output = ()>,
{
    let object_size = source
        .size()
        .await
        .map_err(|err| UploadError::SourceUnavailable {
            context: source.describe(),
            source: err,
        })?;
    planner::check_limits(object_size, part_size)?;

    if object_size == 0 {
        warn!(key = %key, "source is empty, uploading a session without parts");
    }

    let mut session = UploadSession::new(store, key, object_size, part_size);
    if let Some(progress) = progress {
        progress.send_replace(UploadProgress {
            bytes_uploaded: 0,
            total_bytes: object_size,
        });
        session = session.with_progress(progress);
    }

    session.begin().await?;

    let outcome = tokio::select! {
        biased;
        _ = cancel => Err(UploadError::Cancelled),
        result = session.transfer(source) => result,
    };

    match outcome {
        Ok(location) => Ok(location),
        Err(cause) => Err(session.fail(cause).await),
    }
}
