use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ETAG};
use reqwest::{Client, Response};
use url::Url;

use crate::rest_types::{
    AbortUploadRequest, CompleteUploadRequest, CompleteUploadResponse, CompletedPart,
    InitUploadRequest, InitUploadResponse,
};
use crate::store::{
    IntegrityTag, MultipartStore, ObjectKey, ObjectLocation, PartAck, SessionToken, StoreError,
};

const INIT_UPLOAD_ROUTE: &str = "v1/upload/init";
const UPLOAD_PART_ROUTE: &str = "v1/upload/part";
const COMPLETE_UPLOAD_ROUTE: &str = "v1/upload/complete";
const ABORT_UPLOAD_ROUTE: &str = "v1/upload/abort";

/// Multipart store reached over its REST API.
pub struct HttpStore {
    client: Client,
    base_url: Url,
    auth_token: String,
}

impl HttpStore {
    pub fn new(
        mut base_url: Url,
        auth_token: String,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        // Url::join replaces the last segment unless the path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    fn route(&self, route: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(route)
            .map_err(|e| StoreError::Protocol(format!("invalid route {}: {}", route, e)))
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Rejected {
            status,
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response)
}

#[async_trait]
impl MultipartStore for HttpStore {
    async fn begin_session(&self, key: &ObjectKey) -> Result<SessionToken, StoreError> {
        let request = InitUploadRequest {
            key: key.to_string(),
        };

        let response = self
            .client
            .post(self.route(INIT_UPLOAD_ROUTE)?)
            .bearer_auth(&self.auth_token)
            .json(&request)
            .send()
            .await?;

        let init_response: InitUploadResponse = check_status(response).await?.json().await?;
        if init_response.session_id.is_empty() {
            return Err(StoreError::Protocol(
                "store returned an empty session id".to_string(),
            ));
        }
        Ok(SessionToken::from(init_response.session_id))
    }

    async fn put_part(
        &self,
        token: &SessionToken,
        part_number: u32,
        data: Vec<u8>,
    ) -> Result<IntegrityTag, StoreError> {
        let response = self
            .client
            .put(self.route(UPLOAD_PART_ROUTE)?)
            .bearer_auth(&self.auth_token)
            .query(&[
                ("session_id", token.as_str()),
                ("part_number", &part_number.to_string()),
            ])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(IntegrityTag::from)
            .ok_or_else(|| StoreError::Protocol(format!("no ETag received for part {}", part_number)))
    }

    async fn complete_session(
        &self,
        token: &SessionToken,
        acks: &[PartAck],
    ) -> Result<ObjectLocation, StoreError> {
        let request = CompleteUploadRequest {
            session_id: token.to_string(),
            parts: acks
                .iter()
                .map(|ack| CompletedPart {
                    part_number: ack.part_number,
                    etag: ack.integrity_tag.to_string(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.route(COMPLETE_UPLOAD_ROUTE)?)
            .bearer_auth(&self.auth_token)
            .json(&request)
            .send()
            .await?;

        let complete_response: CompleteUploadResponse =
            check_status(response).await?.json().await?;
        Ok(ObjectLocation::from(complete_response.location))
    }

    async fn abort_session(&self, token: &SessionToken) -> Result<(), StoreError> {
        let request = AbortUploadRequest {
            session_id: token.to_string(),
        };

        let response = self
            .client
            .delete(self.route(ABORT_UPLOAD_ROUTE)?)
            .bearer_auth(&self.auth_token)
            .json(&request)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}
