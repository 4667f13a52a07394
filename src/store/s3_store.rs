use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::RequestPayer;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::{unquote_etag, ArchiveStore, CacheValidators, FetchOutcome, StoredBlob};
use crate::error::StoreError;

/// S3-backed implementation of ArchiveStore.
///
/// Reads whole metatile objects from S3 or S3-compatible storage (MinIO, etc.)
/// with one conditional GET per fetch.
#[derive(Clone)]
pub struct S3ArchiveStore {
    client: Client,
    bucket: String,
    identifier: String,
}

impl S3ArchiveStore {
    /// Create a store reading from `bucket` with an existing client.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let identifier = format!("s3://{}", bucket);
        Self {
            client,
            bucket,
            identifier,
        }
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    async fn fetch(
        &self,
        key: &str,
        validators: &CacheValidators,
        requester_pays: bool,
    ) -> Result<FetchOutcome, StoreError> {
        let start = Instant::now();

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .set_if_modified_since(validators.last_modified.map(DateTime::from))
            .set_if_none_match(validators.etag.clone())
            .set_request_payer(requester_pays.then_some(RequestPayer::Requester))
            .send()
            .await;

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                let status = e.raw_response().map(|r| r.status().as_u16());
                let service_error = e.as_service_error();
                let no_such_key = service_error.map(|se| se.is_no_such_key()).unwrap_or(false);
                let code = service_error.and_then(|se| se.code()).map(str::to_string);

                let outcome = classify_error(status, no_such_key, code, e.to_string(), key);
                if matches!(outcome, Ok(FetchOutcome::NotModified)) {
                    debug!(key, "Metatile not modified");
                }
                return outcome;
            }
        };

        let last_modified = resp
            .last_modified()
            .and_then(|t| SystemTime::try_from(*t).ok());
        let etag = resp.e_tag().map(|t| unquote_etag(t).to_string());

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Unknown {
                code: e.to_string(),
                key: key.to_string(),
            })?
            .into_bytes();

        info!(
            key,
            bytes = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Fetched metatile"
        );

        Ok(FetchOutcome::Fetched(StoredBlob::new(
            data,
            CacheValidators::new(last_modified, etag),
        )))
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// Turn a failed GET into an outcome.
///
/// A 304 is the store confirming the caller's validators, so it is not an
/// error. Only a `NoSuchKey` error becomes `NotFound`; anything else,
/// including other 404s such as `NoSuchBucket`, keeps the upstream error
/// code, falling back to the HTTP status and then the error text.
fn classify_error(
    status: Option<u16>,
    no_such_key: bool,
    code: Option<String>,
    message: String,
    key: &str,
) -> Result<FetchOutcome, StoreError> {
    if status == Some(304) {
        return Ok(FetchOutcome::NotModified);
    }

    if no_such_key || code.as_deref() == Some("NoSuchKey") {
        return Err(StoreError::NotFound {
            key: key.to_string(),
        });
    }

    let code = code
        .or_else(|| status.map(|s| s.to_string()))
        .unwrap_or(message);

    Err(StoreError::Unknown {
        code,
        key: key.to_string(),
    })
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
///
/// For AWS S3, pass `None` to use the default endpoint:
/// ```ignore
/// let client = create_s3_client(None, "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
