//! S3 implementation of [`ObjectStore`].
//!
//! One client is built at construction from the injected credential
//! provider. Timeouts are applied by the sync engine around each call.

use crate::config::CacheSyncConfig;
use crate::credential_manager::CredentialManager;
use crate::error::{CacheSyncError, CacheSyncResult};
use crate::store::ObjectStore;
use crate::types::RemoteObject;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// What an S3 call was addressing, for 404 classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Bucket,
    Object,
}

/// S3 object store bound to one bucket.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(config: &CacheSyncConfig, credentials: &CredentialManager) -> Self {
        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials.provider())
            .behavior_version_latest();

        if let Some(ref endpoint) = config.endpoint_override {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> CacheSyncResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| map_s3_error(e, Target::Bucket, prefix))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                let modified = match object.last_modified() {
                    Some(ts) => DateTime::<Utc>::from_timestamp(ts.secs(), ts.subsec_nanos())
                        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    None => {
                        warn!(key, "object listed without last-modified time");
                        DateTime::<Utc>::UNIX_EPOCH
                    }
                };
                objects.push(RemoteObject {
                    key: key.to_string(),
                    modified,
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(
            "listed {} objects under s3://{}/{prefix}",
            objects.len(),
            self.bucket
        );
        Ok(objects)
    }

    async fn get(&self, key: &str) -> CacheSyncResult<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_s3_error(e, Target::Object, key))?;

        let body = resp.body.collect().await.map_err(|e| {
            CacheSyncError::StoreUnavailable(format!("failed to read body for {key}: {e}"))
        })?;

        let bytes = body.into_bytes().to_vec();
        debug!(
            "downloaded {} bytes from s3://{}/{key}",
            bytes.len(),
            self.bucket
        );
        Ok(bytes)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> CacheSyncResult<()> {
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_s3_error(e, Target::Object, key))?;

        debug!("uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn map_s3_error<E>(err: SdkError<E>, target: Target, key: &str) -> CacheSyncError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = match &err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    };
    let code = err.code().map(str::to_string);
    let detail = format!("{key}: {}", DisplayErrorContext(&err));
    classify(status, code.as_deref(), target, detail)
}

/// Maps an HTTP status and S3 error code onto the store error taxonomy.
///
/// Anything not recognized (timeouts, dispatch failures, 5xx, throttling)
/// is `StoreUnavailable` and retried on the next pass.
fn classify(status: Option<u16>, code: Option<&str>, target: Target, detail: String) -> CacheSyncError {
    match (code, status) {
        (Some("NoSuchBucket"), _) => CacheSyncError::BucketNotFound(detail),
        (Some("NoSuchKey"), _) => CacheSyncError::ObjectNotFound(detail),
        (Some("QuotaExceeded" | "ServiceQuotaExceeded" | "TooManyBuckets"), _) | (_, Some(507)) => {
            CacheSyncError::QuotaExceeded(detail)
        }
        (
            Some(
                "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"
                | "InvalidToken" | "AllAccessDisabled",
            ),
            _,
        )
        | (_, Some(401 | 403)) => CacheSyncError::AccessDenied(detail),
        (_, Some(404)) => match target {
            Target::Bucket => CacheSyncError::BucketNotFound(detail),
            Target::Object => CacheSyncError::ObjectNotFound(detail),
        },
        _ => CacheSyncError::StoreUnavailable(detail),
    }
}
