//! Amazon S3 content store (requires the `s3` feature).

use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::media::sniff;
use crate::storage::{ContentStore, StoredObject, ensure_leaf};

/// Content store that keeps objects in an Amazon S3 (or S3-compatible)
/// bucket under a key prefix such as `storage/uploads`.
///
/// # Example
///
/// ```rust,ignore
/// use cms_backend::{S3Store, Credentials, Region, S3Config};
///
/// let creds = Credentials::new("AKID", "SECRET", None, None, "cms");
/// let config = S3Config::builder()
///     .region(Region::new("us-east-1"))
///     .credentials_provider(creds)
///     .build();
/// let uploads = S3Store::from_conf(config, "my-bucket", "storage/uploads");
/// ```
pub struct S3Store {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Store {
    /// Create a new `S3Store` with an existing [`Client`], bucket name and
    /// key prefix. Leading and trailing slashes on the prefix are ignored.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Create an `S3Store` from an [`aws_sdk_s3::Config`].
    pub fn from_conf(
        config: aws_sdk_s3::Config,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        Self::new(Client::from_conf(config), bucket, prefix)
    }

    /// Create an `S3Store` using credentials and region from the AWS
    /// environment (env vars, config files, IMDS, etc.).
    pub async fn from_env(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(Client::new(&config), bucket, prefix)
    }

    fn key_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    fn list_prefix(&self) -> Option<String> {
        (!self.prefix.is_empty()).then(|| format!("{}/", self.prefix))
    }

    async fn read_head(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes=0-{}", sniff::SNIFF_LEN - 1))
            .send()
            .await
            .map_err(|e| StoreError::Backend(Box::new(e)))?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(Box::new(e)))?;
        Ok(bytes.into_bytes().to_vec())
    }
}

impl ContentStore for S3Store {
    async fn put(
        &self,
        name: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<StoredObject, StoreError> {
        ensure_leaf(name)?;
        let key = self.key_for(name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(content.to_vec().into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::Backend(Box::new(e)))?;

        tracing::debug!(
            "Uploaded {} bytes to s3://{}/{}",
            content.len(),
            self.bucket,
            key
        );
        Ok(StoredObject {
            name: name.to_string(),
            size: content.len() as u64,
            modified: Utc::now(),
            mime: content_type.to_string(),
        })
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        ensure_leaf(name)?;
        let key = self.key_for(name);

        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => return Err(StoreError::Backend(Box::new(e))),
        };

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(Box::new(e)))?;
        Ok(Some(bytes.into_bytes().to_vec()))
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
        let prefix = self.list_prefix();
        let mut continuation: Option<String> = None;
        let mut objects = Vec::new();

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(prefix.clone())
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(Box::new(e)))?;

            for object in resp.contents() {
                let Some(key) = object.key() else { continue };
                let name = match &prefix {
                    Some(p) => key.strip_prefix(p.as_str()).unwrap_or(key),
                    None => key,
                };
                if name.is_empty() {
                    continue;
                }
                let head = self.read_head(key).await?;
                let modified = object
                    .last_modified()
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
                    .unwrap_or_else(Utc::now);
                objects.push(StoredObject {
                    name: name.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    modified,
                    mime: sniff::sniff(&head).to_string(),
                });
            }

            match resp.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        tracing::debug!(
            "Listed {} objects under s3://{}/{}",
            objects.len(),
            self.bucket,
            self.prefix
        );
        Ok(objects)
    }
}
