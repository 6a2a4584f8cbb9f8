//! Uploads image bytes to the vendor's S3 bucket.

use crate::aws::identity::{CredentialLease, IdentityExchange};
use crate::error::{AuraError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use md5::{Digest, Md5};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// The vendor's image bucket. Not configurable; keys are leased per upload
/// through the identity pool.
pub const IMAGE_BUCKET: &str = "images.senseapp.co";

/// Handle returned after an object lands in the store.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Generated object key (also the asset's remote file name).
    pub file_name: String,
    /// Base64-encoded MD5 of the uploaded bytes, as the finalize endpoint
    /// expects it.
    pub md5_base64: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload image bytes under a fresh unique key.
    async fn put_image(&self, data: Bytes, extension: &str) -> Result<StoredObject>;
}

/// S3-backed object store using leased Cognito credentials.
pub struct S3ObjectStore<E> {
    lease: CredentialLease<E>,
    region: String,
    bucket: String,
    // Rebuilt whenever the lease rotates the session token.
    client: Mutex<Option<(String, S3Client)>>,
}

impl<E: IdentityExchange> S3ObjectStore<E> {
    pub fn new(lease: CredentialLease<E>, region: impl Into<String>) -> Self {
        Self {
            lease,
            region: region.into(),
            bucket: IMAGE_BUCKET.to_string(),
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<S3Client> {
        let credentials = self.lease.credentials().await?;

        let mut cached = self.client.lock().await;
        if let Some((token, client)) = cached.as_ref() {
            if *token == credentials.session_token {
                return Ok(client.clone());
            }
        }

        debug!("building s3 client for rotated lease");
        let provider = Credentials::from_keys(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(provider)
            .build();
        let client = S3Client::from_conf(config);
        *cached = Some((credentials.session_token, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl<E: IdentityExchange> ObjectStore for S3ObjectStore<E> {
    async fn put_image(&self, data: Bytes, extension: &str) -> Result<StoredObject> {
        let file_name = object_key(extension);
        let md5_base64 = md5_base64(&data);

        let client = self.client().await?;
        client
            .put_object()
            .bucket(&self.bucket)
            .key(&file_name)
            .body(ByteStream::from(data.clone()))
            .send()
            .await
            .map_err(|e| AuraError::Transient(format!("s3 put_object failed: {e}")))?;

        debug!(key = %file_name, size_bytes = data.len(), "object uploaded");
        Ok(StoredObject {
            file_name,
            md5_base64,
        })
    }
}

fn object_key(extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("{}.{extension}", Uuid::new_v4())
    }
}

/// Base64-encoded MD5 digest, the hash format the finalize endpoint stores.
pub fn md5_base64(data: &[u8]) -> String {
    BASE64.encode(Md5::digest(data))
}
