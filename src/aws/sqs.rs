//! Polls the per-frame SQS queue the mobile client drains after selecting
//! an asset.
//!
//! The upload flow only needs the poll to have happened; whatever the queue
//! returns is logged and discarded.

use crate::aws::identity::{CredentialLease, IdentityExchange};
use crate::error::{AuraError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_sqs::Client as SqsClient;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_MESSAGES: i32 = 10;
const WAIT_TIME_SECS: i32 = 20;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueuePoller: Send + Sync {
    /// Drain one batch from the frame's client queue. Returns the number of
    /// messages received; callers treat the content as opaque.
    async fn poll_frame_queue(&self, frame_id: &str) -> Result<usize>;
}

/// SQS-backed poller using leased Cognito credentials.
pub struct SqsQueuePoller<E> {
    lease: CredentialLease<E>,
    region: String,
    client: Mutex<Option<(String, SqsClient)>>,
}

impl<E: IdentityExchange> SqsQueuePoller<E> {
    pub fn new(lease: CredentialLease<E>, region: impl Into<String>) -> Self {
        Self {
            lease,
            region: region.into(),
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<SqsClient> {
        let credentials = self.lease.credentials().await?;

        let mut cached = self.client.lock().await;
        if let Some((token, client)) = cached.as_ref() {
            if *token == credentials.session_token {
                return Ok(client.clone());
            }
        }

        debug!("building sqs client for rotated lease");
        let provider = Credentials::from_keys(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
        );
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .credentials_provider(provider)
            .build();
        let client = SqsClient::from_conf(config);
        *cached = Some((credentials.session_token, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl<E: IdentityExchange> QueuePoller for SqsQueuePoller<E> {
    async fn poll_frame_queue(&self, frame_id: &str) -> Result<usize> {
        let client = self.client().await?;
        let queue_name = format!("frame-{frame_id}-client");

        let queue_url = client
            .get_queue_url()
            .queue_name(&queue_name)
            .send()
            .await
            .map_err(|e| AuraError::Transient(format!("sqs get_queue_url failed: {e}")))?
            .queue_url()
            .ok_or_else(|| AuraError::Transient(format!("no url for queue {queue_name}")))?
            .to_string();

        let response = client
            .receive_message()
            .queue_url(&queue_url)
            .max_number_of_messages(MAX_MESSAGES)
            .wait_time_seconds(WAIT_TIME_SECS)
            .send()
            .await
            .map_err(|e| AuraError::Transient(format!("sqs receive_message failed: {e}")))?;

        let count = response.messages().len();
        debug!(queue = %queue_name, count, "polled frame queue");
        Ok(count)
    }
}
