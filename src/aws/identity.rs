//! Cognito identity-pool credential leasing.
//!
//! The vendor grants S3 and SQS access through unauthenticated Cognito
//! identity pools. Credentials are short-lived; [`CredentialLease`] caches
//! them and refreshes behind a lock so concurrent callers never race two
//! exchanges for the same pool.

use crate::error::{AuraError, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cognitoidentity::Client as CognitoClient;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// Refresh credentials this long before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 300;

/// Temporary AWS credentials obtained from an identity pool.
#[derive(Debug, Clone)]
pub struct LeaseCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

impl LeaseCredentials {
    /// True when the credentials expire within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - Utc::now() < margin
    }
}

/// Exchanges an identity-pool id for temporary credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityExchange: Send + Sync {
    async fn exchange(&self) -> Result<LeaseCredentials>;
}

/// Production exchange against the Cognito identity service.
pub struct CognitoExchange {
    client: CognitoClient,
    pool_id: String,
    // GetId is stable for a pool; fetched once and reused across refreshes.
    identity_id: Mutex<Option<String>>,
}

impl CognitoExchange {
    pub async fn new(region: &str, pool_id: impl Into<String>) -> Self {
        // The pools are unauthenticated: GetId and GetCredentialsForIdentity
        // are anonymous calls, so no signing credentials are configured.
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .no_credentials()
            .load()
            .await;
        Self {
            client: CognitoClient::new(&aws_config),
            pool_id: pool_id.into(),
            identity_id: Mutex::new(None),
        }
    }

    async fn identity_id(&self) -> Result<String> {
        let mut cached = self.identity_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let response = self
            .client
            .get_id()
            .identity_pool_id(&self.pool_id)
            .send()
            .await
            .map_err(|e| AuraError::Authorization(format!("cognito get_id failed: {e}")))?;
        let id = response
            .identity_id()
            .ok_or_else(|| {
                AuraError::Authorization("cognito returned no identity id".to_string())
            })?
            .to_string();

        debug!(identity_id = %id, "obtained cognito identity");
        *cached = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl IdentityExchange for CognitoExchange {
    async fn exchange(&self) -> Result<LeaseCredentials> {
        let identity_id = self.identity_id().await?;

        let response = self
            .client
            .get_credentials_for_identity()
            .identity_id(&identity_id)
            .send()
            .await
            .map_err(|e| {
                AuraError::Authorization(format!("cognito credential exchange failed: {e}"))
            })?;
        let credentials = response.credentials().ok_or_else(|| {
            AuraError::Authorization("cognito returned no credentials".to_string())
        })?;

        let expires_at = credentials
            .expiration()
            .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
            .unwrap_or_else(Utc::now);

        let field = |name: &str, value: Option<&str>| {
            value.map(String::from).ok_or_else(|| {
                AuraError::Authorization(format!("cognito credentials missing {name}"))
            })
        };

        debug!(%expires_at, "leased aws credentials");
        Ok(LeaseCredentials {
            access_key_id: field("access key", credentials.access_key_id())?,
            secret_access_key: field("secret key", credentials.secret_key())?,
            session_token: field("session token", credentials.session_token())?,
            expires_at,
        })
    }
}

/// Cached credential lease over an [`IdentityExchange`].
///
/// The cache slot lock is held across the refresh call, so when several
/// tasks hit an expired lease at once exactly one exchange runs and the
/// rest pick up its result.
pub struct CredentialLease<E> {
    exchange: E,
    margin: Duration,
    current: Mutex<Option<LeaseCredentials>>,
}

impl<E: IdentityExchange> CredentialLease<E> {
    pub fn new(exchange: E) -> Self {
        Self {
            exchange,
            margin: Duration::seconds(REFRESH_MARGIN_SECS),
            current: Mutex::new(None),
        }
    }

    /// Current credentials, refreshed if absent or expiring soon.
    pub async fn credentials(&self) -> Result<LeaseCredentials> {
        let mut slot = self.current.lock().await;
        if let Some(credentials) = slot.as_ref() {
            if !credentials.expires_within(self.margin) {
                return Ok(credentials.clone());
            }
            debug!(expires_at = %credentials.expires_at, "lease expiring, refreshing");
        }

        let fresh = self.exchange.exchange().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn credentials_expiring_in(secs: i64) -> LeaseCredentials {
        LeaseCredentials {
            access_key_id: "AKIATEST".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expires_at: Utc::now() + Duration::seconds(secs),
        }
    }

    #[test]
    fn test_expiry_margin() {
        assert!(credentials_expiring_in(60).expires_within(Duration::seconds(300)));
        assert!(credentials_expiring_in(-10).expires_within(Duration::seconds(300)));
        assert!(!credentials_expiring_in(3600).expires_within(Duration::seconds(300)));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let mut exchange = MockIdentityExchange::new();
        exchange
            .expect_exchange()
            .times(1)
            .returning(|| Ok(credentials_expiring_in(3600)));

        let lease = Arc::new(CredentialLease::new(exchange));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lease = lease.clone();
            handles.push(tokio::spawn(async move { lease.credentials().await }));
        }
        for handle in handles {
            let credentials = handle.await.unwrap().unwrap();
            assert_eq!(credentials.access_key_id, "AKIATEST");
        }
    }

    #[tokio::test]
    async fn test_expiring_lease_is_refreshed() {
        let mut exchange = MockIdentityExchange::new();
        let mut seq = mockall::Sequence::new();
        exchange
            .expect_exchange()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(credentials_expiring_in(60)));
        exchange
            .expect_exchange()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(credentials_expiring_in(3600)));

        let lease = CredentialLease::new(exchange);
        lease.credentials().await.unwrap();
        // Within the safety margin, so the second call refreshes.
        lease.credentials().await.unwrap();
        // Fresh now, third call reuses the cached lease.
        lease.credentials().await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_failure_propagates() {
        let mut exchange = MockIdentityExchange::new();
        exchange
            .expect_exchange()
            .returning(|| Err(AuraError::Authorization("pool disabled".to_string())));

        let lease = CredentialLease::new(exchange);
        assert!(matches!(
            lease.credentials().await,
            Err(AuraError::Authorization(_))
        ));
    }
}
