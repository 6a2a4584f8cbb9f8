//! AWS transports used by the vendor's upload path.
//!
//! Both S3 and SQS are reached with short-lived credentials leased from
//! unauthenticated Cognito identity pools; the lease logic lives in
//! [`identity`], the transports in [`s3`] and [`sqs`].

pub mod identity;
pub mod s3;
pub mod sqs;

pub use identity::{CognitoExchange, CredentialLease, IdentityExchange, LeaseCredentials};
pub use s3::{ObjectStore, S3ObjectStore, StoredObject};
pub use sqs::{QueuePoller, SqsQueuePoller};
