//! S3 bucket existence probe.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ConvergeError, Result};

/// Checks whether a bucket exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BucketProbe: Send + Sync {
    /// Returns true if `bucket` exists and is reachable in `region`.
    async fn bucket_exists(&self, bucket: &str, region: &str) -> Result<bool>;
}

/// Probe backed by `HeadBucket`, with one client per region.
#[derive(Debug, Default)]
pub struct S3BucketProbe {
    clients: Mutex<HashMap<String, Client>>,
}

impl S3BucketProbe {
    /// Creates a probe; clients are built lazily from the environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, region: &str) -> Client {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return client.clone();
        }

        let config = aws_config::from_env()
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        let client = Client::new(&config);
        clients.insert(region.to_string(), client.clone());
        client
    }
}

#[async_trait]
impl BucketProbe for S3BucketProbe {
    async fn bucket_exists(&self, bucket: &str, region: &str) -> Result<bool> {
        debug!("HeadBucket {bucket} in {region}");

        let client = self.client(region).await;
        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(ConvergeError::internal(format!(
                        "HeadBucket {bucket} failed: {service_err}"
                    )))
                }
            }
        }
    }
}
