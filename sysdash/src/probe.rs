//! HTTP reachability checks for configured services.

use crate::types::Status;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared by every connection; cloning shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ServiceProbe {
    client: reqwest::Client,
}

impl ServiceProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// One GET, no retry. Up only for a 2xx answer inside the timeout.
    pub async fn check(&self, url: &str) -> Status {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => Status::Up,
            Ok(resp) => {
                debug!(url, status = %resp.status(), "service answered with failure");
                Status::Down
            }
            Err(e) => {
                debug!(url, "service probe failed: {e}");
                Status::Down
            }
        }
    }
}
