//! Readiness polling for asynchronously provisioned resources
//!
//! Provider calls that create a resource usually return before the resource is
//! usable. `wait_until` re-runs a probe on a fixed interval until it reports the
//! resource ready or the attempt ceiling is reached.

use crate::error::{ProvisionError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Fixed-interval polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two probes
    pub interval: Duration,
    /// Number of probes before giving up
    pub max_attempts: u32,
}

impl PollConfig {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Worst-case time spent sleeping before a timeout is reported
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

impl Default for PollConfig {
    /// 30 probes, 30 seconds apart (about 15 minutes)
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 30)
    }
}

/// Poll `probe` until it yields a value.
///
/// The probe receives the zero-based attempt number and returns `Ok(Some(_))`
/// once the resource is ready and `Ok(None)` while it is not. Any status other
/// than ready counts as "keep waiting". Probe errors are returned immediately;
/// probes that want to tolerate transient errors map them to `Ok(None)`.
pub async fn wait_until<T, F, Fut>(resource: &str, config: &PollConfig, mut probe: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 0..config.max_attempts {
        tracing::debug!(resource, attempt, "Checking readiness");

        if let Some(ready) = probe(attempt).await? {
            tracing::info!(resource, attempt, "Resource is ready");
            return Ok(ready);
        }

        if attempt + 1 < config.max_attempts {
            sleep(config.interval).await;
        }
    }

    Err(ProvisionError::ProvisioningTimeout {
        resource: resource.to_string(),
        attempts: config.max_attempts,
    })
}
