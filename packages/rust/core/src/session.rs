//! Scoped messaging sessions and rate-limit handling.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use linkdigest_channel::MessageSource;
use linkdigest_shared::{LinkDigestError, Result};

/// Run `body` inside a connected session on `source`.
///
/// `disconnect` is called on every exit path: after success, after an error (including a
/// failed `connect`), and after a panic in `body`, which is resumed once the session is
/// released. A failing `disconnect` is logged and does not replace the body's result.
pub async fn with_session<F, Fut, T>(source: &dyn MessageSource, body: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = match source.connect().await {
        Ok(()) => {
            debug!("session opened");
            AssertUnwindSafe(body()).catch_unwind().await
        }
        Err(e) => Ok(Err(e)),
    };

    if let Err(e) = source.disconnect().await {
        warn!(error = %e, "disconnect failed");
    } else {
        debug!("session closed");
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// Handling of "slow down" signals from the messaging service.
///
/// The default waits as long and as often as the service asks. `max_waits` caps the number
/// of waits; once exhausted the rate-limit error is returned to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_waits: Option<u32>,
}

impl RateLimitPolicy {
    /// Give up after `max_waits` consecutive rate-limit signals.
    pub fn capped(max_waits: u32) -> Self {
        Self {
            max_waits: Some(max_waits),
        }
    }

    /// Run `call`, sleeping for the service-provided delay and repeating the same call
    /// whenever it fails with [`LinkDigestError::RateLimited`].
    pub async fn run<F, Fut, T>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut waits: u32 = 0;
        loop {
            match call().await {
                Err(LinkDigestError::RateLimited { retry_after })
                    if self.max_waits.is_none_or(|max| waits < max) =>
                {
                    waits = waits.saturating_add(1);
                    warn!(?retry_after, waits, "rate limited, sleeping before retry");
                    tokio::time::sleep(retry_after).await;
                }
                other => return other,
            }
        }
    }
}
