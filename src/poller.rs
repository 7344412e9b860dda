use log::{debug, info};
use std::fmt::Debug;
use std::future::Future;
use tokio::time::{sleep, timeout_at, Instant};

use crate::config::PollSettings;
use crate::error::{ProviderError, ProviderResult};

/// A remote reconciliation status.
pub trait Phase: Debug + Copy {
    /// Polling stops once this returns true.
    fn is_terminal(&self) -> bool;
    /// A terminal phase that fails the operation.
    fn is_failure(&self) -> bool;
    fn name(&self) -> &'static str;
}

/// Polls `fetch` every `settings.interval` until a terminal phase is reached.
///
/// Errors from `fetch` propagate immediately. The timeout is a deadline
/// checked around every fetch and every sleep, so a cancelled wait returns
/// promptly rather than after a full interval. A timeout too large to
/// represent as an instant means no deadline.
pub async fn wait_for_phase<P, F, Fut>(resource: &str, settings: PollSettings, mut fetch: F) -> ProviderResult<P>
where
    P: Phase,
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<P>>,
{
    let deadline = Instant::now().checked_add(settings.timeout);
    let timed_out = || ProviderError::Timeout {
        resource: resource.to_string(),
        seconds: settings.timeout.as_secs(),
    };
    loop {
        let phase = match deadline {
            Some(deadline) => timeout_at(deadline, fetch()).await.map_err(|_| timed_out())??,
            None => fetch().await?,
        };
        debug!("{} is in phase {}", resource, phase.name());
        if phase.is_failure() {
            return Err(ProviderError::FailedPhase {
                resource: resource.to_string(),
                phase: phase.name().to_string(),
            });
        }
        if phase.is_terminal() {
            info!("{} settled in phase {}", resource, phase.name());
            return Ok(phase);
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(timed_out());
                }
                settings.interval.min(deadline - now)
            }
            None => settings.interval,
        };
        sleep(pause).await;
    }
}
