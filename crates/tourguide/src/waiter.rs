use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::errors::TourError;
use crate::selector::Selector;
use crate::surface::{UiElement, UiSurface};

/// Default timeout if none is specified per wait
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between polls of the surface
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls the surface for an element matching a selector.
///
/// The anchored UI is produced asynchronously by the host application, so a
/// step's anchor may not exist yet when the step is requested. The waiter
/// checks on a short fixed interval and resolves with the element the first
/// time the query matches. Waits are bounded by a timeout and by the owning
/// step's cancellation token, so an abandoned step releases its pending
/// polls deterministically.
#[derive(Clone)]
pub struct ConditionWaiter {
    surface: Arc<dyn UiSurface>,
    interval: Duration,
    timeout: Duration,
}

impl ConditionWaiter {
    pub fn new(surface: Arc<dyn UiSurface>) -> Self {
        Self {
            surface,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Set the poll interval for this waiter instance.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the default timeout for this waiter instance.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for an element matching the selector using the default timeout.
    pub async fn wait_for(
        &self,
        selector: &Selector,
        token: &CancellationToken,
    ) -> Result<UiElement, TourError> {
        self.wait_for_within(selector, self.timeout, token).await
    }

    /// Wait for an element matching the selector, up to the given timeout.
    #[instrument(level = "debug", skip(self, token))]
    pub async fn wait_for_within(
        &self,
        selector: &Selector,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<UiElement, TourError> {
        if let Selector::Invalid(reason) = selector {
            return Err(TourError::InvalidSelector(reason.clone()));
        }

        let deadline = Instant::now() + timeout;
        let mut polls: u64 = 0;
        loop {
            if let Some(element) = self.surface.query(selector) {
                debug!(%selector, polls, "element appeared");
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(TourError::Timeout {
                    timeout,
                    selector: selector.to_string(),
                });
            }
            polls += 1;
            tokio::select! {
                _ = token.cancelled() => {
                    return Err(TourError::Canceled(selector.to_string()));
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
