//! Poller: drives a refresh probe until a remote object converges
//!
//! Cloud APIs report asynchronous transitions (attach, detach, create,
//! delete) only through their describe calls. [`wait_for_state`] polls a
//! [`RefreshProbe`] on a fixed interval and checks every observed state
//! against an explicit contract: the pending states the caller expects to
//! pass through, and the single target state that ends the wait.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay between two probe invocations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One observation of a remote object made by a probe
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    /// Snapshot of the remote object, owned by this observation
    pub object: T,

    /// Logical state label derived from the snapshot
    pub state: String,
}

impl<T> Observed<T> {
    pub fn new(object: T, state: impl Into<String>) -> Self {
        Self {
            object,
            state: state.into(),
        }
    }
}

/// Queries the current remote state of one object
///
/// A probe answers with one of three outcomes:
///
/// - `Ok(Some(observed))`: the object was found in `observed.state`
/// - `Ok(None)`: the object is not visible (yet); never an error
/// - `Err(_)`: the lookup failed and polling must stop
///
/// Probes take `&mut self` so a probe can keep state for the lifetime of a
/// single polling session. A probe instance must not be shared between
/// sessions.
#[async_trait]
pub trait RefreshProbe: Send {
    type Object: Send;

    /// Identifier of the object being watched, for diagnostics
    fn resource_id(&self) -> &str;

    /// Perform one remote read and classify the result
    async fn refresh(&mut self) -> Result<Option<Observed<Self::Object>>>;
}

/// Configuration of one polling session
#[derive(Debug)]
pub struct WaitSpec<P> {
    /// States that are expected while the transition is in progress
    pub pending: Vec<String>,

    /// State that ends the wait successfully
    pub target: String,

    /// Upper bound on the whole wait
    pub timeout: Duration,

    /// Delay between probe invocations
    pub poll_interval: Duration,

    /// Probe bound to the object being watched
    pub probe: P,
}

impl<P: RefreshProbe> WaitSpec<P> {
    pub fn new(probe: P, target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pending: Vec::new(),
            target: target.into(),
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            probe,
        }
    }

    pub fn with_pending<I, S>(mut self, pending: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = pending.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn is_pending(&self, state: &str) -> bool {
        self.pending.iter().any(|p| p == state)
    }
}

/// Poll `spec.probe` until it reports `spec.target`
///
/// Returns the object from the converging observation. Fails immediately on
/// a probe error or on a state that is neither pending nor the target, and
/// fails with [`CloudError::Timeout`] once `spec.timeout` has elapsed.
/// "Not yet visible" answers count as pending.
pub async fn wait_for_state<P: RefreshProbe>(mut spec: WaitSpec<P>) -> Result<P::Object> {
    let start = Instant::now();
    let deadline = start + spec.timeout;
    let mut attempts = 0u32;
    let mut last_state: Option<String> = None;

    loop {
        attempts += 1;

        match spec.probe.refresh().await? {
            Some(observed) if observed.state == spec.target => {
                tracing::debug!(
                    resource = %spec.probe.resource_id(),
                    state = %observed.state,
                    attempts,
                    "Reached target state"
                );
                return Ok(observed.object);
            }
            Some(observed) => {
                if !spec.is_pending(&observed.state) {
                    tracing::warn!(
                        resource = %spec.probe.resource_id(),
                        state = %observed.state,
                        target = %spec.target,
                        "Unexpected state while waiting"
                    );
                    return Err(CloudError::UnexpectedState {
                        resource_id: spec.probe.resource_id().to_string(),
                        state: observed.state,
                        target: spec.target,
                    });
                }

                if last_state.as_deref() != Some(observed.state.as_str()) {
                    tracing::debug!(
                        resource = %spec.probe.resource_id(),
                        state = %observed.state,
                        target = %spec.target,
                        "Waiting for state change"
                    );
                    last_state = Some(observed.state);
                }
            }
            None => {
                tracing::debug!(
                    resource = %spec.probe.resource_id(),
                    attempt = attempts,
                    "Object not visible yet"
                );
            }
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                resource = %spec.probe.resource_id(),
                target = %spec.target,
                attempts,
                "Timed out waiting for state"
            );
            return Err(CloudError::Timeout {
                resource_id: spec.probe.resource_id().to_string(),
                target: spec.target,
                timeout: spec.timeout,
            });
        }

        tokio::time::sleep(spec.poll_interval.min(deadline - now)).await;
    }
}
