//! Single-flight token refresh for the client.
//!
//! Many requests can fail at once when the access token expires. The first
//! one to notice moves the coordinator from `Idle` to `Refreshing` and makes
//! the only refresh call; the rest queue behind it and are resolved or
//! rejected together when that call settles. Each original request is then
//! replayed at most once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::session::ClientSession;
use super::ClientError;
use crate::models::PrincipalView;

/// Performs the actual refresh call against the server.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<PrincipalView, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Renewed,
    Failed,
}

enum CoordinatorState {
    Idle,
    /// Waiters queued behind the in-flight refresh, in arrival order.
    Refreshing(Vec<oneshot::Sender<RefreshOutcome>>),
}

pub struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
    refresher: Arc<dyn Refresher>,
    session: Arc<ClientSession>,
    timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn Refresher>,
        session: Arc<ClientSession>,
        timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::Idle),
            refresher,
            session,
            timeout,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), CoordinatorState::Refreshing(_))
    }

    /// Number of callers waiting on the in-flight refresh.
    pub fn queued(&self) -> usize {
        match &*self.state.lock() {
            CoordinatorState::Idle => 0,
            CoordinatorState::Refreshing(waiters) => waiters.len(),
        }
    }

    /// Runs `attempt`; if it fails with `Unauthorized`, refreshes (joining any
    /// refresh already in flight) and runs it exactly once more. A second
    /// failure is returned as is.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match attempt().await {
            Err(ClientError::Unauthorized) => {}
            other => return other,
        }

        self.refresh().await?;
        attempt().await
    }

    /// Ensures the session has been refreshed, issuing at most one refresh
    /// call no matter how many callers arrive while it is in flight.
    ///
    /// Every failure (rejection, transport error, timeout) yields
    /// `ClientError::SessionExpired` and clears the client session.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let waiter = {
            let mut state = self.state.lock();
            match &mut *state {
                CoordinatorState::Refreshing(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                CoordinatorState::Idle => {
                    *state = CoordinatorState::Refreshing(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            debug!("refresh already in flight, queued");
            return match rx.await {
                Ok(RefreshOutcome::Renewed) => Ok(()),
                _ => Err(ClientError::SessionExpired),
            };
        }

        let in_flight = InFlight { coordinator: self };
        let outcome = match tokio::time::timeout(self.timeout, self.refresher.refresh()).await {
            Ok(Ok(user)) => {
                self.session.establish(user);
                RefreshOutcome::Renewed
            }
            Ok(Err(e)) => {
                warn!("token refresh failed: {}", e);
                RefreshOutcome::Failed
            }
            Err(_) => {
                warn!("token refresh timed out after {:?}", self.timeout);
                RefreshOutcome::Failed
            }
        };

        if outcome == RefreshOutcome::Failed {
            self.session.clear();
        }
        in_flight.settle(outcome);

        match outcome {
            RefreshOutcome::Renewed => Ok(()),
            RefreshOutcome::Failed => Err(ClientError::SessionExpired),
        }
    }

    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *self.state.lock(), CoordinatorState::Idle) {
            CoordinatorState::Refreshing(waiters) => waiters,
            CoordinatorState::Idle => Vec::new(),
        };
        info!("refresh settled ({:?}), releasing {} queued request(s)", outcome, waiters.len());
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.send(outcome);
        }
    }
}

/// Owned by the caller performing the refresh. If that caller's future is
/// dropped before the refresh settles, it counts as a failed refresh: the
/// session is cleared, the queue is rejected and the coordinator returns to
/// `Idle` instead of waiting forever.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl InFlight<'_> {
    fn settle(self, outcome: RefreshOutcome) {
        self.coordinator.settle(outcome);
        std::mem::forget(self);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        warn!("refresh abandoned before it settled");
        self.coordinator.session.clear();
        self.coordinator.settle(RefreshOutcome::Failed);
    }
}
