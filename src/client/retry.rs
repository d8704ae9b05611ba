//! Bounded fixed-interval retry of a single network call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::connectivity::Connectivity;
use super::status::{StatusMessage, StatusSink};

/// Pause between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    /// The last attempt was skipped because the device was offline.
    SuspendedOffline,
    Succeeded,
    Exhausted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    /// Every attempt failed; only the user can restart the operation.
    #[error("retry limit exceeded after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Progress of one retry chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySession {
    max_attempts: u32,
    attempts_remaining: u32,
    state: RetryState,
}

impl RetrySession {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts_remaining: max_attempts,
            state: RetryState::Idle,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, RetryState::Succeeded | RetryState::Exhausted)
    }
}

/// Runs an action until it succeeds or its attempts run out.
///
/// Each attempt first asks the connectivity oracle; while offline the action
/// is not called but the attempt still counts. Failed and skipped attempts
/// wait a fixed delay before the next one.
pub struct RetryController<N> {
    connectivity: N,
    delay: Duration,
}

impl<N: Connectivity> RetryController<N> {
    pub fn new(connectivity: N) -> Self {
        Self {
            connectivity,
            delay: RETRY_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Starts a fresh chain of at most `max_attempts` attempts.
    ///
    /// `on_success` runs exactly once with the first successful payload, after
    /// which the status is cleared.
    pub async fn invoke<T, E, F, Fut, K>(
        &self,
        max_attempts: u32,
        status: &dyn StatusSink,
        action: F,
        on_success: K,
    ) -> Result<(), RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        K: FnOnce(T),
    {
        let mut session = RetrySession::new(max_attempts);
        self.run(&mut session, status, action, on_success).await
    }

    /// Drives `session` to a terminal state.
    pub async fn run<T, E, F, Fut, K>(
        &self,
        session: &mut RetrySession,
        status: &dyn StatusSink,
        mut action: F,
        on_success: K,
    ) -> Result<(), RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        K: FnOnce(T),
    {
        loop {
            if session.attempts_remaining == 0 {
                session.state = RetryState::Exhausted;
                status.publish(StatusMessage::RetryLimitExceeded);
                error!(attempts = session.max_attempts, "Retry limit exceeded");
                return Err(RetryError::Exhausted {
                    attempts: session.max_attempts,
                });
            }

            session.state = RetryState::Attempting;
            debug!(
                attempts_remaining = session.attempts_remaining,
                "Attempting request"
            );

            if !self.connectivity.is_online().await {
                session.state = RetryState::SuspendedOffline;
                session.attempts_remaining -= 1;
                status.publish(StatusMessage::ConnectivityDown);
                warn!(
                    attempts_remaining = session.attempts_remaining,
                    "Device offline, attempt skipped"
                );
            } else {
                match action().await {
                    Ok(payload) => {
                        on_success(payload);
                        status.clear();
                        session.state = RetryState::Succeeded;
                        return Ok(());
                    }
                    Err(e) => {
                        session.attempts_remaining -= 1;
                        status.publish(StatusMessage::ServerUnreachable);
                        warn!(
                            attempts_remaining = session.attempts_remaining,
                            error = %e,
                            "Request failed"
                        );
                    }
                }
            }

            if session.attempts_remaining > 0 {
                tokio::time::sleep(self.delay).await;
            }
        }
    }
}
