//! Cancellation and deadline scope bound to every request a client issues.
//!
//! # Design
//! A `Context` pairs a `CancellationToken` with an optional deadline. Clones
//! share the token with the `CancelHandle` the context was created with. The
//! client checks the context before sending and after the transport
//! returns; transports race their I/O against `done()` (async) or park on
//! `wait()` (blocking) so a cancel from another thread wakes them up.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline and cancellation state shared by a client and its requests.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

/// Cancels the `Context` it was created with, and every clone of it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    fn with_state(deadline: Option<Instant>) -> (Self, CancelHandle) {
        let token = CancellationToken::new();
        let handle = CancelHandle {
            token: token.clone(),
        };
        (Self { token, deadline }, handle)
    }

    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::with_state(None).0
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        Self::with_state(None)
    }

    pub fn with_deadline(deadline: Instant) -> (Self, CancelHandle) {
        Self::with_state(Some(deadline))
    }

    /// Deadline `timeout` from now. A timeout too large to represent
    /// behaves like no deadline.
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        Self::with_state(Instant::now().checked_add(timeout))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// `Some` once the context is cancelled or past its deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes. Needs
    /// a tokio runtime with the time driver enabled.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => ContextError::Cancelled,
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        self.err().unwrap_or(ContextError::DeadlineExceeded)
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Block until the context is done or `max` has elapsed, whichever comes
    /// first. Returns the reason when the context finished. Must not be
    /// called from inside an async runtime.
    pub fn wait(&self, max: Duration) -> Option<ContextError> {
        if let Some(err) = self.err() {
            return Some(err);
        }
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(%err, "cannot build runtime to wait on context");
                return self.err();
            }
        };
        runtime.block_on(async { tokio::time::timeout(max, self.done()).await.ok() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn background_is_never_done() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
        assert_eq!(ctx.wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn cancel_marks_every_clone() {
        let (ctx, cancel) = Context::with_cancel();
        let copy = ctx.clone();
        assert!(!copy.is_done());
        cancel.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
        assert_eq!(copy.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn past_deadline_is_exceeded() {
        let (ctx, _cancel) = Context::with_deadline(Instant::now());
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancel_wins_over_deadline() {
        let (ctx, cancel) = Context::with_deadline(Instant::now());
        cancel.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn timeout_expires_while_waiting() {
        let (ctx, _cancel) = Context::with_timeout(Duration::from_millis(20));
        assert!(ctx.remaining().is_some());
        let started = Instant::now();
        assert_eq!(
            ctx.wait(Duration::from_secs(5)),
            Some(ContextError::DeadlineExceeded)
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn huge_timeout_behaves_like_no_deadline() {
        let (ctx, _cancel) = Context::with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_done());
    }

    #[test]
    fn wait_wakes_on_cancel_from_another_thread() {
        let (ctx, cancel) = Context::with_cancel();
        let waiter = thread::spawn(move || ctx.wait(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert_eq!(waiter.join().unwrap(), Some(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn done_resolves_on_cancel() {
        let (ctx, cancel) = Context::with_cancel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        assert_eq!(ctx.done().await, ContextError::Cancelled);
    }
}
