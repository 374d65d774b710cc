//! Epoch-marked cancellation
//!
//! Each stage owns one [`CancelScope`]. Resetting the scope cancels the
//! current token, hands out a fresh one, and advances the epoch; any work
//! issued under a prior epoch is void even if it later completes. Callers
//! must capture the token and epoch synchronously, before the first await,
//! or a reset can race the intent to call.

use tokio_util::sync::CancellationToken;

/// Generation marker invalidating previously issued asynchronous work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(pub u64);

impl Epoch {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owns the cancellation handle for one operation epoch.
#[derive(Debug)]
pub struct CancelScope {
    epoch: Epoch,
    token: CancellationToken,
}

impl CancelScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Epoch::default(),
            token: CancellationToken::new(),
        }
    }

    /// Cancels the current epoch's token and begins a new epoch.
    ///
    /// Idempotent with respect to an already-cancelled token. Returns the
    /// old token so in-flight callers can still observe its state.
    pub fn reset(&mut self) -> CancellationToken {
        let old = std::mem::replace(&mut self.token, CancellationToken::new());
        old.cancel();
        self.epoch = self.epoch.next();
        old
    }

    /// Token for the current epoch.
    ///
    /// Capture this synchronously before any suspension point.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The current epoch.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// True when `epoch` is still the live epoch.
    #[inline]
    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.epoch == epoch
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancelScope {
    fn drop(&mut self) {
        // Teardown counts as a final reset for anything still in flight.
        self.token.cancel();
    }
}
