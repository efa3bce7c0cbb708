//! Platform abstraction traits for Patchwork runtime services.
//!
//! These traits let the host environment decide when queued work is
//! flushed and where time comes from, so the core never reaches for a
//! particular event loop or clock directly.

/// Schedules work for the Patchwork runtime.
///
/// Implementations are told whenever the runtime has something to flush:
/// an instance was marked dirty, a local task was woken, or a timer was
/// armed. They must be safe to call from task wakers on any thread.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host flush the runtime soon.
    fn schedule_flush(&self);
}

/// Provides timing information for the runtime.
pub trait Clock: Send + Sync {
    /// Instant type produced by this clock implementation.
    type Instant: Copy + Send + Sync;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Returns the number of milliseconds elapsed since `since`.
    fn elapsed_millis(&self, since: Self::Instant) -> u64;
}
