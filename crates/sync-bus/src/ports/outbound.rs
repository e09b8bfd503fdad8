//! Outbound (Driven) ports for the sync engine.
//!
//! The clock and the group-resolution collaborator are injected so the
//! engine never reaches for process-wide state.

use sync_types::{Timestamp, WindowId};

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Expands a group name into its member windows.
///
/// Used only to compute fanout targets for group sends, never for
/// permission decisions.
pub trait GroupResolver: Send + Sync {
    fn resolve(&self, group: &str) -> Vec<WindowId>;
}

impl<F> GroupResolver for F
where
    F: Fn(&str) -> Vec<WindowId> + Send + Sync,
{
    fn resolve(&self, group: &str) -> Vec<WindowId> {
        self(group)
    }
}

/// Mock time source for testing.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockTimeSource {
    time: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: std::sync::atomic::AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, time: Timestamp) {
        self.time.store(time, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(std::sync::atomic::Ordering::SeqCst)
    }
}
