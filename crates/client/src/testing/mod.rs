//! Testing utilities
//!
//! - **[`mocks`]**: a scripted [`HttpTransport`](crate::http::HttpTransport)
//!   that records every request and can hold a route until released
//! - [`poll_until`]: wait for a condition on shared state

pub mod mocks;

use std::time::Duration;

pub use mocks::{Gate, RecordedRequest, ScriptedTransport};

/// Poll a condition until it becomes true or the timeout elapses.
///
/// # Returns
/// `true` if the condition was met before the timeout.
pub async fn poll_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    condition()
}
