//! Cross-cutting runtime helpers

pub mod retry;
pub mod shutdown;

pub use retry::{retry_with_backoff, RetryConfig};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
