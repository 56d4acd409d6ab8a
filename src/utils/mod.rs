//! Shared helpers for the tiered store.

pub mod retry;

pub use retry::{with_retry, RetryPolicy};
