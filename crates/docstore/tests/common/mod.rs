//! Common test utilities and helpers

use docstore::testing::InMemoryTransport;
use docstore::{DocumentClient, RetryOptions};
use docstore_core::retry::ExponentialBackoff;
use std::time::Duration;

/// Retry options with tiny, deterministic delays
#[allow(dead_code)]
pub fn fast_retry() -> RetryOptions {
    let schedule = |retries| {
        ExponentialBackoff::builder()
            .max_retries(retries)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(8))
            .jitter(0.0)
            .build()
    };
    RetryOptions::default()
        .throttle_backoff(schedule(5))
        .transient_backoff(schedule(3))
}

/// Client over `store` using [`fast_retry`]
#[allow(dead_code)]
pub fn client(store: &InMemoryTransport) -> DocumentClient {
    DocumentClient::builder()
        .transport(store.clone())
        .retry_options(fast_retry())
        .build()
        .expect("transport is set")
}

/// Client over `store` starting from `token`
#[allow(dead_code)]
pub fn client_with_token(store: &InMemoryTransport, token: &str) -> DocumentClient {
    DocumentClient::builder()
        .transport(store.clone())
        .retry_options(fast_retry())
        .session_token(token)
        .build()
        .expect("transport is set")
}
