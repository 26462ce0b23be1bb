//! Fixed-delay retry for connections that must eventually come up

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Default delay between connection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run `attempt` until it succeeds, sleeping `delay` after each failure.
///
/// Never gives up; callers that need to stop wrap this in `tokio::select!`.
pub async fn retry_forever<T, E, F, Fut>(operation: &str, delay: Duration, mut attempt: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(operation, attempts, "✅ Succeeded after retrying");
                }
                return value;
            }
            Err(e) => {
                warn!(
                    operation,
                    attempt = attempts,
                    error = %e,
                    "Failed, retrying in {}s",
                    delay.as_secs_f64()
                );
                sleep(delay).await;
            }
        }
    }
}
