//! Hard wall-clock deadlines for async operations.
//!
//! Both wrappers race an operation against a timer. If the operation wins,
//! its result (success or failure) is returned untouched. If the timer wins,
//! the wrapper fails with [`Error::Timeout`] carrying the caller's message.
//!
//! They differ in what happens to the losing operation:
//!
//! - [`with_deadline`] drops it. Dropping a future cancels it at its next
//!   suspension point, so in-flight HTTP requests are aborted and their
//!   connections released.
//! - [`with_deadline_detached`] spawns the operation onto the runtime and
//!   stops waiting for it. The operation keeps running in the background
//!   and its eventual result is discarded. Nothing is cleaned up early;
//!   use this only for work that must not be interrupted halfway.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::Error;

/// Race `operation` against `timeout`, cancelling it if the deadline wins.
pub async fn with_deadline<F, T, E>(
    operation: F,
    timeout: Duration,
    message: impl Into<String>,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Error>,
{
    // The timer is polled first so an operation finishing exactly at the
    // deadline still counts as late.
    tokio::select! {
        biased;
        _ = tokio::time::sleep(timeout) => {
            let message = message.into();
            debug!("Deadline of {timeout:?} elapsed: {message}");
            Err(Error::timeout(message).into())
        }
        result = operation => result,
    }
}

/// Race `operation` against `timeout`, leaving it running if the deadline
/// wins.
pub async fn with_deadline_detached<F, T, E>(
    operation: F,
    timeout: Duration,
    message: impl Into<String>,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<Error> + Send + 'static,
{
    let task = tokio::spawn(operation);
    tokio::select! {
        biased;
        _ = tokio::time::sleep(timeout) => {
            let message = message.into();
            debug!("Deadline of {timeout:?} elapsed, detaching operation: {message}");
            Err(Error::timeout(message).into())
        }
        joined = task => match joined {
            Ok(result) => result,
            Err(join_err) => Err(Error::provider(format!("operation aborted: {join_err}")).into()),
        },
    }
}
