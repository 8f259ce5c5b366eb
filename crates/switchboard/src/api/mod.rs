//! Failure-handling primitives between request handlers and providers.
//!
//! - [`timeouts`]: [`TimeoutRegistry`], a keyed map of cancellable timers
//!   where rescheduling a key replaces (never leaks) the previous timer.
//! - [`deadline`]: [`with_deadline`] races an operation against a hard
//!   wall-clock limit; [`with_deadline_detached`] does the same without
//!   cancelling the loser.
//! - [`retry`]: [`with_retry`] / [`with_retry_config`], bounded sequential
//!   retries with exponential backoff and no jitter.
//! - [`streaming`]: [`normalize`] turns provider-framed chunks into plain
//!   text chunks, one for one.
//! - [`tracing`]: request ids and the cumulative [`CostTracker`].

pub mod deadline;
pub mod retry;
pub mod streaming;
pub mod timeouts;
pub mod tracing;

pub use deadline::{with_deadline, with_deadline_detached};
pub use retry::{RetryConfig, RetryPolicy, with_retry, with_retry_config};
pub use streaming::{ChunkStream, StreamPart, collect_text, normalize};
pub use timeouts::{TimeoutHandle, TimeoutRegistry};
pub use tracing::{CostTracker, generate_request_id};
