//! Fire-and-forget invocation of named units of work.
//!
//! The dispatcher hands every batch to an [`Invoker`], naming the fulfiller by
//! its configured target name. An invoker only reports whether the hand-off
//! was accepted; it never waits for, or reports on, the work itself.

mod recording;

pub use recording::{Invocation, RecordingInvoker};

use crate::InvokeError;
use core::future::Future;

/// Asynchronously starts a named unit of work with a JSON payload.
pub trait Invoker: Send + Sync + 'static {
    /// Submits `payload` to `target`.
    ///
    /// Returning `Ok` means the submission was accepted, not that the work
    /// succeeded.
    fn invoke(
        &self,
        target: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), InvokeError>> + Send;
}
