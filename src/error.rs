//! Failure modes of one authentication attempt.
//!
//! Every variant collapses to `false` at the `authenticate` boundary; the
//! enum exists for the library API and debug logs. Callers are deliberately
//! not told whether the credentials were wrong or the tool was unreachable.

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Username failed the allow-list guard; nothing was spawned.
    #[error("username rejected by input guard")]
    InvalidUsername,

    /// The external tool could not be started. Not retried.
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A pipe could not be captured or switched to non-blocking mode after
    /// spawn. Fatal for the attempt; the fresh process is cleaned up.
    #[error("failed to set up pipes: {source}")]
    Nonblocking {
        #[source]
        source: io::Error,
    },

    /// A timed pipe operation outlived its deadline.
    #[error("{op} timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },

    /// Pipe or process-status I/O failed mid-attempt. `op` names the stage,
    /// never the data that was in flight.
    #[error("{op} failed: {source}")]
    Pipe {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}
