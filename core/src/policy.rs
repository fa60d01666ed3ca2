//! Delivery of parse failures.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ArgError;

/// Process exit status used by [`ErrorPolicy::Exit`].
pub const EXIT_STATUS: i32 = 2;

/// How a node delivers a parse failure once it is detected.
///
/// Detection is identical under every policy; only the delivery differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Continue,
    /// Print the error to stderr and exit with [`EXIT_STATUS`].
    Exit,
    /// Panic with the error message.
    Panic,
}

/// Delivers `err` according to `policy`.
///
/// Returns the error under [`ErrorPolicy::Continue`]; the other policies do
/// not return.
pub(crate) fn deliver(policy: ErrorPolicy, err: ArgError) -> ArgError {
    match policy {
        ErrorPolicy::Continue => err,
        ErrorPolicy::Exit => {
            debug!(error = %err, "parse failed, exiting");
            eprintln!("error: {err}");
            std::process::exit(EXIT_STATUS);
        }
        ErrorPolicy::Panic => {
            debug!(error = %err, "parse failed, panicking");
            panic!("{err}");
        }
    }
}
