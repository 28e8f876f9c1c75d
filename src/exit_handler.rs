//! Exit code logic for the tick-transfer process.
//!
//! Single responsibility: map completion/failure counts to the process exit outcome.

use crate::ProcessExit;

/// Determines the process exit outcome from completed and failed transfer counts.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
