//! Shared helpers for integration tests.
//!
//! The transfer manager owns a current-thread runtime and must be driven from
//! plain synchronous code, so mock servers live on a runtime of their own.

#![allow(dead_code)]

pub mod mock_host;
pub mod socket_guard;
