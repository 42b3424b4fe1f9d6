//! Follow-for-follow session funnel.
//!
//! A visitor registers a handle and a project, spins for a peer count, marks
//! each presented peer as followed and finally gets an outreach message to
//! copy or post. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (handle normalization, draws, follow tracking).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (HTTP backend, config file,
//!   clipboard). Behind traits so tests can script them.
//!
//! [`flow`] sequences the two into the session state machine; [`error`] holds
//! the error taxonomy it reports.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod flow;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
