//! Deterministic, pure logic shared by the funnel.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; the
//! only source of nondeterminism is the selector's generator, which can be
//! seeded.

pub mod handle;
pub mod invariants;
pub mod selector;
pub mod tracker;
pub mod types;
