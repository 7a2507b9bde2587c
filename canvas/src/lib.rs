//! Shared real-time pixel canvas engine.
//!
//! Many clients paint cells on a fixed-size board; every accepted change is
//! pushed to all live viewers, and a per-identity cooldown keeps any single
//! caller from dominating the board. The crate is split like this:
//!
//! - **[`core`]**: Shared in-memory state (board, cooldown gate, subscriber
//!   registry). Thread-safe, no I/O.
//! - **[`io`]**: Side effects (configuration files, board persistence).
//!
//! [`pipeline`] runs one mutation through validation, admission, the board
//! write, persistence and fan-out. [`engine`] builds all of it from a
//! [`io::config::CanvasConfig`].

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
