//! In-memory engine state shared by every request.
//!
//! Core modules are free of filesystem and network I/O. They own the board,
//! the cooldown records, and the subscriber registry, and expose narrow,
//! thread-safe operations over them.

pub mod board;
pub mod broadcast;
pub mod color;
pub mod connection;
pub mod cooldown;
pub mod geometry;
pub mod types;
