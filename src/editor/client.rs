//! Identifier for a connected editor socket.
//!
//! The connection itself (its write half, ssh host tag) lives directly in
//! `Daemon`'s bookkeeping maps — see `daemon.rs` — rather than behind a
//! dedicated struct, since the reader task that owns the read half and the
//! event loop that owns the write half run in different places.

pub type ClientId = u64;
