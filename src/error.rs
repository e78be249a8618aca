//! Error taxonomy for the daemon.
//!
//! Mirrors the design's classification: configuration problems, transport
//! failures, protocol violations, handler-domain errors, and errors reported
//! by an LSP server itself. Only `Transport`/`Protocol` failures ever tear
//! down a client or an LSP connection; the rest are handled inline by the
//! caller and surfaced to the editor as a toast.

use thiserror::Error;

/// Top-level daemon error. Composition points (`main`, the event loop setup)
/// use `anyhow` over this; call sites that need to match on a variant use
/// this type directly.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Lsp(#[from] LspError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors specific to talking to a spawned LSP server.
#[derive(Debug, Error)]
pub enum LspError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server reported an error (code {code}): {message}")]
    ServerReported { code: i64, message: String },

    #[error("server process exited")]
    ServerDied,
}

pub type Result<T> = std::result::Result<T, DaemonError>;
