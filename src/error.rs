//! sentinelmc/src/error.rs
//! The typed error hierarchy shared by the wire codec, packet layer, and
//! server controller.

/// Errors produced anywhere in the proxy core.
///
/// Protocol and packet errors abort only the connection worker that hit
/// them; controller errors (`InvalidState`, `Child`) propagate to the
/// dispatcher, which maps them to a user-visible text message where a
/// client socket is still open.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A VarInt, packet ID, or frame body did not match what was expected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An underlying socket or pipe operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A `Server` method was called in a state that forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Spawning or waiting on the child process failed.
    #[error("child process error: {0}")]
    Child(String),
}

pub type Result<T> = std::result::Result<T, Error>;
