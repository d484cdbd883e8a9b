//! sentinelmc/src/server/mod.rs
//! The server lifecycle controller contract: a state machine plus a
//! capability set {start, stop, execute, state} shared by a real
//! supervised child process and a dummy always-running stand-in.

mod dummy;
mod process;

pub use dummy::DummyServer;
pub use process::ProcessServer;

use crate::error::Result;
use async_trait::async_trait;

/// `Stopped -> Starting -> Running -> Stopping -> Stopped`. Transitions
/// are one-way within a lifecycle; no state is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServerState {
    /// The short status tag used in the Status branch's description text.
    pub fn status_tag(self) -> &'static str {
        match self {
            ServerState::Stopped => "[stopped]",
            ServerState::Starting => "[starting]",
            ServerState::Running => "[running]",
            ServerState::Stopping => "[stopping]",
        }
    }
}

/// The literal command sent to stdin to request a graceful shutdown.
pub const STOP_COMMAND: &str = "stop";

/// The contract the dispatcher uses to query and mutate server state.
/// The dispatcher never observes which implementation it holds.
#[async_trait]
pub trait Server: Send + Sync {
    /// Starts the server. Rejected with `Error::InvalidState` from any
    /// state other than `Stopped`.
    async fn start(&self) -> Result<()>;

    /// Requests a graceful shutdown. Rejected with `Error::InvalidState`
    /// from `Stopped`; a no-op-with-error from `Stopping` (a concurrent
    /// second call observes the in-progress shutdown); blocks the caller
    /// until the process has exited when called from `Starting` or
    /// `Running`.
    async fn stop(&self) -> Result<()>;

    /// Sends `command` to the server and returns the first subsequent
    /// stdout line. Allowed only when `state() == Running`.
    async fn execute(&self, command: &str) -> Result<String>;

    /// The current lifecycle state. A single-word atomic read; callers
    /// may observe a stale state for the duration of a transition.
    fn state(&self) -> ServerState;
}
