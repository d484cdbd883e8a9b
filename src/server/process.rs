//! sentinelmc/src/server/process.rs
//! Supervises a real child process as the Minecraft server: pipes its
//! stdin/stdout/stderr, watches stdout for the readiness marker, and
//! exposes the `Server` contract over it.

use super::{STOP_COMMAND, Server, ServerState};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{error, info, warn};

fn state_to_u8(state: ServerState) -> u8 {
    match state {
        ServerState::Stopped => 0,
        ServerState::Starting => 1,
        ServerState::Running => 2,
        ServerState::Stopping => 3,
    }
}

fn u8_to_state(v: u8) -> ServerState {
    match v {
        1 => ServerState::Starting,
        2 => ServerState::Running,
        3 => ServerState::Stopping,
        _ => ServerState::Stopped,
    }
}

#[cfg(unix)]
fn apply_process_group(cmd: &mut Command) {
    // Isolates the child from signals targeting the supervisor's
    // process group.
    cmd.process_group(0);
}

#[cfg(windows)]
fn apply_process_group(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

struct Inner {
    argv: Vec<String>,
    directory: String,
    done_markers: (String, String),
    state: AtomicU8,
    stdin: Mutex<Option<ChildStdin>>,
    /// The single pending `Execute` rendezvous, offered the next stdout
    /// line non-blockingly: dropped if no `Execute` call is waiting.
    pending_line: Mutex<Option<oneshot::Sender<String>>>,
    /// Fires once, when the exit watcher observes process exit. Created
    /// eagerly, never lazily, so a `stop()` call can never race its
    /// creation.
    exited: Notify,
}

impl Inner {
    fn state(&self) -> ServerState {
        u8_to_state(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state_to_u8(state), Ordering::SeqCst);
    }

    async fn read_stdout(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(target: "server", "{line}");
                    if self.state() == ServerState::Starting
                        && line.contains(&self.done_markers.0)
                        && line.contains(&self.done_markers.1)
                    {
                        info!("server reported ready, transitioning to Running");
                        self.set_state(ServerState::Running);
                    }
                    if let Some(tx) = self.pending_line.lock().await.take() {
                        let _ = tx.send(line);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("error reading server stdout: {e}");
                    break;
                }
            }
        }
    }

    async fn read_stderr(self: Arc<Self>, stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => warn!(target: "server", "{line}"),
                Ok(None) => break,
                Err(e) => {
                    warn!("error reading server stderr: {e}");
                    break;
                }
            }
        }
    }
}

/// A `Server` implementation that supervises a real child process.
pub struct ProcessServer(Arc<Inner>);

impl ProcessServer {
    pub fn new(argv: Vec<String>, directory: String, done_markers: (String, String)) -> Self {
        Self(Arc::new(Inner {
            argv,
            directory,
            done_markers,
            state: AtomicU8::new(state_to_u8(ServerState::Stopped)),
            stdin: Mutex::new(None),
            pending_line: Mutex::new(None),
            exited: Notify::new(),
        }))
    }

    fn build_command(&self) -> Result<Command> {
        let argv = &self.0.argv;
        let program = argv
            .first()
            .ok_or_else(|| Error::Child("no server start command configured".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(&argv[1..]);
        if !self.0.directory.is_empty() {
            cmd.current_dir(&self.0.directory);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        apply_process_group(&mut cmd);
        Ok(cmd)
    }
}

#[async_trait]
impl Server for ProcessServer {
    async fn start(&self) -> Result<()> {
        if self.0.state() != ServerState::Stopped {
            return Err(Error::InvalidState(
                "start called while server is not stopped".into(),
            ));
        }

        let mut cmd = self.build_command()?;
        let mut child: Child = cmd.spawn().map_err(|e| Error::Child(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Child("child stdin was not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Child("child stdout was not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Child("child stderr was not piped".into()))?;

        *self.0.stdin.lock().await = Some(stdin);
        self.0.set_state(ServerState::Starting);

        let stdout_inner = self.0.clone();
        let stdout_task = tokio::spawn(stdout_inner.read_stdout(stdout));

        let stderr_inner = self.0.clone();
        let stderr_task = tokio::spawn(stderr_inner.read_stderr(stderr));

        let exit_inner = self.0.clone();
        tokio::spawn(async move {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            match child.wait().await {
                Ok(status) => info!("server process exited: {status}"),
                Err(e) => error!("server process wait failed: {e}"),
            }
            exit_inner.set_state(ServerState::Stopped);
            exit_inner.exited.notify_one();
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        match self.0.state() {
            ServerState::Stopped => {
                return Err(Error::InvalidState(
                    "stop called while server is stopped".into(),
                ));
            }
            ServerState::Stopping => {
                return Err(Error::InvalidState(
                    "stop already in progress".into(),
                ));
            }
            ServerState::Starting | ServerState::Running => {}
        }

        {
            let mut guard = self.0.stdin.lock().await;
            let stdin = guard
                .as_mut()
                .ok_or_else(|| Error::Child("server has no stdin pipe".into()))?;
            stdin
                .write_all(format!("{STOP_COMMAND}\n").as_bytes())
                .await?;
        }

        self.0.set_state(ServerState::Stopping);
        self.0.exited.notified().await;
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String> {
        if self.0.state() != ServerState::Running {
            return Err(Error::InvalidState(
                "execute called while server is not running".into(),
            ));
        }

        let (tx, rx) = oneshot::channel();
        *self.0.pending_line.lock().await = Some(tx);

        {
            let mut guard = self.0.stdin.lock().await;
            let stdin = guard
                .as_mut()
                .ok_or_else(|| Error::Child("server has no stdin pipe".into()))?;
            stdin.write_all(format!("{command}\n").as_bytes()).await?;
        }

        rx.await
            .map_err(|_| Error::Child("stdout reader stopped before producing a line".into()))
    }

    fn state(&self) -> ServerState {
        self.0.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_with(argv: &[&str]) -> ProcessServer {
        ProcessServer::new(
            argv.iter().map(|s| s.to_string()).collect(),
            String::new(),
            ("INFO".to_string(), "Done".to_string()),
        )
    }

    #[tokio::test]
    async fn starts_stopped() {
        let server = server_with(&["true"]);
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn execute_rejected_unless_running() {
        let server = server_with(&["true"]);
        let err = server.execute("list").await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn stop_rejected_from_stopped() {
        let server = server_with(&["true"]);
        let err = server.stop().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn readiness_heuristic_requires_both_substrings() {
        let inner = Arc::new(Inner {
            argv: vec!["cat".to_string()],
            directory: String::new(),
            done_markers: ("INFO".to_string(), "Done".to_string()),
            state: AtomicU8::new(state_to_u8(ServerState::Starting)),
            stdin: Mutex::new(None),
            pending_line: Mutex::new(None),
            exited: Notify::new(),
        });

        // Neither substring alone flips state.
        inner.set_state(ServerState::Starting);
        let line = "[INFO]: server tick";
        if inner.state() == ServerState::Starting
            && line.contains(&inner.done_markers.0)
            && line.contains(&inner.done_markers.1)
        {
            inner.set_state(ServerState::Running);
        }
        assert_eq!(inner.state(), ServerState::Starting);

        let line = "[INFO]: Done (3.2s)! For help, type \"help\"";
        if inner.state() == ServerState::Starting
            && line.contains(&inner.done_markers.0)
            && line.contains(&inner.done_markers.1)
        {
            inner.set_state(ServerState::Running);
        }
        assert_eq!(inner.state(), ServerState::Running);
    }
}
