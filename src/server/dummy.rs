//! sentinelmc/src/server/dummy.rs
//! A `Server` implementation whose state is permanently `Running` and
//! whose `start`/`stop`/`execute` are no-ops. Selected when no start
//! command is configured; disables autostart/stop semantics at the
//! dispatcher.

use super::{Server, ServerState};
use crate::error::Result;
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct DummyServer;

impl DummyServer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Server for DummyServer {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, _command: &str) -> Result<String> {
        Ok(String::new())
    }

    fn state(&self) -> ServerState {
        ServerState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn is_always_running_and_accepts_all_calls() {
        let s = DummyServer::new();
        assert_eq!(s.state(), ServerState::Running);
        s.start().await.unwrap();
        s.stop().await.unwrap();
        assert_eq!(s.execute("stop").await.unwrap(), "");
    }
}
