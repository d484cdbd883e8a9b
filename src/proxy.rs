//! sentinelmc/src/proxy.rs
//! The dispatcher: accept loop, per-connection worker, Status/Login
//! branching, handoff replay, bidirectional bridging, the active-player
//! set, and the idle-shutdown timer.

use crate::config::Config;
use crate::error::Result;
use crate::packet::{self, Handshake, NEXT_STATE_LOGIN, NEXT_STATE_STATUS};
use crate::server::{Server, ServerState};
use crate::status::StatusResponse;
use dashmap::DashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The fixed pre-login text messages.
mod messages {
    pub const SERVER_STOPPED: &str = "server is stopped";
    pub const SERVER_STARTING: &str = "server is starting...";
    pub const SERVER_STOPPING: &str = "server is stopping...";
    pub const SERVER_START_INITIATED: &str = "server start initiated";
    pub const SERVER_START_FAILED: &str = "server start failed";
    pub const SERVER_CONNECT_FAILED: &str = "server connect failed";
}

/// Shared state owned by the dispatcher and handed to every worker.
struct Dispatcher {
    config: Config,
    upstream_addr: String,
    server: Arc<dyn Server>,
    players: DashSet<String>,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
}

/// Rewrites a `:PORT`-shorthand address into a bindable/dialable one.
fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

/// Wraps the client stream so that, when `--debug` is set, every byte
/// read from or written to it is logged as hex — mirrors
/// `ClientConn.Read`/`Write` in the original implementation, which logs
/// through the packet handshake/status/ping exchange and then keeps
/// logging through the bridged bytes, since the bridge pipes the same
/// wrapped connection rather than the raw socket.
struct DebugStream<S> {
    inner: S,
    enabled: bool,
}

impl<S> DebugStream<S> {
    fn new(inner: S, enabled: bool) -> Self {
        Self { inner, enabled }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl<S: AsyncRead + Unpin> AsyncRead for DebugStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if this.enabled {
            if let Poll::Ready(Ok(())) = &poll {
                let data = &buf.filled()[before..];
                if !data.is_empty() {
                    debug!(target: "client_stream", "read: {}", to_hex(data));
                }
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DebugStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if this.enabled {
            if let Poll::Ready(Ok(n)) = &poll {
                if *n > 0 {
                    debug!(target: "client_stream", "write: {}", to_hex(&buf[..*n]));
                }
            }
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Binds the listener and accepts connections forever. Accept errors are
/// logged and the loop continues; only a bind failure is fatal.
pub async fn run(config: Config, server: Arc<dyn Server>) -> Result<()> {
    let listen_addr = normalize_addr(&config.proxy_addr);
    let listener = TcpListener::bind(&listen_addr).await?;
    info!("listening on {listen_addr}");

    let dispatcher = Arc::new(Dispatcher {
        upstream_addr: normalize_addr(&config.server_addr),
        players: DashSet::new(),
        idle_timer: Mutex::new(None),
        config,
        server,
    });

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("accepted connection from {peer}");
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    handle_connection(socket, dispatcher).await;
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
}

async fn handle_connection<S>(client: S, dispatcher: Arc<Dispatcher>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut client = DebugStream::new(client, dispatcher.config.debug);

    let handshake = match packet::read_handshake(&mut client).await {
        Ok(h) => h,
        Err(e) => {
            warn!("handshake read failed: {e}");
            return;
        }
    };

    match handshake.next_state {
        NEXT_STATE_STATUS => handle_status(&mut client, &dispatcher).await,
        NEXT_STATE_LOGIN => handle_login(client, handshake, dispatcher).await,
        other => warn!("handshake declared unexpected next_state {other}"),
    }
}

async fn handle_status<S>(client: &mut S, dispatcher: &Dispatcher)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = packet::read_status_request(client).await {
        warn!("status request read failed: {e}");
        return;
    }

    let state = dispatcher.server.state();
    let status = StatusResponse::new(
        state.status_tag(),
        &dispatcher.config.version_name,
        dispatcher.config.version_protocol,
        dispatcher.players.len() as i32,
        dispatcher.config.players_max,
    );

    if let Err(e) = packet::write_status(client, &status).await {
        warn!("status write failed: {e}");
        return;
    }

    if let Err(e) = packet::read_and_echo_ping(client).await {
        warn!("ping exchange failed: {e}");
    }
}

async fn handle_login<S>(mut client: S, handshake: Handshake, dispatcher: Arc<Dispatcher>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match dispatcher.server.state() {
        ServerState::Starting => {
            if let Err(e) = packet::write_text(&mut client, messages::SERVER_STARTING).await {
                warn!("failed to send starting message: {e}");
            }
        }
        ServerState::Stopping => {
            if let Err(e) = packet::write_text(&mut client, messages::SERVER_STOPPING).await {
                warn!("failed to send stopping message: {e}");
            }
        }
        ServerState::Stopped => {
            if dispatcher.config.autostart_enabled() {
                match dispatcher.server.start().await {
                    Ok(()) => {
                        if let Err(e) =
                            packet::write_text(&mut client, messages::SERVER_START_INITIATED).await
                        {
                            warn!("failed to send start-initiated message: {e}");
                        }
                    }
                    Err(e) => {
                        warn!("server start failed: {e}");
                        if let Err(e) =
                            packet::write_text(&mut client, messages::SERVER_START_FAILED).await
                        {
                            warn!("failed to send start-failed message: {e}");
                        }
                    }
                }
            } else if let Err(e) = packet::write_text(&mut client, messages::SERVER_STOPPED).await
            {
                warn!("failed to send stopped message: {e}");
            }
        }
        ServerState::Running => {
            let login = match packet::read_login_start(&mut client).await {
                Ok(l) => l,
                Err(e) => {
                    warn!("login start read failed: {e}");
                    return;
                }
            };

            let mut upstream = match TcpStream::connect(&dispatcher.upstream_addr).await {
                Ok(s) => s,
                Err(e) => {
                    warn!("upstream dial failed: {e}");
                    if let Err(e) =
                        packet::write_text(&mut client, messages::SERVER_CONNECT_FAILED).await
                    {
                        warn!("failed to send connect-failed message: {e}");
                    }
                    return;
                }
            };

            if let Err(e) = upstream.write_all(&handshake.raw).await {
                warn!("handoff handshake replay failed: {e}");
                return;
            }
            if let Err(e) = upstream.write_all(&login.raw).await {
                warn!("handoff login-start replay failed: {e}");
                return;
            }

            dispatcher.players.insert(login.username.clone());
            cancel_idle_timer(&dispatcher).await;

            bridge(client, upstream).await;

            dispatcher.players.remove(&login.username);
            if dispatcher.players.is_empty() {
                arm_idle_timer(dispatcher.clone()).await;
            }
        }
    }
}

/// Bridges two duplex streams until either side closes. A shared atomic
/// stop flag is checked before every read; on any read/write error or
/// peer close, the offending direction flips the flag and shuts its
/// write half down, which unblocks the other direction's next write.
async fn bridge<C, U>(client: C, upstream: U)
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_r, mut client_w) = tokio::io::split(client);
    let (mut upstream_r, mut upstream_w) = tokio::io::split(upstream);
    let stop = Arc::new(AtomicBool::new(false));

    tokio::join!(
        copy_direction(&mut client_r, &mut upstream_w, stop.clone()),
        copy_direction(&mut upstream_r, &mut client_w, stop)
    );
}

async fn copy_direction<R, W>(reader: &mut R, writer: &mut W, stop: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match reader.read(&mut buf).await {
            Ok(0) => {
                stop.store(true, Ordering::SeqCst);
                break;
            }
            Ok(n) => {
                if writer.write_all(&buf[..n]).await.is_err() {
                    stop.store(true, Ordering::SeqCst);
                    break;
                }
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

/// Arming is idempotent-by-replacement: any outstanding timer is
/// aborted before the new one is installed. A no-op when autostart is
/// disabled, since there is nothing to stop.
async fn arm_idle_timer(dispatcher: Arc<Dispatcher>) {
    if !dispatcher.config.autostart_enabled() {
        return;
    }
    let mut guard = dispatcher.idle_timer.lock().await;
    if let Some(handle) = guard.take() {
        handle.abort();
    }
    let timeout = Duration::from_secs(dispatcher.config.stop_timeout);
    let d = dispatcher.clone();
    *guard = Some(tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Err(e) = d.server.stop().await {
            info!("idle-timeout stop rejected (server already stopped or stopping): {e}");
        }
    }));
}

async fn cancel_idle_timer(dispatcher: &Dispatcher) {
    let mut guard = dispatcher.idle_timer.lock().await;
    if let Some(handle) = guard.take() {
        handle.abort();
    }
}
