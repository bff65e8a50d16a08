use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use crate::bridge::Bridge;
use crate::constants::ERR_UNKNOWNCOMMAND;
use crate::dispatch::{AuthStage, CommandRegistry};
use crate::errors::BridgeError;
use crate::message::IrcMessage;
use crate::queue::OutboundQueue;

const READ_CHUNK: usize = 4096;

/// What the connection watchdog wants done this tick.
#[derive(Debug, PartialEq, Eq)]
enum WatchdogVerdict {
    Healthy,
    SendPing,
    Dead,
}

/// Shared handle onto the one client session. Handlers and the event
/// translator push lines through this; the socket loop drains them.
pub struct ServerHandle {
    hostname: String,
    queue: OutboundQueue,
    stage: RwLock<AuthStage>,
    running: AtomicBool,
    missed_ping: AtomicBool,
    deadline: Mutex<Instant>,
    timeout: Duration,
}

impl ServerHandle {
    pub fn new(hostname: &str, timeout: Duration) -> Self {
        ServerHandle {
            hostname: hostname.to_owned(),
            queue: OutboundQueue::new(),
            stage: RwLock::new(AuthStage::PreAuthentication),
            running: AtomicBool::new(false),
            missed_ping: AtomicBool::new(false),
            deadline: Mutex::new(Instant::now() + timeout),
            timeout,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn enqueue(&self, line: String) {
        self.queue.enqueue(line);
    }

    pub fn enqueue_priority(&self, line: String) {
        self.queue.enqueue_priority(line);
    }

    pub fn stage(&self) -> AuthStage {
        self.stage
            .read()
            .map(|s| *s)
            .unwrap_or(AuthStage::PreAuthentication)
    }

    pub fn set_stage(&self, stage: AuthStage) {
        if let Ok(mut s) = self.stage.write() {
            *s = stage;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Any sign of life from the client resets the watchdog.
    pub fn touch(&self) {
        self.missed_ping.store(false, Ordering::SeqCst);
        if let Ok(mut d) = self.deadline.lock() {
            *d = Instant::now() + self.timeout;
        }
    }

    /// Fresh state for a newly accepted connection.
    pub fn reset_session(&self) {
        self.set_stage(AuthStage::PreAuthentication);
        self.running.store(true, Ordering::SeqCst);
        self.touch();
        // anything queued for the previous client is stale
        self.queue.drain_priority();
        self.queue.drain_normal(usize::MAX);
    }

    fn watchdog_tick(&self) -> WatchdogVerdict {
        let expired = self
            .deadline
            .lock()
            .map(|d| Instant::now() >= *d)
            .unwrap_or(false);
        if !expired {
            return WatchdogVerdict::Healthy;
        }
        if self.missed_ping.swap(true, Ordering::SeqCst) {
            return WatchdogVerdict::Dead;
        }
        if let Ok(mut d) = self.deadline.lock() {
            *d = Instant::now() + self.timeout;
        }
        WatchdogVerdict::SendPing
    }

    #[cfg(test)]
    pub fn drain_all(&self) -> Vec<String> {
        let mut lines = self.queue.drain_priority();
        lines.extend(self.queue.drain_normal(usize::MAX));
        lines
    }
}

/// Accept loop. One client at a time; a new connection restarts the
/// registration handshake from scratch.
pub struct IrcServer;

impl IrcServer {
    pub async fn run(
        bridge: Arc<Bridge>,
        registry: Arc<CommandRegistry>,
    ) -> Result<(), BridgeError> {
        let addr = format!(
            "{}:{}",
            bridge.config().bind_address,
            bridge.config().port
        );
        let listener = TcpListener::bind(&addr).await?;
        log::info!("listening on {addr}");

        loop {
            let (stream, peer) = listener.accept().await?;
            log::info!("client connected from {peer}");
            bridge.reset_session();
            Self::serve(&bridge, &registry, stream).await;
            log::info!("client {peer} disconnected");
        }
    }

    async fn serve(bridge: &Arc<Bridge>, registry: &Arc<CommandRegistry>, mut stream: TcpStream) {
        let handle = bridge.server();
        let poll_interval = Duration::from_millis(bridge.config().poll_interval_ms);
        let outgoing_limit = bridge.config().outgoing_message_limit;
        let mut framing: Vec<u8> = Vec::new();

        while handle.is_running() {
            for line in handle.queue.drain_priority() {
                if Self::write_line(&mut stream, &line).await.is_err() {
                    handle.stop();
                    return;
                }
            }
            for line in handle.queue.drain_normal(outgoing_limit) {
                if Self::write_line(&mut stream, &line).await.is_err() {
                    handle.stop();
                    return;
                }
            }

            match handle.watchdog_tick() {
                WatchdogVerdict::Healthy => {}
                WatchdogVerdict::SendPing => {
                    handle.enqueue_priority(format!("PING :{}", handle.hostname()));
                }
                WatchdogVerdict::Dead => {
                    log::warn!("client failed to answer PING, closing connection");
                    handle.stop();
                    return;
                }
            }

            if !Self::read_available(&handle, registry, &stream, &mut framing) {
                handle.stop();
                return;
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn write_line(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
        log::debug!("> {line}");
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(b"\r\n").await
    }

    /// Pulls everything currently readable off the socket and feeds
    /// complete lines to the dispatcher. Returns false on EOF or a
    /// hard read error.
    fn read_available(
        handle: &Arc<ServerHandle>,
        registry: &Arc<CommandRegistry>,
        stream: &TcpStream,
        framing: &mut Vec<u8>,
    ) -> bool {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match stream.try_read(&mut buf) {
                Ok(0) => return false,
                Ok(n) => {
                    framing.extend_from_slice(&buf[..n]);
                    while let Some(pos) = framing.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = framing.drain(..=pos).collect();
                        Self::handle_line(handle, registry, &raw);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return true,
                Err(e) => {
                    log::warn!("read error: {e}");
                    return false;
                }
            }
        }
    }

    fn handle_line(handle: &Arc<ServerHandle>, registry: &Arc<CommandRegistry>, raw: &[u8]) {
        // lines that are not UTF-8 or do not parse are dropped quietly
        let Ok(text) = std::str::from_utf8(raw) else {
            return;
        };
        let line = text.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }
        log::debug!("< {line}");
        let Ok(message) = IrcMessage::parse(line) else {
            return;
        };
        handle.touch();

        match registry.get(handle.stage(), &message.command) {
            Some(handler) => {
                let fut = handler(message);
                tokio::spawn(fut);
            }
            None => {
                // unknown-command replies deliberately carry no prefix
                handle.enqueue(format!(
                    "{} {} :Unknown command",
                    ERR_UNKNOWNCOMMAND, message.command
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_ping_then_dead() {
        let handle = ServerHandle::new("irc.test", Duration::from_millis(0));
        assert_eq!(handle.watchdog_tick(), WatchdogVerdict::SendPing);
        assert_eq!(handle.watchdog_tick(), WatchdogVerdict::Dead);
    }

    #[test]
    fn test_watchdog_recovers_on_touch() {
        let handle = ServerHandle::new("irc.test", Duration::from_millis(0));
        assert_eq!(handle.watchdog_tick(), WatchdogVerdict::SendPing);
        handle.touch();
        // deadline of zero expires immediately, but the missed flag
        // was cleared so it pings again instead of giving up
        assert_eq!(handle.watchdog_tick(), WatchdogVerdict::SendPing);
    }

    #[test]
    fn test_watchdog_healthy_within_timeout() {
        let handle = ServerHandle::new("irc.test", Duration::from_secs(60));
        assert_eq!(handle.watchdog_tick(), WatchdogVerdict::Healthy);
    }

    #[test]
    fn test_reset_session_clears_queues() {
        let handle = ServerHandle::new("irc.test", Duration::from_secs(60));
        handle.enqueue("stale".to_owned());
        handle.enqueue_priority("stale!".to_owned());
        handle.set_stage(AuthStage::CapsNegotiated);
        handle.reset_session();
        assert!(handle.drain_all().is_empty());
        assert_eq!(handle.stage(), AuthStage::PreAuthentication);
        assert!(handle.is_running());
    }
}
