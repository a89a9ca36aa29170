//! World session over the Source RCON protocol.
//!
//! Packet layout, all integers little-endian:
//!
//! ```text
//! i32 length | i32 request id | i32 type | body bytes | 0x00 0x00
//! ```
//!
//! `length` counts everything after itself. Login is type 3, commands are
//! type 2 and command answers come back as type 0. A failed login answers
//! with request id -1.
//!
//! RCON cannot see player chat, so this session never emits
//! [`WorldEvent::ChatReceived`]; partner messages reach the agent through
//! the hub only.

use async_trait::async_trait;
use cobuild_core::{AgentError, BlockPos};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

use super::{WorldConnection, WorldConnector, WorldEvent, WorldSession, EVENT_BUFFER};

const TYPE_AUTH: i32 = 3;
const TYPE_COMMAND: i32 = 2;
const TYPE_AUTH_RESPONSE: i32 = 2;
const AUTH_FAILED_ID: i32 = -1;

/// Largest command body servers accept from a client.
const MAX_COMMAND_BODY: usize = 1446;
/// Largest answer body a server sends in one packet.
const MAX_RESPONSE_BODY: usize = 4096;

#[derive(Debug, Clone)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Player the session moves around.
    pub agent_name: String,
    pub command_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Packet {
    id: i32,
    kind: i32,
    body: String,
}

fn encode_packet(id: i32, kind: i32, body: &str) -> Vec<u8> {
    let length = (4 + 4 + body.len() + 2) as i32;
    let mut buf = Vec::with_capacity(body.len() + 14);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf.extend_from_slice(&[0, 0]);
    buf
}

async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Packet> {
    let length = reader.read_i32_le().await?;
    let length = usize::try_from(length)
        .ok()
        .filter(|len| (10..=MAX_RESPONSE_BODY + 10).contains(len))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad packet length {}", length)))?;
    let id = reader.read_i32_le().await?;
    let kind = reader.read_i32_le().await?;
    let mut rest = vec![0u8; length - 8];
    reader.read_exact(&mut rest).await?;
    rest.truncate(rest.len() - 2);
    Ok(Packet {
        id,
        kind,
        body: String::from_utf8_lossy(&rest).into_owned(),
    })
}

async fn write_packet<W: AsyncWrite + Unpin>(writer: &mut W, id: i32, kind: i32, body: &str) -> io::Result<()> {
    writer.write_all(&encode_packet(id, kind, body)).await?;
    writer.flush().await
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn clamp_body(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl WorldConnector for RconConfig {
    async fn connect(&self) -> Result<WorldConnection, AgentError> {
        RconSession::connect(self.clone()).await
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct RconSession {
    agent_name: String,
    stream: Mutex<TcpStream>,
    next_id: AtomicI32,
    lost: AtomicBool,
    events: mpsc::Sender<WorldEvent>,
    command_timeout: Duration,
}

impl std::fmt::Debug for RconSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconSession")
            .field("agent_name", &self.agent_name)
            .field("lost", &self.lost.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RconSession {
    /// Connect and log in. Emits [`WorldEvent::Spawned`] once authenticated.
    pub async fn connect(config: RconConfig) -> Result<WorldConnection, AgentError> {
        let agent = config.agent_name.clone();
        let session_lost = |reason: String| AgentError::SessionLost {
            agent: agent.clone(),
            reason,
        };

        let addr = format!("{}:{}", config.host, config.port);
        let mut stream = tokio::time::timeout(config.command_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| session_lost(format!("connect to {} timed out", addr)))?
            .map_err(|e| session_lost(format!("connect to {} failed: {}", addr, e)))?;

        let login = async {
            write_packet(&mut stream, 1, TYPE_AUTH, &config.password).await?;
            loop {
                let packet = read_packet(&mut stream).await?;
                if packet.kind == TYPE_AUTH_RESPONSE {
                    return Ok::<_, io::Error>(packet);
                }
            }
        };
        let answer = tokio::time::timeout(config.command_timeout, login)
            .await
            .map_err(|_| session_lost("login timed out".to_string()))?
            .map_err(|e| session_lost(format!("login failed: {}", e)))?;
        if answer.id == AUTH_FAILED_ID {
            return Err(session_lost("RCON password rejected".to_string()));
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let session = Arc::new(Self {
            agent_name: config.agent_name,
            stream: Mutex::new(stream),
            next_id: AtomicI32::new(2),
            lost: AtomicBool::new(false),
            events: tx,
            command_timeout: config.command_timeout,
        });
        tracing::info!(agent = %session.agent_name, %addr, "World session established");
        session.emit(WorldEvent::Spawned);

        Ok(WorldConnection {
            session,
            events: rx,
        })
    }

    fn emit(&self, event: WorldEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(agent = %self.agent_name, error = %e, "Dropping world event");
        }
    }

    fn lost_error(&self, reason: String) -> AgentError {
        AgentError::SessionLost {
            agent: self.agent_name.clone(),
            reason,
        }
    }

    /// Run one command. The first I/O failure marks the session lost; no
    /// reconnect is attempted.
    async fn command(&self, command: &str) -> Result<String, AgentError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(self.lost_error("session already lost".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = clamp_body(command, MAX_COMMAND_BODY);

        let mut stream = self.stream.lock().await;
        let exchange = async {
            write_packet(&mut *stream, id, TYPE_COMMAND, body).await?;
            read_packet(&mut *stream).await
        };
        let result = match tokio::time::timeout(self.command_timeout, exchange).await {
            Ok(Ok(packet)) => Ok(packet),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no answer within {:?}", self.command_timeout)),
        };
        drop(stream);

        match result {
            Ok(packet) => {
                if packet.id != id {
                    tracing::debug!(expected = id, got = packet.id, "Out-of-order RCON answer");
                }
                tracing::debug!(agent = %self.agent_name, command = %body, answer = %packet.body, "RCON command");
                Ok(packet.body)
            }
            Err(reason) => {
                if !self.lost.swap(true, Ordering::AcqRel) {
                    self.emit(WorldEvent::Error(reason.clone()));
                    self.emit(WorldEvent::Disconnected {
                        reason: reason.clone(),
                    });
                }
                Err(self.lost_error(reason))
            }
        }
    }
}

#[async_trait]
impl WorldSession for RconSession {
    async fn say(&self, text: &str) -> Result<(), AgentError> {
        let line = text.replace(['\n', '\r'], " ");
        self.command(&format!("say {}", line)).await.map(|_| ())
    }

    async fn place_block(&self, pos: BlockPos, block: &str) -> Result<(), AgentError> {
        self.command(&format!("setblock {} {} {} {}", pos.x, pos.y, pos.z, block))
            .await
            .map(|_| ())
    }

    async fn move_to(&self, pos: BlockPos) -> Result<(), AgentError> {
        self.command(&format!("tp {} {} {} {}", self.agent_name, pos.x, pos.y, pos.z))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Minimal RCON server: accepts one client, checks the password and
    /// forwards every command body. Closes after `serve_commands` commands.
    async fn fake_server(
        password: &'static str,
        serve_commands: usize,
    ) -> io::Result<(u16, mpsc::UnboundedReceiver<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let Ok(login) = read_packet(&mut socket).await else {
                return;
            };
            let reply_id = if login.body == password { login.id } else { AUTH_FAILED_ID };
            if write_packet(&mut socket, reply_id, TYPE_AUTH_RESPONSE, "").await.is_err() {
                return;
            }
            for _ in 0..serve_commands {
                let Ok(command) = read_packet(&mut socket).await else {
                    return;
                };
                let _ = tx.send(command.body);
                if write_packet(&mut socket, command.id, 0, "ok").await.is_err() {
                    return;
                }
            }
        });
        Ok((port, rx))
    }

    fn config(port: u16, password: &str) -> RconConfig {
        RconConfig {
            host: "127.0.0.1".to_string(),
            port,
            password: password.to_string(),
            agent_name: "Bot-1-A".to_string(),
            command_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_packet_layout() {
        let bytes = encode_packet(7, TYPE_COMMAND, "list");
        assert_eq!(&bytes[0..4], &14i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..16], b"list");
        assert_eq!(&bytes[16..], &[0, 0]);
    }

    #[tokio::test]
    async fn test_read_packet_rejects_bad_length() {
        let bytes = 3i32.to_le_bytes();
        let result = read_packet(&mut &bytes[..]).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_clamp_body_keeps_char_boundary() {
        assert_eq!(clamp_body("abc", 10), "abc");
        assert_eq!(clamp_body("héllo", 2), "h");
    }

    #[tokio::test]
    async fn test_commands_are_translated() -> TestResult {
        let (port, mut seen) = fake_server("secret", 3).await?;
        let mut connection = RconSession::connect(config(port, "secret")).await?;
        assert_eq!(connection.events.recv().await, Some(WorldEvent::Spawned));

        let session = connection.session.clone();
        session.move_to(BlockPos::new(110, 64, 110)).await?;
        session.place_block(BlockPos::new(111, 64, 110), "stone").await?;
        session.say("left\npillar").await?;

        assert_eq!(seen.recv().await.as_deref(), Some("tp Bot-1-A 110 64 110"));
        assert_eq!(seen.recv().await.as_deref(), Some("setblock 111 64 110 stone"));
        assert_eq!(seen.recv().await.as_deref(), Some("say left pillar"));
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_password_fails_connect() -> TestResult {
        let (port, _seen) = fake_server("secret", 0).await?;
        let result = RconSession::connect(config(port, "guess")).await;
        assert!(matches!(result, Err(AgentError::SessionLost { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_connection_loss_is_reported_once() -> TestResult {
        let (port, _seen) = fake_server("secret", 0).await?;
        let mut connection = RconSession::connect(config(port, "secret")).await?;
        assert_eq!(connection.events.recv().await, Some(WorldEvent::Spawned));

        let first = connection.session.say("hello").await;
        assert!(matches!(first, Err(AgentError::SessionLost { .. })));
        let second = connection.session.say("again").await;
        assert!(matches!(second, Err(AgentError::SessionLost { .. })));

        assert!(matches!(connection.events.recv().await, Some(WorldEvent::Error(_))));
        assert!(matches!(
            connection.events.recv().await,
            Some(WorldEvent::Disconnected { .. })
        ));
        assert!(connection.events.try_recv().is_err());
        Ok(())
    }
}
