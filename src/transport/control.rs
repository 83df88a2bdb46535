// src/transport/control.rs
// =============================================================================
// A minimal Tor control-port client.
//
// We only need three things from the control protocol:
// - a reachability check (can we open a TCP connection at all?)
// - AUTHENTICATE, answered by "250 OK" on success
// - QUIT when we are done
//
// The protocol is line based: commands end with CRLF and every reply line
// starts with a three digit status code. "250" means success.
// =============================================================================

use crate::error::TransportError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

const REACH_TIMEOUT: Duration = Duration::from_secs(2);

/// Returns true if something is listening on the control port.
///
/// The connection is dropped right away, so probing never changes any state.
pub async fn is_reachable(port: u16) -> bool {
    matches!(
        tokio::time::timeout(REACH_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

/// An authenticated control connection
pub struct ControlConnection {
    port: u16,
    stream: BufReader<TcpStream>,
}

impl ControlConnection {
    /// Connects to the control port and authenticates
    pub async fn open(port: u16, password: Option<&str>) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|source| TransportError::Control { port, source })?;

        let mut conn = ControlConnection {
            port,
            stream: BufReader::new(stream),
        };
        conn.authenticate(password).await?;
        debug!(port, "authenticated on tor control port");
        Ok(conn)
    }

    async fn authenticate(&mut self, password: Option<&str>) -> Result<(), TransportError> {
        let command = match password {
            Some(password) => format!("AUTHENTICATE \"{}\"\r\n", quote(password)),
            None => "AUTHENTICATE\r\n".to_string(),
        };
        self.send(&command).await?;

        let reply = self.read_reply().await?;
        if reply.starts_with("250") {
            Ok(())
        } else {
            Err(TransportError::Authentication(reply))
        }
    }

    /// Sends QUIT and drops the connection. Errors are ignored since the
    /// other side may already be gone.
    pub async fn close(mut self) {
        if self.send("QUIT\r\n").await.is_ok() {
            let _ = self.read_reply().await;
        }
        let _ = self.stream.get_mut().shutdown().await;
    }

    async fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let port = self.port;
        self.stream
            .get_mut()
            .write_all(command.as_bytes())
            .await
            .map_err(|source| TransportError::Control { port, source })
    }

    // Reads a whole reply. Multi-line replies use "250-" on every line but the
    // last, which uses "250 ".
    async fn read_reply(&mut self) -> Result<String, TransportError> {
        let port = self.port;
        let mut last = String::new();
        loop {
            let mut line = String::new();
            let read = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(|source| TransportError::Control { port, source })?;
            if read == 0 {
                return Err(TransportError::Control {
                    port,
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "control connection closed",
                    ),
                });
            }
            last = line.trim_end().to_string();
            if last.len() < 4 || last.as_bytes()[3] == b' ' {
                return Ok(last);
            }
        }
    }
}

// Escapes a password for use inside a quoted control-protocol string
fn quote(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
