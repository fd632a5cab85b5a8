//! Single-byte hand-off of the microcontroller link.
//!
//! The live daemon listens on a local TCP port. Sending it the pause token
//! asks it to release the serial link and it answers with one byte once it
//! has. Sending the resume token asks it to take the link back. Nothing here
//! is authenticated: the token only avoids accidental contention on a
//! private network.
//!
//! Every failure of the pause handshake is fail-open. A daemon that is not
//! running and one that is too busy to answer look the same, and both let
//! flashing go ahead.

use crate::config::FieldConfig;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    NotPaused(HandshakeMiss),
}

impl PauseOutcome {
    pub fn is_paused(&self) -> bool {
        matches!(self, PauseOutcome::Paused)
    }
}

/// Why a handshake ended without the daemon confirming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMiss {
    ConnectTimeout,
    ReadTimeout,
    ClosedWithoutAck,
    Network(io::ErrorKind),
}

impl fmt::Display for HandshakeMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeMiss::ConnectTimeout => f.write_str("connect timed out"),
            HandshakeMiss::ReadTimeout => f.write_str("no acknowledgment before timeout"),
            HandshakeMiss::ClosedWithoutAck => f.write_str("connection closed without acknowledgment"),
            HandshakeMiss::Network(kind) => write!(f, "network error: {kind}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PauseCoordinator {
    pub addr: SocketAddr,
    pub token: u8,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl PauseCoordinator {
    pub fn from_config(config: &FieldConfig) -> Self {
        Self {
            addr: config.pause_addr(),
            token: config.pause_token,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }

    /// Asks the daemon to release the link.
    ///
    /// Returns within `connect_timeout + read_timeout`, and the connection is
    /// closed by the time it does.
    pub async fn request_pause(&self) -> PauseOutcome {
        info!(
            "Requesting pause at {} with token {:#04x}",
            self.addr, self.token
        );
        let outcome = self.handshake().await;
        match outcome {
            PauseOutcome::Paused => info!("Daemon paused, link released"),
            PauseOutcome::NotPaused(miss) => warn!(
                "Daemon not paused ({}): not running or already paused, flashing anyway",
                miss
            ),
        }
        outcome
    }

    async fn handshake(&self) -> PauseOutcome {
        let mut stream = match connect(self.addr, self.connect_timeout).await {
            Ok(stream) => stream,
            Err(miss) => return PauseOutcome::NotPaused(miss),
        };

        if let Err(e) = stream.write_all(&[self.token]).await {
            return PauseOutcome::NotPaused(HandshakeMiss::Network(e.kind()));
        }

        let mut ack = [0u8; 1];
        let outcome = match timeout(self.read_timeout, stream.read(&mut ack)).await {
            Err(_) => PauseOutcome::NotPaused(HandshakeMiss::ReadTimeout),
            Ok(Ok(0)) => PauseOutcome::NotPaused(HandshakeMiss::ClosedWithoutAck),
            Ok(Ok(_)) => {
                debug!("Pause acknowledged with {:#04x}", ack[0]);
                PauseOutcome::Paused
            }
            Ok(Err(e)) => PauseOutcome::NotPaused(HandshakeMiss::Network(e.kind())),
        };

        let _ = stream.shutdown().await;
        debug!("Pause socket to {} closed", self.addr);
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Sent,
    Skipped(HandshakeMiss),
}

/// Asks the daemon to take the link back. No acknowledgment is expected.
#[derive(Debug, Clone)]
pub struct ResumeTrigger {
    pub addr: SocketAddr,
    pub token: u8,
    pub timeout: Duration,
}

impl ResumeTrigger {
    pub fn from_config(config: &FieldConfig) -> Self {
        Self {
            addr: config.pause_addr(),
            token: config.resume_token,
            timeout: config.resume_timeout(),
        }
    }

    pub async fn send(&self) -> ResumeOutcome {
        let outcome = match connect(self.addr, self.timeout).await {
            Ok(mut stream) => match timeout(self.timeout, stream.write_all(&[self.token])).await {
                Ok(Ok(())) => {
                    let _ = stream.shutdown().await;
                    ResumeOutcome::Sent
                }
                Ok(Err(e)) => ResumeOutcome::Skipped(HandshakeMiss::Network(e.kind())),
                Err(_) => ResumeOutcome::Skipped(HandshakeMiss::ConnectTimeout),
            },
            Err(miss) => ResumeOutcome::Skipped(miss),
        };

        match outcome {
            ResumeOutcome::Sent => info!("Resume token {:#04x} sent to {}", self.token, self.addr),
            ResumeOutcome::Skipped(miss) => debug!("Resume not delivered to {}: {}", self.addr, miss),
        }
        outcome
    }
}

async fn connect(addr: SocketAddr, limit: Duration) -> Result<TcpStream, HandshakeMiss> {
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(HandshakeMiss::Network(e.kind())),
        Err(_) => Err(HandshakeMiss::ConnectTimeout),
    }
}
