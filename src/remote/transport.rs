//! SSH transport built on libssh2.
//!
//! One TCP connection and one authenticated [`ssh2::Session`] per remote
//! host. Every pooled session is a fresh channel on that connection.

use crate::config::RemoteConfig;
use crate::error::{is_transport_failure, Result, ScanError};
use crate::io::error::IoError;
use crate::io::read_bounded;
use crate::remote::auth::authenticate;
use crate::remote::pool::{CommandSession, SessionFactory};
use sha2::{Digest, Sha256};
use ssh2::{Channel, ErrorCode, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// libssh2's `LIBSSH2_ERROR_TIMEOUT`.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
/// Stderr kept for error reports.
const MAX_STDERR: u64 = 4096;

/// An authenticated SSH connection.
pub struct SshTransport {
    session: Session,
    target: String,
    timeout: Duration,
}

impl SshTransport {
    /// Connects, performs the handshake and authenticates.
    ///
    /// The host key is not verified; its SHA-256 fingerprint is logged.
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let target = format!("{}@{}", config.user, config.address());
        let connect_err = |message: String| ScanError::Connect {
            target: target.clone(),
            message,
        };

        let addr = config
            .address()
            .to_socket_addrs()
            .map_err(|e| connect_err(format!("couldn't resolve host: {e}")))?
            .next()
            .ok_or_else(|| connect_err("host resolved to no addresses".into()))?;

        debug!(%addr, timeout = ?config.timeout, "Connecting");
        let tcp = TcpStream::connect_timeout(&addr, config.timeout)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Session::new().map_err(|e| connect_err(e.to_string()))?;
        session
            .set_banner(&config.version)
            .map_err(|e| connect_err(e.to_string()))?;
        session.set_timeout(config.timeout.as_millis().min(u32::MAX as u128) as u32);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connect_err(format!("handshake failed: {e}")))?;

        if let Some((key, key_type)) = session.host_key() {
            let fingerprint = hex::encode(Sha256::digest(key));
            debug!(host = %config.host, ?key_type, %fingerprint, "Host key (not verified)");
        }

        authenticate(&session, &config.user, &config.host, &config.auth)?;
        info!(
            target = %target,
            server = session.banner().unwrap_or("unknown"),
            "SSH session established"
        );

        Ok(Self {
            session,
            target,
            timeout: config.timeout,
        })
    }
}

impl SessionFactory for SshTransport {
    type Session = SshChannel;

    fn open_session(&self) -> Result<SshChannel> {
        let channel = self
            .session
            .channel_session()
            .map_err(|e| map_ssh(e, "open session", self.timeout))?;
        Ok(SshChannel {
            channel,
            timeout: self.timeout,
        })
    }

    fn shutdown(&self) -> Result<()> {
        debug!(target = %self.target, "Disconnecting");
        self.session
            .disconnect(None, "scan complete", None)
            .map_err(|e| map_ssh(e, "disconnect", self.timeout))
    }
}

/// One exec channel, used for a single command.
pub struct SshChannel {
    channel: Channel,
    timeout: Duration,
}

impl CommandSession for SshChannel {
    fn exec(&mut self, command: &str, limit: u64) -> Result<Vec<u8>> {
        self.channel
            .exec(command)
            .map_err(|e| map_ssh(e, command, self.timeout))?;

        let stdout = read_bounded(&mut self.channel, limit, Path::new(command))
            .map_err(|e| map_io(e, command, self.timeout))?;

        let mut stderr = String::new();
        // Best effort: stderr only decorates the error.
        let _ = self
            .channel
            .stderr()
            .take(MAX_STDERR)
            .read_to_string(&mut stderr);

        self.channel
            .wait_close()
            .map_err(|e| map_ssh(e, command, self.timeout))?;
        let status = self
            .channel
            .exit_status()
            .map_err(|e| map_ssh(e, command, self.timeout))?;
        if status != 0 {
            return Err(ScanError::RemoteCommand {
                command: command.to_string(),
                status,
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(stdout)
    }

    fn close(mut self) -> Result<()> {
        self.channel
            .close()
            .map_err(|e| map_ssh(e, "close session", self.timeout))?;
        self.channel
            .wait_close()
            .map_err(|e| map_ssh(e, "close session", self.timeout))
    }
}

fn map_ssh(e: ssh2::Error, operation: &str, after: Duration) -> ScanError {
    match e.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => ScanError::timeout(operation, after),
        _ if is_transport_failure(&e) => ScanError::ConnectionLost {
            operation: operation.to_string(),
            message: e.message().to_string(),
        },
        _ => ScanError::Ssh(e),
    }
}

/// Channel reads surface libssh2 errors wrapped in `std::io::Error`.
fn map_io(e: IoError, operation: &str, after: Duration) -> ScanError {
    let (source, path) = match e {
        IoError::StdIo { source, path } => (source, path),
        other => return other.into(),
    };
    let lost = |message: String| ScanError::ConnectionLost {
        operation: operation.to_string(),
        message,
    };
    match source.kind() {
        ErrorKind::TimedOut => ScanError::timeout(operation, after),
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected => lost(source.to_string()),
        _ => match source.get_ref().and_then(|inner| inner.downcast_ref::<ssh2::Error>()) {
            Some(inner) if is_transport_failure(inner) => lost(inner.message().to_string()),
            _ => IoError::StdIo { source, path }.into(),
        },
    }
}
