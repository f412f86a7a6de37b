//! Agentless remote process scanning over SSH.
//!
//! Nothing is installed on the remote host. Its process table is listed with
//! one shell pipeline, and each executable is fetched with two commands run
//! concurrently on two pooled sessions: `readlink -f` for the canonical path
//! and `cat` for the bytes. Both sessions are taken together, so concurrent
//! readers never wait on each other while holding half a pair.

pub mod auth;
pub mod pool;
pub mod prompt;
pub mod protocol;
pub mod transport;

use crate::analysis::{RemoteImage, RemoteProcessTable};
use crate::config::RemoteConfig;
use crate::error::{Result, ScanError};
use crate::io::error::IoError;
use crate::remote::protocol::{
    cat_command, parse_pid_list, proc_exe, readlink_command, resolved_path, LIST_PIDS_COMMAND,
    MAX_TEXT_OUTPUT, WHOAMI_COMMAND,
};
use crate::remote::transport::SshTransport;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub use self::auth::AuthMethod;
pub use self::pool::{CommandSession, PooledSession, SessionFactory, SessionPool};
pub use self::prompt::Credentials;

/// A remote host reached over a pooled SSH connection.
pub struct RemoteHost<F: SessionFactory> {
    user: String,
    host: String,
    port: u16,
    factory: Option<Arc<F>>,
    pool: Option<SessionPool<F>>,
    closed: AtomicBool,
}

impl RemoteHost<SshTransport> {
    /// Connects to the configured host and starts prewarming sessions.
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;
        let transport = SshTransport::connect(config)?;
        Self::establish(config, Arc::new(transport))
    }
}

impl<F: SessionFactory> RemoteHost<F> {
    /// Wraps an established connection.
    pub fn establish(config: &RemoteConfig, factory: Arc<F>) -> Result<Self> {
        let mut host = Self::unconnected(config);
        let pool = SessionPool::start(
            host.to_string(),
            Arc::clone(&factory),
            config.pool_capacity,
            config.timeout,
        )?;
        host.factory = Some(factory);
        host.pool = Some(pool);

        match host.run(WHOAMI_COMMAND, MAX_TEXT_OUTPUT) {
            Ok(out) => info!(
                remote = %host,
                remote_user = %String::from_utf8_lossy(&out).trim(),
                "Remote shell ready"
            ),
            Err(e) => warn!(remote = %host, error = %e, "Couldn't determine remote user"),
        }
        Ok(host)
    }

    /// A handle with no connection behind it. Closing it is a no-op.
    pub fn unconnected(config: &RemoteConfig) -> Self {
        Self {
            user: config.user.clone(),
            host: config.host.clone(),
            port: config.port,
            factory: None,
            pool: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn pool(&self) -> Result<&SessionPool<F>> {
        match &self.pool {
            Some(pool) if !self.is_closed() => Ok(pool),
            _ => Err(ScanError::SessionPoolClosed(self.to_string())),
        }
    }

    /// Runs one command on a fresh session.
    pub fn run(&self, command: &str, limit: u64) -> Result<Vec<u8>> {
        self.pool()?.acquire()?.run(command, limit)
    }

    /// Lists PIDs whose executables the remote user can read.
    pub fn pids(&self) -> Result<Vec<u32>> {
        let out = self.run(LIST_PIDS_COMMAND, MAX_TEXT_OUTPUT)?;
        let pids = parse_pid_list(&out);
        debug!(remote = %self, count = pids.len(), "Found readable PIDs");
        trace!(?pids, "Remote PIDs");
        Ok(pids)
    }

    /// Fetches the executable of `pid`, resolving its canonical path
    /// concurrently. A failed resolution falls back to `/proc/<pid>/exe`
    /// unless the connection itself was lost.
    pub fn read_process(&self, pid: u32, limit: u64) -> Result<RemoteImage> {
        let (resolver, reader) = self.pool()?.acquire_pair()?;

        let (link, data) = std::thread::scope(|s| {
            let link = s.spawn(move || resolver.run(&readlink_command(pid), MAX_TEXT_OUTPUT));
            let data = reader.run(&cat_command(pid), limit);
            (link.join(), data)
        });

        let path = match link {
            Ok(Ok(out)) => resolved_path(&out, pid),
            Ok(Err(e)) if e.is_fatal() => {
                return Err(data.err().filter(ScanError::is_fatal).unwrap_or(e));
            }
            Ok(Err(e)) => {
                debug!(pid, error = %e, "readlink failed, using procfs path");
                proc_exe(pid)
            }
            Err(_) => {
                warn!(pid, "readlink worker panicked, using procfs path");
                proc_exe(pid)
            }
        };

        let data = data.map_err(|e| match e {
            ScanError::Io(IoError::FileTooLarge { limit, found, .. }) => IoError::FileTooLarge {
                path: proc_exe(pid).into(),
                limit,
                found,
            }
            .into(),
            other => other,
        })?;

        trace!(pid, path = %path, bytes = data.len(), "Fetched remote executable");
        Ok(RemoteImage {
            path,
            data: Bytes::from(data),
        })
    }

    /// Closes the session pool and the connection.
    ///
    /// Safe to call more than once, and on a handle that never connected.
    /// Every close failure is reported together.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut errors = Vec::new();
        if let Some(pool) = &self.pool {
            match pool.close() {
                Ok(()) => {}
                Err(ScanError::SessionClose { errors: inner, .. }) => errors.extend(inner),
                Err(e) => errors.push(e.to_string()),
            }
        }
        if let Some(factory) = &self.factory {
            if let Err(e) = factory.shutdown() {
                errors.push(e.to_string());
            }
        }
        debug!(remote = %self, "Remote host closed");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::SessionClose {
                target: self.to_string(),
                errors,
            })
        }
    }
}

impl<F: SessionFactory> fmt::Display for RemoteHost<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)?;
        if self.is_closed() {
            f.write_str(" (closed)")?;
        }
        Ok(())
    }
}

impl<F: SessionFactory> RemoteProcessTable for RemoteHost<F> {
    fn list_pids(&self) -> Result<Vec<u32>> {
        self.pids()
    }

    fn read_process(&self, pid: u32, limit: u64) -> Result<RemoteImage> {
        RemoteHost::read_process(self, pid, limit)
    }
}
