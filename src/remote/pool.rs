//! Prewarmed pool of single-use remote sessions.
//!
//! A background thread keeps authenticated sessions queued so per-target
//! latency never includes session setup. Sessions are taken once, run
//! exactly one command, and are closed; they are never returned to the pool.
//!
//! `capacity` bounds every open session, queued or on loan, so the pool never
//! holds more channels than the server allows per connection. A new session
//! is only opened once an earlier one has been closed.

use crate::error::{Result, ScanError};
use crate::timeout::{Deadline, TimeoutConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How often a blocked prewarmer re-checks the closed flag.
const CLOSE_POLL: Duration = Duration::from_millis(50);
/// Pause after a failed session open before retrying.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One remote command channel.
pub trait CommandSession: Send + 'static {
    /// Runs `command` and returns its standard output, failing once more
    /// than `limit` bytes arrive.
    fn exec(&mut self, command: &str, limit: u64) -> Result<Vec<u8>>;

    /// Releases the session.
    fn close(self) -> Result<()>;
}

/// Opens new sessions on an established connection.
pub trait SessionFactory: Send + Sync + 'static {
    type Session: CommandSession;

    /// Opens one session. A fatal error (see [`ScanError::is_fatal`]) means
    /// the connection is gone and no further session can be opened.
    fn open_session(&self) -> Result<Self::Session>;

    /// Tears down the underlying connection once the pool is closed.
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// State shared with the prewarmer thread.
struct Shared {
    closed: AtomicBool,
    /// Why the connection died, once it has.
    broken: Mutex<Option<String>>,
    /// One token per session that may still be opened.
    permits: (Sender<()>, Receiver<()>),
}

/// Returns its slot in the session budget when dropped.
struct Permit(Sender<()>);

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Bounded queue of ready sessions, refilled in the background.
pub struct SessionPool<F: SessionFactory> {
    queue: Receiver<PooledSession<F::Session>>,
    shared: Arc<Shared>,
    prewarmer: Mutex<Option<JoinHandle<()>>>,
    /// Held while a caller gathers more than one session.
    pairing: Mutex<()>,
    acquire: TimeoutConfig,
    capacity: usize,
    label: String,
}

impl<F: SessionFactory> SessionPool<F> {
    /// Starts prewarming up to `capacity` sessions from `factory`.
    pub fn start(
        label: impl Into<String>,
        factory: Arc<F>,
        capacity: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let label = label.into();
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);

        let permits = bounded(capacity);
        for _ in 0..capacity {
            let _ = permits.0.try_send(());
        }
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            broken: Mutex::new(None),
            permits,
        });

        let handle = {
            let shared = Arc::clone(&shared);
            let thread_label = label.clone();
            std::thread::Builder::new()
                .name("session-prewarm".into())
                .spawn(move || prewarm(&thread_label, &*factory, &tx, &shared))
                .map_err(|e| ScanError::Connect {
                    target: label.clone(),
                    message: format!("couldn't start session prewarmer: {e}"),
                })?
        };

        debug!(target = %label, capacity, "Session pool started");

        Ok(Self {
            queue: rx,
            shared,
            prewarmer: Mutex::new(Some(handle)),
            pairing: Mutex::new(()),
            acquire: TimeoutConfig::new(timeout, format!("session acquisition on {label}")),
            capacity,
            label,
        })
    }

    /// Takes a ready session, waiting at most the connection timeout.
    pub fn acquire(&self) -> Result<PooledSession<F::Session>> {
        let deadline = self.acquire.start();
        let session = self.take(&deadline)?;
        trace!(target = %self.label, idle = self.queue.len(), "Acquired session");
        Ok(session)
    }

    /// Takes two sessions at once, or neither.
    ///
    /// Callers gathering a pair are served one at a time, so no two of them
    /// can each hold one session while waiting for the last free slot. The
    /// connection timeout bounds the whole call.
    pub fn acquire_pair(&self) -> Result<(PooledSession<F::Session>, PooledSession<F::Session>)> {
        if self.capacity < 2 {
            return Err(ScanError::InvalidConfig(format!(
                "session pool for {} holds fewer than two sessions",
                self.label
            )));
        }
        let deadline = self.acquire.start();
        self.check_open()?;
        let _turn = self
            .pairing
            .try_lock_for(deadline.remaining()?)
            .ok_or_else(|| deadline.expired())?;
        let first = self.take(&deadline)?;
        let second = self.take(&deadline)?;
        trace!(target = %self.label, waited = ?deadline.elapsed(), "Acquired session pair");
        Ok((first, second))
    }

    fn take(&self, deadline: &Deadline) -> Result<PooledSession<F::Session>> {
        self.check_open()?;
        match self.queue.recv_timeout(deadline.remaining()?) {
            Ok(session) => Ok(session),
            Err(RecvTimeoutError::Timeout) => Err(deadline.expired()),
            Err(RecvTimeoutError::Disconnected) => {
                self.check_open()?;
                Err(ScanError::SessionPoolClosed(self.label.clone()))
            }
        }
    }

    /// Fails once the pool is closed or its connection is lost.
    fn check_open(&self) -> Result<()> {
        if let Some(message) = self.shared.broken.lock().as_ref() {
            return Err(ScanError::ConnectionLost {
                operation: format!("session open on {}", self.label),
                message: message.clone(),
            });
        }
        if self.is_closed() {
            return Err(ScanError::SessionPoolClosed(self.label.clone()));
        }
        Ok(())
    }

    /// Sessions currently queued and ready.
    pub fn idle(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stops prewarming and closes every queued session exactly once.
    ///
    /// Idempotent: only the first call does any work. Every close failure is
    /// collected into one error.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut errors = Vec::new();
        if let Some(handle) = self.prewarmer.lock().take() {
            if handle.join().is_err() {
                errors.push("session prewarmer panicked".to_string());
            }
        }

        let mut drained = 0usize;
        for session in self.queue.try_iter() {
            drained += 1;
            if let Err(e) = session.release() {
                errors.push(e.to_string());
            }
        }
        debug!(target = %self.label, drained, failures = errors.len(), "Session pool closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::SessionClose {
                target: self.label.clone(),
                errors,
            })
        }
    }
}

impl<F: SessionFactory> Drop for SessionPool<F> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Session pool closed with errors");
        }
    }
}

fn prewarm<F: SessionFactory>(
    label: &str,
    factory: &F,
    tx: &Sender<PooledSession<F::Session>>,
    shared: &Shared,
) {
    while !shared.closed.load(Ordering::Acquire) {
        match shared.permits.1.recv_timeout(CLOSE_POLL) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let permit = Permit(shared.permits.0.clone());

        let session = match factory.open_session() {
            Ok(session) => session,
            Err(e) if e.is_fatal() => {
                warn!(target = %label, error = %e, "Connection lost, no more sessions");
                *shared.broken.lock() = Some(e.to_string());
                break;
            }
            Err(e) => {
                debug!(target = %label, error = %e, "Couldn't open session");
                drop(permit);
                std::thread::sleep(RETRY_DELAY);
                continue;
            }
        };

        let mut pending = PooledSession {
            session: Some(session),
            _permit: permit,
        };
        loop {
            match tx.send_timeout(pending, CLOSE_POLL) {
                Ok(()) => {
                    trace!(target = %label, "Prewarmed session");
                    break;
                }
                Err(SendTimeoutError::Timeout(session))
                    if !shared.closed.load(Ordering::Acquire) =>
                {
                    pending = session;
                }
                // Dropping the unqueued session closes it.
                Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => {
                    trace!(target = %label, "End of session creation");
                    return;
                }
            }
        }
    }
    trace!(target = %label, "End of session creation");
}

/// A session on loan for exactly one command.
///
/// Closed after its command runs, or on drop if it was never used. Its slot
/// in the pool's budget is freed only after the close.
pub struct PooledSession<S: CommandSession> {
    session: Option<S>,
    _permit: Permit,
}

impl<S: CommandSession> PooledSession<S> {
    /// Runs one command, then closes the session.
    pub fn run(mut self, command: &str, limit: u64) -> Result<Vec<u8>> {
        let Some(mut session) = self.session.take() else {
            return Err(ScanError::SessionPoolClosed("released session".into()));
        };
        trace!(command, "Running remote command");
        let output = session.exec(command, limit);
        if let Err(e) = session.close() {
            debug!(command, error = %e, "Couldn't close session");
        }
        output
    }

    /// Closes the session without running anything.
    fn release(mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.close(),
            None => Ok(()),
        }
    }
}

impl<S: CommandSession> Drop for PooledSession<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close() {
                debug!(error = %e, "Couldn't close unused session");
            }
        }
    }
}
