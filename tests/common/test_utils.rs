//! Shared test utilities: scratch targets and an in-process remote host.

use entroscan::io::error::IoError;
use entroscan::remote::{CommandSession, SessionFactory};
use entroscan::{Result, ScanError};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Creates a temporary file with the given content.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

/// ELF magic followed by `len` pseudo-random bytes (entropy close to 8).
pub fn high_entropy_elf(len: usize, seed: u32) -> Vec<u8> {
    let mut data = b"\x7fELF".to_vec();
    let mut state = seed.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    data.extend((0..len).map(|_| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 24) as u8
    }));
    data
}

/// ELF magic followed by `len` zero bytes (entropy close to 0).
pub fn low_entropy_elf(len: usize) -> Vec<u8> {
    let mut data = b"\x7fELF".to_vec();
    data.resize(len + 4, 0);
    data
}

/// Writes `content` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Session lifecycle counters shared by a [`FakeHost`] and its sessions.
#[derive(Default)]
pub struct SessionCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub commands: AtomicUsize,
    pub live_max: AtomicUsize,
    pub refused: AtomicUsize,
}

impl SessionCounters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn live_max(&self) -> usize {
        self.live_max.load(Ordering::SeqCst)
    }

    pub fn refused(&self) -> usize {
        self.refused.load(Ordering::SeqCst)
    }

    fn live(&self) -> usize {
        self.opened().saturating_sub(self.closed())
    }
}

fn socket_disconnect() -> ScanError {
    ScanError::Ssh(ssh2::Error::new(
        ssh2::ErrorCode::Session(-13),
        "socket disconnect",
    ))
}

/// A remote host answering commands from a fixed table.
///
/// Unknown commands fail with exit status 1, like a missing file under `cat`.
pub struct FakeHost {
    outputs: Arc<HashMap<String, Vec<u8>>>,
    pub counters: Arc<SessionCounters>,
    /// Like sshd's `MaxSessions`: opens beyond this many live channels are refused.
    max_channels: Option<usize>,
    /// The connection drops once this command has answered.
    sever_after: Option<String>,
    severed: Arc<AtomicBool>,
}

impl FakeHost {
    pub fn new() -> Self {
        let mut outputs = HashMap::new();
        outputs.insert("whoami".to_string(), b"root\n".to_vec());
        Self {
            outputs: Arc::new(outputs),
            counters: Arc::default(),
            max_channels: None,
            sever_after: None,
            severed: Arc::default(),
        }
    }

    /// Answers `command` with `stdout`.
    pub fn respond(mut self, command: impl Into<String>, stdout: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.outputs).insert(command.into(), stdout.into());
        self
    }

    /// Adds a remote process: its readlink answer and executable bytes.
    pub fn process(self, pid: u32, exe: &str, image: &[u8]) -> Self {
        self.respond(format!("readlink -f /proc/{pid}/exe"), format!("{exe}\n"))
            .respond(format!("cat /proc/{pid}/exe"), image.to_vec())
    }

    pub fn max_channels(mut self, limit: usize) -> Self {
        self.max_channels = Some(limit);
        self
    }

    /// Drops the connection right after `command` answers.
    pub fn sever_after(mut self, command: impl Into<String>) -> Self {
        self.sever_after = Some(command.into());
        self
    }
}

pub struct FakeSession {
    outputs: Arc<HashMap<String, Vec<u8>>>,
    counters: Arc<SessionCounters>,
    sever_after: Option<String>,
    severed: Arc<AtomicBool>,
}

impl CommandSession for FakeSession {
    fn exec(&mut self, command: &str, limit: u64) -> Result<Vec<u8>> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(socket_disconnect());
        }
        self.counters.commands.fetch_add(1, Ordering::SeqCst);
        if self.sever_after.as_deref() == Some(command) {
            self.severed.store(true, Ordering::SeqCst);
        }
        let out = self
            .outputs
            .get(command)
            .cloned()
            .ok_or_else(|| ScanError::RemoteCommand {
                command: command.to_string(),
                status: 1,
                stderr: "No such file or directory".into(),
            })?;
        if out.len() as u64 > limit {
            return Err(IoError::FileTooLarge {
                path: command.into(),
                limit,
                found: out.len() as u64,
            }
            .into());
        }
        Ok(out)
    }

    fn close(self) -> Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SessionFactory for FakeHost {
    type Session = FakeSession;

    fn open_session(&self) -> Result<FakeSession> {
        if self.severed.load(Ordering::SeqCst) {
            return Err(socket_disconnect());
        }
        if self.max_channels.is_some_and(|limit| self.counters.live() >= limit) {
            self.counters.refused.fetch_add(1, Ordering::SeqCst);
            return Err(ScanError::Ssh(ssh2::Error::new(
                ssh2::ErrorCode::Session(-22),
                "channel open failure",
            )));
        }
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters
            .live_max
            .fetch_max(self.counters.live(), Ordering::SeqCst);
        Ok(FakeSession {
            outputs: Arc::clone(&self.outputs),
            counters: Arc::clone(&self.counters),
            sever_after: self.sever_after.clone(),
            severed: Arc::clone(&self.severed),
        })
    }
}
