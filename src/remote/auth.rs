//! SSH authentication materials.
//!
//! Methods are attempted in the order they were registered; the first one the
//! server accepts wins.

use crate::error::{Result, ScanError};
use ssh2::Session;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, trace};

/// One way of authenticating to the remote host.
#[derive(Clone)]
pub enum AuthMethod {
    Password(String),
    /// Private key on disk, optionally passphrase-encrypted.
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// PEM-encoded private key held in memory.
    KeyMemory {
        private_key: String,
        passphrase: Option<String>,
    },
    /// Every identity offered by the local SSH agent.
    Agent,
}

impl AuthMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::Password(_) => "password",
            AuthMethod::KeyFile { .. } => "key-file",
            AuthMethod::KeyMemory { .. } => "key",
            AuthMethod::Agent => "agent",
        }
    }

    fn attempt(&self, session: &Session, user: &str) -> std::result::Result<(), ssh2::Error> {
        match self {
            AuthMethod::Password(password) => session.userauth_password(user, password),
            AuthMethod::KeyFile { path, passphrase } => {
                session.userauth_pubkey_file(user, None, path, passphrase.as_deref())
            }
            AuthMethod::KeyMemory {
                private_key,
                passphrase,
            } => session.userauth_pubkey_memory(user, None, private_key, passphrase.as_deref()),
            AuthMethod::Agent => {
                let mut agent = session.agent()?;
                agent.connect()?;
                agent.list_identities()?;
                let identities = agent.identities()?;
                trace!(count = identities.len(), "Agent identities");
                let mut last = None;
                for identity in &identities {
                    match agent.userauth(user, identity) {
                        Ok(()) => {
                            debug!(comment = identity.comment(), "Agent identity accepted");
                            let _ = agent.disconnect();
                            return Ok(());
                        }
                        Err(e) => last = Some(e),
                    }
                }
                let _ = agent.disconnect();
                Err(last.unwrap_or_else(|| {
                    ssh2::Error::new(
                        ssh2::ErrorCode::Session(-18),
                        "agent offered no identities",
                    )
                }))
            }
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("encrypted", &passphrase.is_some())
                .finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Tries each method in order until the session is authenticated.
pub fn authenticate(
    session: &Session,
    user: &str,
    host: &str,
    methods: &[AuthMethod],
) -> Result<()> {
    let mut attempted = Vec::with_capacity(methods.len());
    for method in methods {
        attempted.push(method.kind().to_string());
        match method.attempt(session, user) {
            Ok(()) if session.authenticated() => {
                debug!(user, host, method = method.kind(), "Authenticated");
                return Ok(());
            }
            Ok(()) => debug!(user, host, method = method.kind(), "Partial authentication"),
            Err(e) => debug!(user, host, method = method.kind(), error = %e, "Authentication rejected"),
        }
    }
    Err(ScanError::AuthenticationExhausted {
        user: user.to_string(),
        host: host.to_string(),
        attempted,
    })
}
