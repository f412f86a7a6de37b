//! Interactive completion of SSH connection settings.
//!
//! Whatever the command line left out is asked for in a fixed order: host,
//! user, then the key passphrase (when a key file is given) or the password.
//! Secrets are read through a caller-supplied function so the terminal never
//! echoes them.

use crate::config::RemoteConfig;
use crate::error::{Result, ScanError};
use crate::remote::auth::AuthMethod;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::debug;

/// Reads one secret after showing the given prompt, without echo.
pub type SecretReader<'a> = dyn FnMut(&str) -> io::Result<String> + 'a;

/// SSH settings as given on the command line, possibly incomplete.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub host: Option<String>,
    pub user: Option<String>,
    pub key_file: Option<PathBuf>,
    pub key_passphrase: Option<String>,
    pub password: Option<String>,
    pub agent: bool,
}

impl Credentials {
    /// Asks for every missing setting.
    ///
    /// Host and user are asked again until an answer is given; running out
    /// of input is an error. A key passphrase or password is asked once.
    pub fn prompt_missing(
        &mut self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
        secret: &mut SecretReader<'_>,
    ) -> Result<()> {
        let host = match self.host.clone().filter(|h| !h.is_empty()) {
            Some(host) => host,
            None => ask_line(input, out, "Host: ", "host")?,
        };
        self.host = Some(host.clone());

        if self.user.as_deref().map_or(true, str::is_empty) {
            self.user = Some(ask_line(input, out, &format!("[{host}] User: "), "user")?);
        }

        match &self.key_file {
            Some(key) if self.key_passphrase.is_none() => {
                let prompt = format!("[{}] Pass: ", key.display());
                let pass = ask_secret(secret, &prompt, "key passphrase")?;
                self.key_passphrase = Some(pass).filter(|p| !p.is_empty());
            }
            None if self.password.is_none() && !self.agent => {
                let pass = ask_secret(secret, &format!("[{host}] Pass: "), "password")?;
                self.password = Some(pass);
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies host, user and credentials to `template`.
    ///
    /// Authentication is tried in the order agent, key file, password.
    pub fn remote_config(&self, template: RemoteConfig) -> RemoteConfig {
        let mut config = RemoteConfig {
            host: self.host.clone().unwrap_or_default(),
            user: self.user.clone().unwrap_or_default(),
            auth: Vec::new(),
            ..template
        };
        if self.agent {
            config = config.with_auth(AuthMethod::Agent);
        }
        if let Some(path) = &self.key_file {
            config = config.with_auth(AuthMethod::KeyFile {
                path: path.clone(),
                passphrase: self.key_passphrase.clone(),
            });
        }
        if let Some(password) = &self.password {
            config = config.with_auth(AuthMethod::Password(password.clone()));
        }
        config
    }
}

fn ask_line(
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    prompt: &str,
    what: &str,
) -> Result<String> {
    let failed = |e: io::Error| ScanError::InvalidConfig(format!("couldn't read {what}: {e}"));
    loop {
        out.write_all(prompt.as_bytes()).map_err(failed)?;
        out.flush().map_err(failed)?;

        let mut line = String::new();
        if input.read_line(&mut line).map_err(failed)? == 0 {
            return Err(ScanError::InvalidConfig(format!("no {what} given")));
        }
        let answer = line.trim();
        if !answer.is_empty() {
            debug!(what, "Read prompted value");
            return Ok(answer.to_string());
        }
    }
}

fn ask_secret(secret: &mut SecretReader<'_>, prompt: &str, what: &str) -> Result<String> {
    let value = secret(prompt)
        .map_err(|e| ScanError::InvalidConfig(format!("couldn't read {what}: {e}")))?;
    debug!(what, "Read prompted secret");
    Ok(value.trim_end_matches(['\r', '\n']).to_string())
}
