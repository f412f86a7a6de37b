//! entroscan - find packed or encrypted executables by Shannon entropy.

use anyhow::{bail, Context};
use clap::{ArgAction, ArgGroup, Args, Parser};
use entroscan::config::{OutputConfig, RemoteConfig, ScanConfig, ScheduleMode, DEFAULT_DELIMITER};
use entroscan::config::{DEFAULT_SSH_PORT, DEFAULT_SSH_VERSION, DEFAULT_THRESHOLD};
use entroscan::hashing::DigestSet;
use entroscan::logging;
use entroscan::output;
use entroscan::remote::{Credentials, RemoteHost};
use entroscan::results::{InterimPrinter, ResultSink};
use entroscan::scan::{self, ScanInput};
use entroscan::timeout::DEFAULT_TIMEOUT_SECONDS;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, warn};

/// Entropy scanner for packed or encrypted executables
#[derive(Parser, Debug)]
#[command(name = "entroscan")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["file", "dir", "proc", "ssh_host", "ssh_prompt"])
))]
struct Cli {
    /// Full path to a single file to analyze
    #[arg(long)]
    file: Option<PathBuf>,

    /// Directory to analyze recursively
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Check running processes (requires root)
    #[arg(long)]
    proc: bool,

    /// Report targets with entropy greater than or equal to this (0.0 - 8.0)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    entropy: f64,

    /// Only check ELF executables
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    elf: bool,

    /// Leave this process out of process scans
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    ignore_self: bool,

    /// Use a worker pool for concurrent target processing
    #[arg(long)]
    fast: bool,

    /// Worker count for --fast (defaults to available parallelism)
    #[arg(long, requires = "fast")]
    workers: Option<usize>,

    #[command(flatten)]
    digests: DigestOpts,

    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    ssh: SshOpts,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,
}

#[derive(Args, Debug)]
struct DigestOpts {
    /// Calculate and show MD5 checksums
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    md5: bool,

    /// Calculate and show SHA1 checksums
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    sha1: bool,

    /// Calculate and show SHA256 checksums
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    sha256: bool,

    /// Calculate and show SHA512 checksums
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    sha512: bool,
}

impl DigestOpts {
    fn set(&self) -> DigestSet {
        let mut set = DigestSet::empty();
        set.set(DigestSet::MD5, self.md5);
        set.set(DigestSet::SHA1, self.sha1);
        set.set(DigestSet::SHA256, self.sha256);
        set.set(DigestSet::SHA512, self.sha512);
        set
    }
}

#[derive(Args, Debug)]
struct OutputOpts {
    /// Output results as CSV (filename, path, entropy, elf_file, md5, sha1, sha256, sha512)
    #[arg(long, conflicts_with = "json")]
    csv: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Delimiter for CSV output
    #[arg(long, default_value = DEFAULT_DELIMITER)]
    delim: String,

    /// Write results to this file instead of stdout (CSV and JSON only)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print interim results to stdout even when a report format is selected
    #[arg(long)]
    print: bool,
}

#[derive(Args, Debug)]
struct SshOpts {
    /// Remote host whose processes are scanned over SSH
    #[arg(long)]
    ssh_host: Option<String>,

    /// Remote user name
    #[arg(long)]
    ssh_user: Option<String>,

    /// Remote password
    #[arg(long, env = "ENTROSCAN_SSH_PASS", hide_env_values = true)]
    ssh_pass: Option<String>,

    /// Private key file
    #[arg(long)]
    ssh_key: Option<PathBuf>,

    /// Private key passphrase
    #[arg(long, requires = "ssh_key", env = "ENTROSCAN_SSH_KEY_PASS", hide_env_values = true)]
    ssh_key_pass: Option<String>,

    /// Authenticate with the running SSH agent
    #[arg(long)]
    ssh_agent: bool,

    /// Remote SSH port
    #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
    ssh_port: u16,

    /// Connect and command timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    ssh_timeout: u64,

    /// Client identification string sent to the server
    #[arg(long, default_value = DEFAULT_SSH_VERSION)]
    ssh_version: String,

    /// Prompt for a missing host, user, password or key passphrase
    #[arg(long)]
    ssh_prompt: bool,
}

impl SshOpts {
    fn is_remote(&self) -> bool {
        self.ssh_host.is_some() || self.ssh_user.is_some() || self.ssh_prompt
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            host: self.ssh_host.clone(),
            user: self.ssh_user.clone(),
            key_file: self.ssh_key.clone(),
            key_passphrase: self.ssh_key_pass.clone(),
            password: self.ssh_pass.clone(),
            agent: self.ssh_agent,
        }
    }

    /// Settings for the remote scan, asking on the terminal when
    /// `--ssh-prompt` is given.
    fn remote_config(&self) -> anyhow::Result<Option<RemoteConfig>> {
        if !self.is_remote() {
            return Ok(None);
        }
        let mut credentials = self.credentials();
        if self.ssh_prompt {
            credentials.prompt_missing(
                &mut std::io::stdin().lock(),
                &mut std::io::stderr(),
                &mut |prompt: &str| rpassword::prompt_password(prompt),
            )?;
        }
        let template = RemoteConfig {
            port: self.ssh_port,
            version: self.ssh_version.clone(),
            timeout: Duration::from_secs(self.ssh_timeout),
            ..RemoteConfig::default()
        };
        Ok(Some(credentials.remote_config(template)))
    }
}

impl Cli {
    fn input(&self) -> ScanInput {
        match (&self.file, &self.dir) {
            _ if self.ssh.is_remote() => ScanInput::RemoteProcesses,
            _ if self.proc => ScanInput::LocalProcesses,
            (Some(file), _) => ScanInput::File(file.clone()),
            (_, Some(dir)) => ScanInput::Directory(dir.clone()),
            (None, None) => ScanInput::LocalProcesses,
        }
    }

    fn scan_config(&self, remote: Option<RemoteConfig>) -> ScanConfig {
        let mode = match (self.fast, self.workers) {
            (false, _) => ScheduleMode::Synchronous,
            (true, Some(workers)) => ScheduleMode::Parallel { workers },
            (true, None) => ScheduleMode::parallel(),
        };
        ScanConfig {
            threshold: self.entropy,
            elf_only: self.elf,
            digests: self.digests.set(),
            mode,
            ignore_self: self.ignore_self,
            remote,
            ..ScanConfig::default()
        }
    }

    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            csv: self.output.csv,
            json: self.output.json,
            delimiter: self.output.delim.clone(),
            output_file: self.output.output.clone(),
            print_interim: self.output.print,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = logging::level_for_verbosity(cli.verbose);
    if cli.log_json {
        logging::init_tracing_json(level);
    } else {
        logging::init_tracing_with(level);
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Scan failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = cli.scan_config(cli.ssh.remote_config()?);
    let output_config = cli.output_config();
    let input = cli.input();

    config.validate().context("invalid scan configuration")?;
    output_config
        .validate()
        .context("invalid output configuration")?;
    if output_config.output_file.is_some() && output_config.report_format()?.is_none() {
        bail!("--output needs --csv or --json");
    }

    let interim = output_config
        .prints_interim()
        .then(|| InterimPrinter::stdout(config.digests));
    let sink = ResultSink::with_interim(interim);

    let stats = match &config.remote {
        Some(remote_config) => {
            let host = RemoteHost::connect(remote_config)
                .with_context(|| format!("error connecting to SSH host ({})", remote_config.host))?;
            let scanned = scan::run(&config, &input, &sink, Some(&host));
            if let Err(e) = host.close() {
                warn!(remote = %host, error = %e, "Couldn't close remote host cleanly");
            }
            scanned?
        }
        None => scan::run(&config, &input, &sink, None)?,
    };

    output::emit(&sink.into_results(), &output_config).context("couldn't write results")?;
    tracing::debug!(reported = stats.reported, "Done");
    Ok(())
}
