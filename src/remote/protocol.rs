//! The remote command protocol.
//!
//! Command strings are fixed; remote hosts only need a POSIX shell, bash,
//! coreutils and procfs.

/// Lists the PIDs whose `/proc/<pid>/exe` is readable by the remote user, as
/// space-separated numbers.
pub const LIST_PIDS_COMMAND: &str = r#"bash -c 'for proc in /proc/*/exe; do if test -r "$proc" > /dev/null; then echo -n "$proc" | grep -v self | tr -d "/exeproc" | tr "\n" " "; fi; done'"#;

/// Reports the remote login name once the connection is up.
pub const WHOAMI_COMMAND: &str = "whoami";

/// Upper bound on command output that isn't an executable image.
pub const MAX_TEXT_OUTPUT: u64 = 4 * 1024 * 1024;

/// `/proc/<pid>/exe`
pub fn proc_exe(pid: u32) -> String {
    format!("/proc/{pid}/exe")
}

/// `readlink -f /proc/<pid>/exe`
pub fn readlink_command(pid: u32) -> String {
    format!("readlink -f {}", proc_exe(pid))
}

/// `cat /proc/<pid>/exe`
pub fn cat_command(pid: u32) -> String {
    format!("cat {}", proc_exe(pid))
}

/// Numeric PIDs from the listing command's output; anything else is ignored.
pub fn parse_pid_list(output: &[u8]) -> Vec<u32> {
    String::from_utf8_lossy(output)
        .split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Canonical path from `readlink -f`, or the raw procfs path when the output
/// is empty.
pub fn resolved_path(output: &[u8], pid: u32) -> String {
    let trimmed = String::from_utf8_lossy(output).trim().to_string();
    if trimmed.is_empty() {
        proc_exe(pid)
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_exact() {
        assert_eq!(readlink_command(1234), "readlink -f /proc/1234/exe");
        assert_eq!(cat_command(1234), "cat /proc/1234/exe");
        assert!(LIST_PIDS_COMMAND.starts_with("bash -c 'for proc in /proc/*/exe;"));
        assert!(LIST_PIDS_COMMAND.contains(r#"tr -d "/exeproc""#));
    }

    #[test]
    fn pid_list_skips_non_numeric_tokens() {
        assert_eq!(parse_pid_list(b"1 22 333 "), vec![1, 22, 333]);
        assert_eq!(parse_pid_list(b"1 thread-self 42\n"), vec![1, 42]);
        assert!(parse_pid_list(b"").is_empty());
        assert!(parse_pid_list(b"-5 99999999999").is_empty());
    }

    #[test]
    fn resolved_path_falls_back_to_procfs() {
        assert_eq!(resolved_path(b"/usr/sbin/sshd\n", 7), "/usr/sbin/sshd");
        assert_eq!(resolved_path(b"  \n", 7), "/proc/7/exe");
    }
}
