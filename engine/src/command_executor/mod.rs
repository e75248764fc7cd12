use crate::config::ExecutionSettings;
use sdk::types::CommandResult;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Replaces stdout that looks like binary data.
pub const BINARY_PLACEHOLDER: &str = "(binary output omitted)";

/// Appended to a stream cut at the output limit.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// How long to keep draining pipes after the process is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// CommandExecutor runs one shell instruction and returns a bounded,
/// classified [`CommandResult`].
///
/// # Behavior
/// - Runs through the platform shell in a fixed working directory
/// - stdin set to null, stdout/stderr piped and read concurrently
/// - The child gets its own process group; on timeout the whole group is killed
/// - Binary stdout is replaced with [`BINARY_PLACEHOLDER`]
/// - Each stream is trimmed and cut to `max_output_length` characters
///
/// Failures never surface as `Err`: spawn errors, non-zero exits and timeouts
/// are all encoded in the result's `exit_code` and `stderr`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    working_dir: PathBuf,
}

enum Outcome {
    Exited(ExitStatus),
    WaitFailed(String),
    TimedOut,
}

impl CommandExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub async fn execute(&self, command: &str, settings: &ExecutionSettings) -> CommandResult {
        debug!(command = %command, cwd = %self.working_dir.display(), "Executing command");

        let mut cmd = shell_command(command);
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to spawn command");
                return CommandResult::failure(command, e.to_string());
            }
        };

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_into(stdout, stdout_buf.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_into(stderr, stderr_buf.clone())));
        }

        let outcome = match tokio::time::timeout(settings.command_timeout(), child.wait()).await {
            Ok(Ok(status)) => Outcome::Exited(status),
            Ok(Err(e)) => Outcome::WaitFailed(e.to_string()),
            Err(_) => {
                warn!(
                    command = %command,
                    timeout_ms = settings.command_timeout_ms,
                    "Command timed out, killing process group"
                );
                kill_tree(&mut child).await;
                Outcome::TimedOut
            }
        };

        // Background children may hold the pipes open; don't wait on them forever
        let _ = tokio::time::timeout(READER_GRACE, async {
            for reader in readers.iter_mut() {
                let _ = reader.await;
            }
        })
        .await;
        for reader in &readers {
            reader.abort();
        }

        let stdout = stdout_buf.lock().await.clone();
        let stderr = stderr_buf.lock().await.clone();

        classify(command, &stdout, &stderr, outcome, settings)
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("/bin/bash");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

async fn read_into<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!(pid, error = %e, "killpg failed, falling back to kill");
            }
        }
    }

    let _ = child.kill().await;
}

fn classify(
    command: &str,
    stdout: &[u8],
    stderr: &[u8],
    outcome: Outcome,
    settings: &ExecutionSettings,
) -> CommandResult {
    let limit = settings.max_output_length;
    let mut stderr = truncate_output(String::from_utf8_lossy(stderr).trim(), limit);

    // Binary stdout short-circuits with exit code 0 whatever the process outcome
    if is_binary(stdout) {
        return CommandResult {
            command: command.to_string(),
            stdout: BINARY_PLACEHOLDER.to_string(),
            stderr,
            exit_code: 0,
        };
    }
    let stdout = truncate_output(String::from_utf8_lossy(stdout).trim(), limit);

    let (exit_code, failure) = match outcome {
        Outcome::Exited(status) if status.success() => (0, None),
        Outcome::Exited(status) => match status.code() {
            Some(code) => (code, Some(format!("Command exited with code {}", code))),
            None => (1, Some("Command terminated by signal".to_string())),
        },
        Outcome::WaitFailed(message) => (1, Some(message)),
        Outcome::TimedOut => (
            1,
            Some(format!(
                "Command timed out after {}ms",
                settings.command_timeout_ms
            )),
        ),
    };

    if let Some(message) = failure {
        if stderr.is_empty() {
            stderr = message;
        }
    }

    CommandResult {
        command: command.to_string(),
        stdout,
        stderr,
        exit_code,
    }
}

/// True if `bytes` contains a control byte in 0x00-0x08 or 0x0E-0x1F.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .any(|&b| b <= 0x08 || (0x0E..=0x1F).contains(&b))
}

/// Cut `text` to `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(timeout_ms: u64, max_output_length: usize) -> ExecutionSettings {
        ExecutionSettings {
            max_iterations: 10,
            command_timeout_ms: timeout_ms,
            max_output_length,
        }
    }

    #[test]
    fn test_binary_detection_ranges() {
        assert!(is_binary(&[b'a', 0x01]));
        assert!(is_binary(&[0x00]));
        assert!(is_binary(&[0x1B]));
        assert!(!is_binary(b"line one\n\tline two\r\n"));
        assert!(!is_binary("héllo".as_bytes()));
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_output("héllo", 5), "héllo");
        assert_eq!(truncate_output("héllo", 2), format!("hé{}", TRUNCATION_MARKER));
        assert_eq!(truncate_output("", 0), "");
    }

    #[test]
    fn test_binary_output_forces_zero_exit() {
        let result = classify(
            "cat blob",
            &[0x01, 0x02],
            b"",
            Outcome::WaitFailed("wait failed".to_string()),
            &settings(1000, 100),
        );
        assert_eq!(result.stdout, BINARY_PLACEHOLDER);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stderr, "");
    }

    #[test]
    fn test_timeout_message_only_when_stderr_empty() {
        let result = classify("sleep 5", b"", b"partial", Outcome::TimedOut, &settings(50, 100));
        assert_eq!(result.stderr, "partial");

        let result = classify("sleep 5", b"", b"", Outcome::TimedOut, &settings(50, 100));
        assert_eq!(result.stderr, "Command timed out after 50ms");
        assert_eq!(result.exit_code, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_echo_succeeds_and_trims() {
        let executor = CommandExecutor::new(std::env::temp_dir());
        let result = executor.execute("echo '  hello  '", &settings(5000, 100)).await;

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.stderr, "");
        assert_eq!(result.command, "echo '  hello  '");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let executor = CommandExecutor::new(&canonical);

        let result = executor.execute("pwd -P", &settings(5000, 1000)).await;
        assert_eq!(result.stdout, canonical.display().to_string());
    }
}
