//! Runs programs as child processes of this one.
use std::process::{Output, Stdio};

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use tokio::time::{self, Instant};

use super::Runner;
use crate::error::ScanError;

/// Runs programs on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRunner;

#[async_trait]
impl Runner for LocalRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        deadline: Instant,
    ) -> Result<Vec<u8>, ScanError> {
        let output = execute(program, args, deadline).await?;
        if !output.status.success() {
            return Err(ScanError::ExitStatus {
                program: program.to_owned(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }

    fn preflight(&self, program: &str) -> Result<(), ScanError> {
        which::which(program)
            .map(|path| debug!("Using {} at {}", program, path.display()))
            .map_err(|_| ScanError::ToolUnavailable {
                tool: program.to_owned(),
            })
    }
}

/// Spawns `program` and waits for it, up to `deadline`.
///
/// The child is spawned with `kill_on_drop`, so giving up on the wait
/// (deadline, or the caller dropping this future) also kills the process.
pub(super) async fn execute(
    program: &str,
    args: &[String],
    deadline: Instant,
) -> Result<Output, ScanError> {
    debug!("Running {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ScanError::Spawn {
            program: program.to_owned(),
            source,
        })?;

    match time::timeout_at(deadline, child.wait_with_output()).await {
        Ok(output) => output.map_err(|source| ScanError::Spawn {
            program: program.to_owned(),
            source,
        }),
        Err(_) => {
            debug!("Deadline reached, killed {}", program);
            Err(ScanError::DeadlineExceeded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalRunner, Runner};
    use crate::error::ScanError;
    use std::time::Duration;
    use tokio::time::Instant;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = LocalRunner
            .run("echo", &args(&["Host:", "10.0.0.1"]), far_deadline())
            .await
            .unwrap();
        assert_eq!(out, b"Host: 10.0.0.1\n");
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let err = LocalRunner
            .run("sh", &args(&["-c", "echo oops >&2; exit 3"]), far_deadline())
            .await
            .unwrap_err();
        match err {
            ScanError::ExitStatus {
                program,
                status,
                stderr,
            } => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let err = LocalRunner
            .run("ndscan-definitely-missing-tool", &[], far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Spawn { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn deadline_kills_the_process() {
        let started = Instant::now();
        let err = LocalRunner
            .run(
                "sleep",
                &args(&["10"]),
                Instant::now() + Duration::from_millis(200),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn preflight_finds_tools_on_path() {
        assert!(LocalRunner.preflight("sh").is_ok());
        let err = LocalRunner
            .preflight("ndscan-definitely-missing-tool")
            .unwrap_err();
        assert!(matches!(err, ScanError::ToolUnavailable { .. }));
        assert_eq!(
            err.to_string(),
            "ndscan-definitely-missing-tool not found in PATH"
        );
    }
}
