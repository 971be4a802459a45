//! Relays programs through an SSH jump host.
//!
//! Executes `ssh -o BatchMode=yes -o ConnectTimeout=N <target> -- <bin> <args...>`.
//! Everything after `--` reaches the remote process as raw argv, so the
//! remote shell never reinterprets scan targets or flags.
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{local::execute, Runner};
use crate::error::ScanError;

/// Exit status ssh uses for its own failures (connect, auth, host keys).
const SSH_FAILURE_STATUS: i32 = 255;

/// Runs programs on a relay host over SSH.
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    target: String,
    connect_timeout: Duration,
    ssh: String,
}

impl RemoteRunner {
    /// `target` is `user@host`, or just `host` when the SSH config knows the user.
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            target: target.into(),
            connect_timeout,
            ssh: "ssh".to_owned(),
        }
    }

    /// Uses a different ssh client binary.
    pub fn with_ssh_program(mut self, ssh: impl Into<String>) -> Self {
        self.ssh = ssh.into();
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Builds the full ssh argv that runs `program args...` on the relay.
    pub fn ssh_args(&self, program: &str, args: &[String]) -> Vec<String> {
        let secs = self.connect_timeout.as_secs().max(1);
        let mut ssh_args = vec![
            "-o".to_owned(),
            "BatchMode=yes".to_owned(),
            "-o".to_owned(),
            format!("ConnectTimeout={secs}"),
            self.target.clone(),
            "--".to_owned(),
            program.to_owned(),
        ];
        ssh_args.extend(args.iter().cloned());
        ssh_args
    }

    fn transport(&self, detail: impl Into<String>) -> ScanError {
        ScanError::Transport {
            target: self.target.clone(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl Runner for RemoteRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        deadline: Instant,
    ) -> Result<Vec<u8>, ScanError> {
        let ssh_args = self.ssh_args(program, args);
        let output = match execute(&self.ssh, &ssh_args, deadline).await {
            Ok(output) => output,
            Err(ScanError::Spawn { source, .. }) => {
                return Err(self.transport(format!("could not start {}: {source}", self.ssh)))
            }
            Err(e) => return Err(e),
        };

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if output.status.code() == Some(SSH_FAILURE_STATUS) {
            return Err(self.transport(stderr));
        }
        Err(ScanError::ExitStatus {
            program: program.to_owned(),
            status: output.status,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RemoteRunner, Runner};
    use crate::error::ScanError;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Writes an executable stand-in for ssh that prints `stderr` and exits
    /// with `code`.
    fn fake_ssh(dir: &Path, stderr: &str, code: i32) -> String {
        let path = dir.join("ssh");
        fs::write(&path, format!("#!/bin/sh\necho '{stderr}' >&2\nexit {code}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn wraps_program_after_separator() {
        let runner = RemoteRunner::new("emre@203.0.113.10", Duration::from_secs(10));
        let args = vec!["-sn".to_owned(), "-oG".to_owned(), "-".to_owned()];

        assert_eq!(
            runner.ssh_args("nmap", &args),
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "emre@203.0.113.10",
                "--",
                "nmap",
                "-sn",
                "-oG",
                "-",
            ]
        );
    }

    #[test]
    fn shell_metacharacters_stay_single_arguments() {
        let runner = RemoteRunner::new("jump", Duration::from_secs(3));
        let args = vec!["10.0.0.1; rm -rf /".to_owned()];
        let ssh_args = runner.ssh_args("nmap", &args);

        assert_eq!(ssh_args.last().unwrap(), "10.0.0.1; rm -rf /");
        assert_eq!(ssh_args[3], "ConnectTimeout=3");
    }

    #[test]
    fn connect_timeout_never_rounds_to_zero() {
        let runner = RemoteRunner::new("jump", Duration::from_millis(200));
        assert_eq!(runner.ssh_args("nmap", &[])[3], "ConnectTimeout=1");
    }

    #[tokio::test]
    async fn missing_ssh_client_is_a_transport_failure() {
        let runner = RemoteRunner::new("emre@jump", Duration::from_secs(1))
            .with_ssh_program("ndscan-definitely-missing-ssh");
        let err = runner
            .run("nmap", &[], Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();

        match &err {
            ScanError::Transport { target, .. } => assert_eq!(target, "emre@jump"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn ssh_own_failure_is_a_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RemoteRunner::new("emre@jump", Duration::from_secs(1))
            .with_ssh_program(fake_ssh(dir.path(), "Permission denied (publickey).", 255));

        let err = runner
            .run("nmap", &["-sn".to_owned()], Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();

        match &err {
            ScanError::Transport { target, detail } => {
                assert_eq!(target, "emre@jump");
                assert_eq!(detail, "Permission denied (publickey).");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn remote_program_failure_keeps_its_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RemoteRunner::new("emre@jump", Duration::from_secs(1))
            .with_ssh_program(fake_ssh(dir.path(), "Failed to resolve 10.0.0.300", 1));

        let err = runner
            .run("nmap", &["-sn".to_owned()], Instant::now() + Duration::from_secs(5))
            .await
            .unwrap_err();

        match &err {
            ScanError::ExitStatus {
                program,
                status,
                stderr,
            } => {
                assert_eq!(program, "nmap");
                assert_eq!(status.code(), Some(1));
                assert_eq!(stderr, "Failed to resolve 10.0.0.300");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err.is_fatal());
    }
}
