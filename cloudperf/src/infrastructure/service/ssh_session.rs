use std::{process::Stdio, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use domain_benchmark::{
    model::vo::CommandOutput,
    service::{RemoteSession, SessionConnector},
};
use tokio::{io::AsyncWriteExt, process::Command};

/// ssh exits with this status when the connection itself failed.
const SSH_FAILURE: i32 = 255;
/// Prefix of the line the remote shell appends to stderr with the command's
/// own exit status.
const EXIT_MARKER: &str = "__cloudperf_exit=";

/// Opens [`SshSession`]s with the `ssh` client.
#[derive(Clone, Debug, typed_builder::TypedBuilder)]
pub struct SshConnector {
    #[builder(setter(into))]
    user: String,
    #[builder(default)]
    key_file: Option<String>,
    #[builder(default = 22)]
    port: u16,
    #[builder(default = Duration::from_secs(10))]
    connect_timeout: Duration,
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self, address: &str) -> anyhow::Result<Arc<dyn RemoteSession>> {
        let session = SshSession {
            port: self.port.to_string(),
            username_host: format!("{}@{address}", self.user),
            key_file: self.key_file.clone(),
            connect_timeout: self.connect_timeout,
        };
        let check = session.exec("true", self.connect_timeout * 3).await?;
        if !check.success() {
            anyhow::bail!("{address} isn't ready: {}", check.stderr.trim());
        }
        Ok(Arc::new(session))
    }
}

/// One host reached over ssh. Every command is its own ssh invocation, so a
/// session has no connection to lose between commands.
#[derive(Debug)]
pub struct SshSession {
    port: String,
    username_host: String,
    key_file: Option<String>,
    connect_timeout: Duration,
}

/// Quote `s` for a POSIX shell.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Run `cmd` in a subshell and report its status on stderr, so a command
/// exiting 255 can't be mistaken for ssh failing.
fn with_exit_marker(cmd: &str) -> String {
    format!("( {cmd}\n)\nprintf '\\n{EXIT_MARKER}%d\\n' $? >&2")
}

/// Split the status line written by [`with_exit_marker`] off `stderr`.
fn take_exit_status(stderr: &str) -> Option<(i32, String)> {
    let at = stderr.rfind(EXIT_MARKER)?;
    let status = stderr[at + EXIT_MARKER.len()..].trim_end().parse().ok()?;
    let rest = &stderr[..at];
    Some((status, rest.strip_suffix('\n').unwrap_or(rest).to_string()))
}

impl SshSession {
    fn command(&self, cmd: &str) -> Command {
        let mut command = Command::new("ssh");
        command.args([
            "-p",
            self.port.as_str(),
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "LogLevel=ERROR",
            "-o",
        ]);
        command.arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()));
        if let Some(key_file) = &self.key_file {
            command.args(["-i", key_file.as_str()]);
        }
        command
            .arg(&self.username_host)
            .arg(with_exit_marker(cmd))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn collect(&self, output: std::process::Output) -> anyhow::Result<CommandOutput> {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let (exit_status, stderr) = match take_exit_status(&stderr) {
            Some((status, stderr)) => (Some(status), stderr),
            // The remote shell never finished, so a 255 came from ssh itself.
            None if output.status.code() == Some(SSH_FAILURE) => {
                anyhow::bail!("ssh to {} failed: {}", self.username_host, stderr.trim())
            }
            None => (output.status.code(), stderr.into_owned()),
        };
        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            timed_out: false,
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&self, command: &str, timeout: Duration) -> anyhow::Result<CommandOutput> {
        tracing::debug!("Executing `{command}` on {}", self.username_host);
        let mut ssh = self.command(command);
        ssh.stdin(Stdio::null());
        match tokio::time::timeout(timeout, ssh.output()).await {
            Ok(output) => self.collect(output.context("Couldn't run ssh")?),
            Err(_) => {
                tracing::warn!(
                    "`{command}` on {} timed out after {}s",
                    self.username_host,
                    timeout.as_secs()
                );
                Ok(CommandOutput::timeout())
            }
        }
    }

    async fn write_file(&self, path: &str, contents: &str, mode: u32) -> anyhow::Result<()> {
        let path = quote(path);
        let mut ssh = self.command(&format!("cat > {path} && chmod {mode:o} {path}"));
        ssh.stdin(Stdio::piped());
        let mut child = ssh.spawn().context("Couldn't run ssh")?;
        let mut stdin = child.stdin.take().context("ssh has no stdin")?;
        let upload = async {
            stdin.write_all(contents.as_bytes()).await?;
            stdin.shutdown().await?;
            drop(stdin);
            child.wait_with_output().await
        };
        let output = tokio::time::timeout(self.connect_timeout * 6, upload)
            .await
            .with_context(|| format!("Writing {path} to {} timed out", self.username_host))?
            .with_context(|| format!("Couldn't write {path} to {}", self.username_host))?;
        let output = self.collect(output)?;
        if !output.success() {
            anyhow::bail!("Writing {path} failed: {}", output.stderr.trim());
        }
        Ok(())
    }
}
