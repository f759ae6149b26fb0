use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::ClassifierConfig;
use crate::received::SenderInfo;

/// Scores one raw message and returns the classifier's textual output.
pub trait Classifier: Send + Sync + 'static {
    fn classify<'a>(
        &'a self,
        message: &'a [u8],
        sender: Option<&'a SenderInfo>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send + 'a;
}

/// Runs `rspamc` (or a compatible program) with the message on stdin.
#[derive(Debug, Clone)]
pub struct Rspamc {
    program: String,
    args: Vec<String>,
}

impl Rspamc {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }

    /// Arguments for one invocation, with the sender hint appended.
    pub fn command_args(&self, sender: Option<&SenderInfo>) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(info) = sender {
            args.push(format!("--ip={}", info.ip));
            args.push(format!("--hostname={}", info.hostname));
        }
        args
    }
}

impl Classifier for Rspamc {
    fn classify<'a>(
        &'a self,
        message: &'a [u8],
        sender: Option<&'a SenderInfo>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send + 'a {
        async move {
            let args = self.command_args(sender);
            log::debug!("Running {} {}", self.program, args.join(" "));

            let mut child = Command::new(&self.program)
                .args(&args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("Failed to start {}", self.program))?;

            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("{} stdin is not available", self.program))?;

            let write = async move {
                let result = stdin.write_all(message).await;
                drop(stdin);
                result
            };
            let (written, output) = tokio::join!(write, child.wait_with_output());

            let output =
                output.with_context(|| format!("Failed to wait for {}", self.program))?;
            match written {
                Ok(()) => {}
                // The exit status decides whether an early exit was a failure.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to write message to {}", self.program))
                }
            }

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(anyhow!(
                    "{} failed with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ));
            }

            Ok(output.stdout)
        }
    }
}
