//! [`TagClient`] backed by an external bridge command.
//!
//! The bridge is invoked once per call as `<command...> <action> <root>`:
//!
//! - `read`: prints a JSON array of tags.
//! - `browse`: prints a JSON array of relative paths.
//! - `write`: receives a JSON array of tags on stdin.
//!
//! A non-zero exit is a transport failure carrying stderr. A bridge still
//! running at the deadline is killed and reported as a timeout.

use std::collections::BTreeSet;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::core::types::TagEntry;
use crate::io::process::run_command_with_timeout;
use crate::io::remote::{RemoteError, RemoteTag, TagClient};
use crate::io::tag_json::JsonTag;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct CommandTagClient {
    command: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandTagClient {
    pub fn new(command: Vec<String>, output_limit_bytes: usize) -> Self {
        Self {
            command,
            output_limit_bytes,
        }
    }

    fn invoke(
        &self,
        action: &str,
        root: &str,
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Vec<u8>, RemoteError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| RemoteError::Transport("bridge command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(action).arg(root);

        let output = run_command_with_timeout(cmd, stdin, timeout, self.output_limit_bytes)
            .map_err(|err| RemoteError::Transport(format!("{err:#}")))?;
        if output.timed_out {
            return Err(RemoteError::Timeout(timeout));
        }
        if !output.status.success() {
            return Err(RemoteError::Transport(format!(
                "bridge {action} exited with {}: {}",
                output.status,
                output.stderr_text()
            )));
        }
        if output.stdout_truncated > 0 {
            return Err(RemoteError::Transport(format!(
                "bridge {action} output exceeded {} bytes",
                self.output_limit_bytes
            )));
        }
        debug!(action, bytes = output.stdout.len(), "bridge call finished");
        Ok(output.stdout)
    }
}

impl TagClient for CommandTagClient {
    #[instrument(skip_all, fields(root = %root))]
    fn read_children(&self, root: &str, timeout: Duration) -> Result<Vec<RemoteTag>, RemoteError> {
        let stdout = self.invoke("read", root, None, timeout)?;
        let tags: Vec<JsonTag> = serde_json::from_slice(&stdout)
            .map_err(|err| RemoteError::Transport(format!("parse bridge read output: {err}")))?;
        tags.iter()
            .map(|tag| {
                tag.to_remote()
                    .map_err(|err| RemoteError::Transport(err.to_string()))
            })
            .collect()
    }

    #[instrument(skip_all, fields(root = %root))]
    fn browse(&self, root: &str, timeout: Duration) -> Result<BTreeSet<String>, RemoteError> {
        let stdout = self.invoke("browse", root, None, timeout)?;
        serde_json::from_slice(&stdout)
            .map_err(|err| RemoteError::Transport(format!("parse bridge browse output: {err}")))
    }

    #[instrument(skip_all, fields(root = %root, count = values.len()))]
    fn write_children(
        &self,
        root: &str,
        values: &[TagEntry],
        timeout: Duration,
    ) -> Result<(), RemoteError> {
        let tags: Vec<JsonTag> = values.iter().map(JsonTag::from_entry).collect();
        let payload = serde_json::to_vec(&tags)
            .map_err(|err| RemoteError::Transport(format!("serialize bridge write: {err}")))?;
        self.invoke("write", root, Some(payload), timeout)?;
        Ok(())
    }
}
