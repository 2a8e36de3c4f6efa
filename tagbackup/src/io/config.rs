//! Tool configuration stored in `tagbackup.toml`.
//!
//! The file is edited by hand. Transfer options are kept optional on disk so
//! that a missing required option is reported by name when a backup or
//! restore is resolved, before any file or remote I/O happens.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::record::RecordFormat;
use crate::error::{Error, Result};
use crate::io::bridge::DEFAULT_OUTPUT_LIMIT_BYTES;

pub const DEFAULT_CONFIG_FILE: &str = "tagbackup.toml";

/// Default remote call timeout written by `init`.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    pub transfer: TransferConfig,
    pub transport: TransportConfig,
}

/// `[transfer]`: what to back up or restore, and the file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// Name of the root node whose children are transferred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<PathBuf>,
    /// Exactly one character.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap_fields: Option<bool>,
    /// Bound on every remote call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_malformed_lines: Option<bool>,
}

/// `[transport]`: where tag values live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// JSON tag tree on local disk.
    File { tree_path: PathBuf },
    /// External bridge command speaking the JSON tag protocol.
    Command {
        command: Vec<String>,
        #[serde(default = "default_output_limit_bytes")]
        output_limit_bytes: usize,
    },
}

fn default_output_limit_bytes() -> usize {
    DEFAULT_OUTPUT_LIMIT_BYTES
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::File {
            tree_path: PathBuf::from("tags.json"),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            TransportConfig::File { tree_path } => {
                if tree_path.as_os_str().is_empty() {
                    return Err(Error::config("transport.tree_path", "must not be empty"));
                }
            }
            TransportConfig::Command {
                command,
                output_limit_bytes,
            } => {
                if command.first().is_none_or(|program| program.trim().is_empty()) {
                    return Err(Error::config(
                        "transport.command",
                        "must be a non-empty array",
                    ));
                }
                if *output_limit_bytes == 0 {
                    return Err(Error::config("transport.output_limit_bytes", "must be > 0"));
                }
            }
        }
        Ok(())
    }
}

/// Fully resolved options for one backup or restore run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub root: String,
    pub csv_path: PathBuf,
    pub format: RecordFormat,
    pub timeout: Duration,
    pub ignore_malformed_lines: bool,
}

impl TransferConfig {
    /// Check every option and build [`TransferOptions`].
    pub fn resolve(&self) -> Result<TransferOptions> {
        let root = required("root", self.root.as_ref())?;
        if root.trim().is_empty() {
            return Err(Error::config("root", "must not be empty"));
        }
        let csv_path = required("csv_path", self.csv_path.as_ref())?;
        if csv_path.as_os_str().is_empty() {
            return Err(Error::config("csv_path", "must not be empty"));
        }
        let delimiter = single_char("delimiter", required("delimiter", self.delimiter.as_ref())?)?;
        let wrap_fields = *required("wrap_fields", self.wrap_fields.as_ref())?;
        let timeout_ms = *required("timeout_ms", self.timeout_ms.as_ref())?;
        if timeout_ms == 0 {
            return Err(Error::config("timeout_ms", "must be > 0"));
        }
        let quote = match &self.quote {
            Some(quote) => single_char("quote", quote)?,
            None => RecordFormat::default().quote,
        };
        if quote == delimiter {
            return Err(Error::config(
                "delimiter",
                format!("{delimiter:?} is also the quote character"),
            ));
        }

        Ok(TransferOptions {
            root: root.clone(),
            csv_path: csv_path.clone(),
            format: RecordFormat::new(delimiter, wrap_fields).with_quote(quote),
            timeout: Duration::from_millis(timeout_ms),
            ignore_malformed_lines: self.ignore_malformed_lines.unwrap_or(false),
        })
    }
}

fn required<'a, T>(option: &'static str, value: Option<&'a T>) -> Result<&'a T> {
    value.ok_or_else(|| Error::config(option, "missing required option"))
}

fn single_char(option: &'static str, value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ ('\n' | '\r' | '\0')), None) => {
            Err(Error::config(option, format!("{c:?} cannot be used")))
        }
        (Some(c), None) => Ok(c),
        _ => Err(Error::config(
            option,
            format!("expected exactly one character, found {value:?}"),
        )),
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOverrides {
    pub root: Option<String>,
    pub csv_path: Option<PathBuf>,
    pub delimiter: Option<String>,
    pub wrap_fields: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub ignore_malformed_lines: Option<bool>,
}

impl ToolConfig {
    pub fn apply_overrides(&mut self, overrides: &TransferOverrides) {
        let transfer = &mut self.transfer;
        if let Some(root) = &overrides.root {
            transfer.root = Some(root.clone());
        }
        if let Some(csv_path) = &overrides.csv_path {
            transfer.csv_path = Some(csv_path.clone());
        }
        if let Some(delimiter) = &overrides.delimiter {
            transfer.delimiter = Some(delimiter.clone());
        }
        if let Some(wrap_fields) = overrides.wrap_fields {
            transfer.wrap_fields = Some(wrap_fields);
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            transfer.timeout_ms = Some(timeout_ms);
        }
        if let Some(ignore) = overrides.ignore_malformed_lines {
            transfer.ignore_malformed_lines = Some(ignore);
        }
    }

    /// Config written by `tagbackup init`.
    pub fn starter() -> Self {
        Self {
            transfer: TransferConfig {
                root: Some("Plant".to_string()),
                csv_path: Some(PathBuf::from("tag_values.csv")),
                delimiter: Some(",".to_string()),
                wrap_fields: Some(true),
                timeout_ms: Some(DEFAULT_TIMEOUT_MS),
                quote: None,
                ignore_malformed_lines: Some(false),
            },
            transport: TransportConfig::default(),
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ToolConfig::default()`, which leaves
/// every transfer option unset.
pub fn load_config(path: &Path) -> anyhow::Result<ToolConfig> {
    if !path.exists() {
        return Ok(ToolConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ToolConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ToolConfig) -> anyhow::Result<()> {
    cfg.transport
        .validate()
        .with_context(|| format!("refusing to write {}", path.display()))?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
