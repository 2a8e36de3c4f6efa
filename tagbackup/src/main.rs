//! Back up and restore tag values.
//!
//! `tagbackup backup` reads every tag under the configured root node and
//! writes them to a delimited record file; `tagbackup restore` reads such a
//! file and writes the values back in a single batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tagbackup::error::Error;
use tagbackup::exit_codes;
use tagbackup::io::bridge::CommandTagClient;
use tagbackup::io::config::{
    DEFAULT_CONFIG_FILE, ToolConfig, TransferOptions, TransferOverrides, TransportConfig,
    load_config, write_config,
};
use tagbackup::io::remote::TagClient;
use tagbackup::io::tag_store::{JsonTagStore, TagTree, write_tree};
use tagbackup::job::{TransferLogic, TransferReport};
use tagbackup::logging;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "tagbackup",
    version,
    about = "Back up and restore tag values to a delimited file"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter config and, for the file transport, a sample tag tree.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Write every tag under the root node to the record file.
    Backup(TransferArgs),
    /// Write the values in the record file back to the tags.
    Restore(TransferArgs),
}

/// Values that take precedence over `[transfer]` in the config file.
#[derive(Args, Debug, Default)]
struct TransferArgs {
    #[arg(long)]
    root: Option<String>,
    #[arg(long)]
    csv_path: Option<PathBuf>,
    /// Single field delimiter character.
    #[arg(long)]
    delimiter: Option<String>,
    /// Enclose every field in quotes (`true` or `false`).
    #[arg(long)]
    wrap_fields: Option<bool>,
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Log and skip malformed lines instead of failing.
    #[arg(long)]
    ignore_malformed_lines: bool,
}

impl TransferArgs {
    fn overrides(&self) -> TransferOverrides {
        TransferOverrides {
            root: self.root.clone(),
            csv_path: self.csv_path.clone(),
            delimiter: self.delimiter.clone(),
            wrap_fields: self.wrap_fields,
            timeout_ms: self.timeout_ms,
            ignore_malformed_lines: self.ignore_malformed_lines.then_some(true),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Backup,
    Restore,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(err) if err.is_configuration() => exit_codes::INVALID_CONFIG,
        _ => exit_codes::FAILED,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Backup(args) => cmd_transfer(&cli.config, &args, Direction::Backup),
        Command::Restore(args) => cmd_transfer(&cli.config, &args, Direction::Restore),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists, use --force to overwrite",
            config_path.display()
        );
    }
    let cfg = ToolConfig::starter();
    write_config(config_path, &cfg)?;
    info!(path = %config_path.display(), "config written");

    if let TransportConfig::File { tree_path } = &cfg.transport
        && (force || !tree_path.exists())
    {
        write_tree(tree_path, &sample_tree()?)?;
        info!(path = %tree_path.display(), "sample tag tree written");
    }
    Ok(())
}

fn sample_tree() -> Result<TagTree> {
    let tree: TagTree = serde_json::from_value(json!({
        "roots": {
            "Plant": [
                {"path": "Tank.Level", "type": "Float64", "value": 3.5},
                {"path": "Line.Setpoints", "type": "Int32", "value": [1, 2, 3]},
                {"path": "Pump.On", "type": "Bool", "value": true},
                {"path": "Batch.Started", "type": "Timestamp", "value": "2024-03-01T12:30:45Z"}
            ]
        }
    }))
    .context("build sample tag tree")?;
    Ok(tree)
}

fn cmd_transfer(config_path: &Path, args: &TransferArgs, direction: Direction) -> Result<()> {
    let mut cfg = load_config(config_path)
        .map_err(|err| Error::config("config", format!("{err:#}")))?;
    cfg.apply_overrides(&args.overrides());
    let options = cfg.transfer.resolve()?;
    cfg.transport.validate()?;

    match &cfg.transport {
        TransportConfig::File { tree_path } => {
            let store = JsonTagStore::open(tree_path)?;
            transfer(Arc::new(store), options, direction)
        }
        TransportConfig::Command {
            command,
            output_limit_bytes,
        } => {
            let client = CommandTagClient::new(command.clone(), *output_limit_bytes);
            transfer(Arc::new(client), options, direction)
        }
    }
}

fn transfer<C>(
    client: Arc<C>,
    options: TransferOptions,
    direction: Direction,
) -> Result<()>
where
    C: TagClient + Send + Sync + 'static,
{
    let mut logic = TransferLogic::new(client, options);
    match direction {
        Direction::Backup => logic.start_backup()?,
        Direction::Restore => logic.start_restore()?,
    }
    let report = logic.wait()?.context("transfer job was not started")?;
    let csv_path = logic.options().csv_path.display();
    match report {
        TransferReport::Backup(summary) => println!(
            "backed up {} tags to {} ({} skipped, {} excluded)",
            summary.written, csv_path, summary.skipped, summary.excluded
        ),
        TransferReport::Restore(summary) => println!(
            "restored {} of {} entries from {} ({} unresolved, {} malformed, {} empty)",
            summary.restored,
            summary.total(),
            csv_path,
            summary.skipped_unresolved,
            summary.skipped_malformed,
            summary.skipped_empty
        ),
    }
    Ok(())
}
