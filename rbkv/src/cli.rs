//! Command-line surface.
//!
//! `rbkv [--storage <path>] <command>` or `rbkv <path> <command>`. The flag
//! wins over the leading path, and both fall back to `RBKV_STORAGE`.

use std::io::Write;
use std::path::PathBuf;

use clap::{Arg, ArgMatches, Command, value_parser};

use crate::config::{ConfigError, StoreConfig};
use crate::storage::{Database, DatabaseError, InsertOutcome};

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    /// Configuration, setup, or any unclassified fatal error.
    pub const SETUP: i32 = 1;
    /// Malformed command line (matches clap's own usage exit code).
    pub const USAGE: i32 = 2;
    pub const STORAGE_INIT: i32 = 3;
    pub const STORAGE_PATH: i32 = 4;
    pub const STORAGE_LOCKED: i32 = 5;
}

fn keys_arg(help: &'static str) -> Arg {
    Arg::new("keys")
        .value_name("KEY")
        .num_args(1..)
        .required(true)
        .allow_negative_numbers(true)
        .value_parser(value_parser!(i32))
        .help(help)
}

/// Build the argument parser.
#[must_use]
pub fn command() -> Command {
    Command::new("rbkv")
        .about("single-file red-black tree key-value store")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("storage")
                .long("storage")
                .short('s')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Storage file (defaults to $RBKV_STORAGE)"),
        )
        .arg(
            Arg::new("storage_path")
                .value_name("STORAGE")
                .value_parser(value_parser!(PathBuf))
                .help("Storage file given before the command"),
        )
        .subcommand(Command::new("init").about("initialize storage"))
        .subcommand(
            Command::new("add").about("add value by specified key").arg(
                Arg::new("items")
                    .value_name("KEY VALUE")
                    .num_args(1..)
                    .required(true)
                    .allow_negative_numbers(true)
                    .value_parser(value_parser!(i32))
                    .help("Alternating keys and values"),
            ),
        )
        .subcommand(
            Command::new("get")
                .about("get values by specified key")
                .arg(keys_arg("Keys to look up")),
        )
        .subcommand(
            Command::new("del")
                .about("delete value by specified key")
                .arg(keys_arg("Keys to delete")),
        )
        .subcommand(
            Command::new("exist")
                .about("check if key in storage")
                .arg(keys_arg("Keys to test")),
        )
        .subcommand(Command::new("keys").about("get all keys"))
        .subcommand(Command::new("values").about("get all values"))
        .subcommand(Command::new("check").about("verify tree invariants"))
}

/// Errors surfaced by the command layer.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config(ConfigError),
    /// No `--storage`, leading path, or `RBKV_STORAGE` named a storage file.
    MissingStorage,
    /// No subcommand was given.
    MissingCommand,
    /// `add` received an odd number of items.
    UnpairedItems(usize),
    /// Storage operation failed.
    Database(DatabaseError),
    /// Writing command output failed.
    Output(std::io::Error),
}

impl CliError {
    /// Exit code reported for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::MissingStorage | Self::MissingCommand | Self::UnpairedItems(_) => {
                exit_code::USAGE
            }
            Self::Database(DatabaseError::Init(_)) => exit_code::STORAGE_INIT,
            Self::Database(DatabaseError::NotFound(_)) => exit_code::STORAGE_PATH,
            Self::Database(DatabaseError::Locked(_)) => exit_code::STORAGE_LOCKED,
            Self::Config(_) | Self::Database(_) | Self::Output(_) => exit_code::SETUP,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::MissingStorage => write!(
                f,
                "no storage given: pass a path, --storage, or set {}",
                StoreConfig::STORAGE_VAR
            ),
            Self::MissingCommand => write!(f, "no command given"),
            Self::UnpairedItems(count) => {
                write!(f, "add expects key/value pairs, got {count} items")
            }
            Self::Database(e) => write!(f, "{e}"),
            Self::Output(e) => write!(f, "cannot write output: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Database(e) => Some(e),
            Self::Output(e) => Some(e),
            Self::MissingStorage | Self::MissingCommand | Self::UnpairedItems(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<DatabaseError> for CliError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Output(e)
    }
}

fn int_values(matches: &ArgMatches, id: &str) -> Vec<i32> {
    matches
        .get_many::<i32>(id)
        .map(|values| values.copied().collect())
        .unwrap_or_default()
}

fn write_joined(out: &mut impl Write, values: &[i32]) -> std::io::Result<()> {
    let line = values
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(out, "{line}")
}

/// Execute a parsed command line, writing results to `out`.
pub fn run(
    matches: &ArgMatches,
    config: &StoreConfig,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let path = matches
        .get_one::<PathBuf>("storage")
        .or_else(|| matches.get_one::<PathBuf>("storage_path"))
        .cloned()
        .or_else(|| config.storage_path.clone())
        .ok_or(CliError::MissingStorage)?;

    let Some((name, sub)) = matches.subcommand() else {
        return Err(CliError::MissingCommand);
    };

    if name == "init" {
        Database::init(&path, config)?;
        return Ok(());
    }

    let items = int_values(sub, "items");
    if name == "add" && items.len() % 2 != 0 {
        return Err(CliError::UnpairedItems(items.len()));
    }

    let mut db = Database::open(&path, config)?;
    tracing::debug!(path = %db.path().display(), command = name, "running command");
    let keys = int_values(sub, "keys");

    match name {
        "add" => {
            for pair in items.chunks_exact(2) {
                let &[key, value] = pair else { continue };
                if let InsertOutcome::Updated { previous, .. } = db.set(key, value)? {
                    tracing::info!(key, previous, value, "replaced existing value");
                }
            }
        }
        "get" => {
            for key in keys {
                match db.get(key)? {
                    Some(value) => writeln!(out, "{value}")?,
                    None => writeln!(out, "not found")?,
                }
            }
        }
        "del" => {
            for key in keys {
                if db.delete(key)?.is_none() {
                    tracing::debug!(key, "delete of missing key");
                }
            }
        }
        "exist" => {
            for key in keys {
                writeln!(out, "{}", db.contains(key)?)?;
            }
        }
        "keys" => write_joined(out, &db.keys()?)?,
        "values" => write_joined(out, &db.values()?)?,
        "check" => {
            let stats = db.check()?;
            writeln!(
                out,
                "ok: {} nodes, black height {}, depth {}",
                stats.nodes, stats.black_height, stats.depth
            )?;
        }
        _ => return Err(CliError::MissingCommand),
    }

    db.close()?;
    Ok(())
}
