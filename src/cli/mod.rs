//! CLI module for storescope
//!
//! Provides the operator commands:
//! - dump: a collection and its indexes, optionally after inserting values
//! - catalog, metadata, log, stats: raw views of the data directory
//! - create, drop: register or remove a collection
//! - checkpoint: force durability

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{parse_scalar, run, run_command, run_with, validate_namespace};
pub use config::{Config, KeyDecoderConfig, LogConfig, DEFAULT_DATA_DIR};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::Output;
