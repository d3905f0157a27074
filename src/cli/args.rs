//! CLI argument definitions using clap
//!
//! Commands:
//! - storescope dump <ns> [data_dir] [--insert <value>...]
//! - storescope catalog [data_dir]
//! - storescope metadata [data_dir]
//! - storescope log [data_dir] [--last]
//! - storescope stats [data_dir] [--table <ident>]
//! - storescope create <ns> [data_dir] [--ident <ident>]
//! - storescope drop <ns> [data_dir]
//! - storescope checkpoint [data_dir]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// storescope - inspect a document store's physical tables directly
#[derive(Parser, Debug)]
#[command(name = "storescope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Dump a collection and its indexes
    Dump {
        /// Namespace, e.g. `db.users`
        namespace: String,
        data_dir: Option<PathBuf>,
        /// Insert `{value: <scalar>}` records before dumping
        #[arg(long = "insert", num_args = 1..)]
        insert: Vec<String>,
    },

    /// Dump the catalog
    Catalog { data_dir: Option<PathBuf> },

    /// Dump the engine metadata namespace
    Metadata { data_dir: Option<PathBuf> },

    /// Dump the write-ahead log
    Log {
        data_dir: Option<PathBuf>,
        /// Only the last transaction that touched data
        #[arg(long)]
        last: bool,
    },

    /// Dump engine statistics
    Stats {
        data_dir: Option<PathBuf>,
        /// Statistics of one table instead of the connection
        #[arg(long)]
        table: Option<String>,
    },

    /// Create and register an empty collection
    Create {
        namespace: String,
        data_dir: Option<PathBuf>,
        /// Table identity; generated when omitted
        #[arg(long)]
        ident: Option<String>,
    },

    /// Unregister a collection and drop its tables
    Drop {
        namespace: String,
        data_dir: Option<PathBuf>,
    },

    /// Force a checkpoint
    Checkpoint { data_dir: Option<PathBuf> },
}

impl Command {
    /// Data directory given on the command line, if any
    pub fn data_dir(&self) -> Option<&PathBuf> {
        match self {
            Command::Dump { data_dir, .. }
            | Command::Catalog { data_dir }
            | Command::Metadata { data_dir }
            | Command::Log { data_dir, .. }
            | Command::Stats { data_dir, .. }
            | Command::Create { data_dir, .. }
            | Command::Drop { data_dir, .. }
            | Command::Checkpoint { data_dir } => data_dir.as_ref(),
        }
    }

    /// True for commands that change the data directory
    pub fn mutates(&self) -> bool {
        match self {
            Command::Dump { insert, .. } => !insert.is_empty(),
            Command::Create { .. } | Command::Drop { .. } | Command::Checkpoint { .. } => true,
            Command::Catalog { .. }
            | Command::Metadata { .. }
            | Command::Log { .. }
            | Command::Stats { .. } => false,
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_with_inserts() {
        let cli = Cli::try_parse_from([
            "storescope", "dump", "db.users", "/tmp/db", "--insert", "1", "two",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Dump {
                namespace: "db.users".to_string(),
                data_dir: Some(PathBuf::from("/tmp/db")),
                insert: vec!["1".to_string(), "two".to_string()],
            }
        );
        assert!(cli.command.mutates());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["storescope", "log", "--last", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.command, Command::Log { data_dir: None, last: true });
        assert!(!cli.command.mutates());
    }

    #[test]
    fn test_missing_namespace_rejected() {
        assert!(Cli::try_parse_from(["storescope", "drop"]).is_err());
    }
}
