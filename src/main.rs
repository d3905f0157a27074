//! storescope CLI entry point
//!
//! Parses arguments, dispatches through `cli::run`, prints errors to stderr
//! and exits with the status of the error's code.

use storescope::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(e.exit_status());
    }
}
