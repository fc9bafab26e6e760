//! CLI module for litedoc
//!
//! One-shot commands over a data directory:
//! - insert, update, remove: mutations
//! - find, count, aggregate: reads
//! - collections, databases: listings

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{open_client, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_arg, write_error, write_response};
