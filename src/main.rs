//! litedoc CLI entry point
//!
//! Parses arguments and dispatches through `cli::run`, which prints the JSON
//! response itself. A failed command exits non-zero.

use litedoc::cli;

fn main() {
    if cli::run().is_err() {
        std::process::exit(1);
    }
}
