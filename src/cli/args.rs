//! CLI argument definitions using clap
//!
//! Commands:
//! - litedoc insert <db> <collection> <document>
//! - litedoc find <db> <collection> [filter] [--sort] [--skip] [--limit]
//! - litedoc update <db> <collection> <filter> <patch> [--replace]
//! - litedoc remove <db> <collection> <filter>
//! - litedoc count <db> <collection> [filter]
//! - litedoc aggregate <db> <collection> <pipeline>
//! - litedoc collections <db>
//! - litedoc databases
//!
//! JSON arguments given as `-` are read from stdin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// litedoc - document store on SQLite
#[derive(Parser, Debug)]
#[command(name = "litedoc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(long, global = true, conflicts_with = "data_dir")]
    pub config: Option<PathBuf>,

    /// Data directory, used with default settings
    #[arg(long, global = true, default_value = "./litedoc-data")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Insert a document, or an array of documents atomically
    Insert {
        database: String,
        collection: String,
        /// Document JSON
        document: String,
    },

    /// Find documents
    Find {
        database: String,
        collection: String,
        /// Filter JSON
        #[arg(default_value = "{}")]
        filter: String,
        /// Sort JSON, e.g. {"age": -1}
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        skip: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Update matching documents
    Update {
        database: String,
        collection: String,
        /// Filter JSON
        filter: String,
        /// Operator patch, merge patch or replacement JSON
        patch: String,
        /// Treat the patch as a full replacement
        #[arg(long)]
        replace: bool,
    },

    /// Remove matching documents
    Remove {
        database: String,
        collection: String,
        /// Filter JSON
        filter: String,
    },

    /// Count matching documents
    Count {
        database: String,
        collection: String,
        /// Filter JSON
        #[arg(default_value = "{}")]
        filter: String,
    },

    /// Run an aggregation pipeline
    Aggregate {
        database: String,
        collection: String,
        /// Pipeline JSON array
        pipeline: String,
    },

    /// List collections of a database
    Collections { database: String },

    /// List databases in the data directory
    Databases,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
