//! CLI command implementations
//!
//! Every command opens a `Client`, runs one library call, and prints its
//! result as the `data` of a single JSON response.

use serde_json::{json, Value};

use crate::client::Client;
use crate::config::StoreConfig;
use crate::document::Document;
use crate::observability::{log_event_with_fields, Event};
use crate::store::StoreError;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_json_arg, write_error, write_response};

/// Parse arguments, run the command, print the response.
///
/// Errors are printed as an error response before being returned.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let outcome = open_client(&cli).and_then(|client| run_command(&client, cli.command));
    match outcome {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Client for the configured data directory
pub fn open_client(cli: &Cli) -> CliResult<Client> {
    let config = match &cli.config {
        Some(path) => {
            let config = StoreConfig::load(path)?;
            let path = path.display().to_string();
            log_event_with_fields(Event::ConfigLoaded, &[("path", &path)]);
            config
        }
        None => StoreConfig::new(&cli.data_dir),
    };
    Ok(Client::open(config)?)
}

/// Run one command; returns the response `data`
pub fn run_command(client: &Client, cmd: Command) -> CliResult<Value> {
    match cmd {
        Command::Insert { database, collection, document } => {
            let coll = client.database(&database)?.collection(&collection)?;
            match read_json_arg("document", &document)? {
                Value::Array(docs) => {
                    let ids = coll.insert_many(docs)?;
                    Ok(json!({ "inserted": ids }))
                }
                doc => {
                    let id = coll.insert(doc)?;
                    Ok(json!({ "inserted": [id] }))
                }
            }
        }

        Command::Find { database, collection, filter, sort, skip, limit } => {
            let coll = client.database(&database)?.collection(&collection)?;
            let mut cursor = coll.find(read_json_arg("filter", &filter)?)?;
            if let Some(sort) = sort {
                let spec = read_json_arg("sort", &sort)?;
                cursor = cursor.sort_by(&spec).map_err(StoreError::from)?;
            }
            if let Some(n) = skip {
                cursor = cursor.skip(n);
            }
            if let Some(n) = limit {
                cursor = cursor.limit(n);
            }
            Ok(documents(cursor.to_vec()))
        }

        Command::Update { database, collection, filter, patch, replace } => {
            let coll = client.database(&database)?.collection(&collection)?;
            let filter = read_json_arg("filter", &filter)?;
            let patch = read_json_arg("patch", &patch)?;
            let modified = if replace {
                coll.replace(filter, patch)?
            } else {
                coll.update(filter, patch)?
            };
            Ok(json!({ "modified": modified }))
        }

        Command::Remove { database, collection, filter } => {
            let coll = client.database(&database)?.collection(&collection)?;
            let removed = coll.remove(read_json_arg("filter", &filter)?)?;
            Ok(json!({ "removed": removed }))
        }

        Command::Count { database, collection, filter } => {
            let coll = client.database(&database)?.collection(&collection)?;
            let count = coll.count(read_json_arg("filter", &filter)?)?;
            Ok(json!({ "count": count }))
        }

        Command::Aggregate { database, collection, pipeline } => {
            let coll = client.database(&database)?.collection(&collection)?;
            let pipeline = read_json_arg("pipeline", &pipeline)?;
            if !pipeline.is_array() {
                return Err(CliError::invalid_argument("pipeline must be a JSON array"));
            }
            Ok(documents(coll.aggregate(&pipeline)?))
        }

        Command::Collections { database } => {
            Ok(json!(client.database(&database)?.list_collections()?))
        }

        Command::Databases => Ok(json!(client.list_databases()?)),
    }
}

fn documents(docs: Vec<Document>) -> Value {
    Value::Array(docs.into_iter().map(Value::Object).collect())
}
