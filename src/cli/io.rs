//! JSON I/O handling for CLI
//!
//! - JSON arguments: inline text, or `-` for stdin
//! - Output: single JSON object via stdout
//! - UTF-8 only

use std::io::{self, Read, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Parses a JSON argument; `-` reads it from stdin
pub fn read_json_arg(name: &str, raw: &str) -> CliResult<Value> {
    let text = if raw == "-" {
        let mut buf = String::new();
        io::stdin().lock().read_to_string(&mut buf)?;
        buf
    } else {
        raw.to_string()
    };

    if text.trim().is_empty() {
        return Err(CliError::invalid_argument(format!("{} is empty", name)));
    }

    serde_json::from_str(&text)
        .map_err(|e| CliError::invalid_argument(format!("{} is not valid JSON: {}", name, e)))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(&response)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(&response)
}

fn write_line(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)
        .map_err(|e| CliError::io_error(format!("JSON error: {}", e)))?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_json_arg() {
        let value = read_json_arg("filter", r#"{"age": {"$gt": 18}}"#).unwrap();
        assert_eq!(value["age"]["$gt"], 18);
    }

    #[test]
    fn test_malformed_json_arg() {
        let err = read_json_arg("filter", "{age:").unwrap_err();
        assert_eq!(err.code_str(), "DOC_CLI_INVALID_ARGUMENT");
        assert!(err.message().starts_with("filter"));
    }
}
