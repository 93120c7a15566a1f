//! Variable arguments given on the command line.

use std::path::Path;

use crate::config::VarMap;
use crate::error::{ConfigError, ConvergeError, Result};

/// Parses `key=value` arguments into a variable map.
///
/// Values that parse as JSON (lists, maps, numbers, booleans) keep their
/// type; anything else is taken as a plain string.
///
/// # Errors
///
/// Returns `InvalidVarAssignment` for an argument without `=` or with an
/// empty key.
pub fn parse_var_assignments(raw: &[String]) -> Result<VarMap> {
    let mut vars = VarMap::new();
    for assignment in raw {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(invalid(assignment));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid(assignment));
        }

        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

/// Loads variables from a JSON object file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON object.
pub fn load_var_file(path: &Path) -> Result<VarMap> {
    let content = std::fs::read_to_string(path).map_err(|_| {
        ConvergeError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        })
    })?;

    serde_json::from_str(&content).map_err(|e| {
        ConvergeError::Config(ConfigError::ParseError {
            message: format!("Variable file must be a JSON object: {e}"),
            location: Some(path.display().to_string()),
        })
    })
}

fn invalid(raw: &str) -> ConvergeError {
    ConvergeError::Config(ConfigError::InvalidVarAssignment {
        raw: raw.to_string(),
    })
}
