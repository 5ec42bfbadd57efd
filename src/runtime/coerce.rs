//! Structured-output handling
//!
//! Commands that understand `--format` get `--format=json` appended before
//! they are spawned, and their aggregated stdout is parsed as a single JSON
//! document afterwards.

use crate::core::{CommandSpec, Execution};
use serde_json::Value;

/// Flag requesting machine-readable output
pub const FORMAT_FLAG: &str = "--format";

/// Value injected for [`FORMAT_FLAG`]
pub const STRUCTURED_FORMAT: &str = "json";

/// Whether `args` already ask for a specific output format
pub fn has_format_request(args: &[String]) -> bool {
    args.iter()
        .take_while(|arg| arg.as_str() != "--")
        .any(|arg| arg == FORMAT_FLAG || arg.starts_with("--format="))
}

/// Arguments to pass to the binary for `spec`
///
/// Appends `--format=json` when the command supports structured output,
/// injection is enabled and the caller did not pick a format themselves.
/// The spec itself is left untouched, so calling this repeatedly never adds
/// more than one flag.
pub fn effective_args(spec: &CommandSpec, inject_format: bool) -> Vec<String> {
    let mut args = spec.args().to_vec();
    if inject_format && spec.supports_structured_output() && !has_format_request(&args) {
        let flag = format!("{FORMAT_FLAG}={STRUCTURED_FORMAT}");
        match args.iter().position(|arg| arg == "--") {
            Some(separator) => args.insert(separator, flag),
            None => args.push(flag),
        }
    }
    args
}

/// Whether `args` request JSON output, injected or explicit
pub fn requests_json(args: &[String]) -> bool {
    let mut iter = args.iter().take_while(|arg| arg.as_str() != "--");
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            return is_json_format(value);
        }
        if arg == FORMAT_FLAG {
            return iter.next().is_some_and(|value| is_json_format(value));
        }
    }
    false
}

fn is_json_format(value: &str) -> bool {
    value == STRUCTURED_FORMAT || value.starts_with("json(")
}

/// Raw lines plus the parsed document, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub lines: Vec<String>,
    pub structured: Option<Value>,
}

/// Parse the aggregated stdout of `execution` as one JSON document
///
/// Only attempted when the command supports structured output or explicitly
/// asked for JSON. Empty stdout is a successful empty result, not a parse
/// failure; unparseable output leaves `structured` empty so callers fall
/// back to the raw lines.
pub fn coerce(execution: &Execution) -> Coerced {
    let lines: Vec<String> = execution
        .stdout()
        .iter()
        .map(|line| line.text.clone())
        .collect();

    let wants_structured =
        execution.spec().supports_structured_output() || requests_json(execution.argv());
    if !wants_structured {
        return Coerced {
            lines,
            structured: None,
        };
    }

    let joined = lines.join("\n");
    if joined.trim().is_empty() {
        return Coerced {
            lines,
            structured: None,
        };
    }

    let structured = match serde_json::from_str::<Value>(&joined) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(
                execution_id = %execution.id(),
                error = %err,
                "Stdout is not a JSON document, keeping raw lines"
            );
            None
        }
    };

    Coerced { lines, structured }
}
