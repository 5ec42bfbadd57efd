//! Terminal rendering for execution results

use crate::core::{ExecutionResult, OutputLine, StreamKind};
use colored::Colorize;

/// Render a line as it arrives from a streaming execution
pub fn render_line(line: &OutputLine, timestamps: bool) -> String {
    let text = match line.stream {
        StreamKind::Stdout => line.text.normal(),
        StreamKind::Stderr => line.text.yellow(),
    };
    if timestamps {
        format!("{} {text}", line.timestamp.format("%H:%M:%S%.3f").to_string().dimmed())
    } else {
        text.to_string()
    }
}

/// Human-readable summary of a finished operation
///
/// `include_output` is false when the lines were already printed while
/// streaming.
pub fn render_result(result: &ExecutionResult, include_output: bool) -> String {
    let mut out = Vec::new();

    if include_output {
        match &result.structured_output {
            Some(value) => out.push(
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            ),
            None => out.extend(result.stdout_lines.iter().cloned()),
        }
        if !result.success {
            out.extend(result.stderr_lines.iter().map(|line| line.yellow().to_string()));
        }
    }

    let status = if result.success {
        "ok".green().bold()
    } else if result.cancelled {
        "cancelled".yellow().bold()
    } else {
        "failed".red().bold()
    };
    let mut summary = format!(
        "{status} {} ({} ms",
        result.command.dimmed(),
        result.execution_time_ms
    );
    if let Some(code) = result.exit_code {
        summary.push_str(&format!(", exit code {code}"));
    }
    summary.push(')');
    out.push(summary);

    if let Some(error) = &result.error {
        let label = match result.error_kind {
            Some(kind) => format!("error [{kind}]"),
            None => "error".to_string(),
        };
        out.push(format!("{}: {error}", label.red()));
    }
    for suggestion in &result.suggestions {
        out.push(format!("  {} {suggestion}", "hint:".cyan()));
    }

    out.join("\n")
}

/// Pretty JSON for `--json`
pub fn render_json(result: &ExecutionResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(result)
}
