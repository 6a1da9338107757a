use std::io::Write;

use cts_core::config::{OutputConfig, OutputFormat};
use cts_core::{RunReport, StatusCode};

/// Render `run` in the configured format, to a file or stdout.
pub fn write(run: &RunReport, output: &OutputConfig) -> anyhow::Result<()> {
    let text = match output.format {
        OutputFormat::Pretty => render_pretty(run, output.path.is_none()),
        OutputFormat::Json => serde_json::to_string_pretty(run)? + "\n",
    };
    match &output.path {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!("report written to {}", path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
        }
    }
    Ok(())
}

fn render_pretty(run: &RunReport, color: bool) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!("Vulkan CTS on {}\n", run.device));
    out.push_str("==============================\n\n");

    for result in &run.results {
        let (tag, color_start) = match result.status {
            StatusCode::Pass => ("[PASS]", "\x1b[32m"),
            StatusCode::Fail => ("[FAIL]", "\x1b[31m"),
            StatusCode::QualityWarning => ("[WARN]", "\x1b[33m"),
            StatusCode::NotSupported => ("[SKIP]", "\x1b[90m"),
            StatusCode::InternalError => ("[ERR ]", "\x1b[35m"),
        };
        let (start, end) = if color { (color_start, "\x1b[0m") } else { ("", "") };
        out.push_str(&format!(
            "  {}{}{} {} - {} ({} ms)\n",
            start, tag, end, result.path, result.description, result.duration_ms
        ));
    }

    let summary = run.summary();
    out.push_str("\n-------------------------------\n");
    out.push_str(&format!(
        "  {} passed, {} failed, {} warnings, {} not supported, {} internal errors ({} total)\n\n",
        summary.passed,
        summary.failed,
        summary.quality_warnings,
        summary.not_supported,
        summary.internal_errors,
        summary.total()
    ));
    out
}
