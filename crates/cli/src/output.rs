//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use probe_lib::ScalingAction;
use std::time::Duration;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a duration the way profiles write them ("1m 30s")
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    humantime_serde::re::humantime::format_duration(duration).to_string()
}

/// Format milliseconds
pub fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.0}ms", ms)
    }
}

/// Format a percentage
pub fn format_percent(percent: f64) -> String {
    format!("{:.2}%", percent)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "pending" => status.yellow().to_string(),
        "running" => status.blue().to_string(),
        "completed" | "passed" | "ok" => status.green().to_string(),
        "cancelled" | "warning" => status.yellow().to_string(),
        "failed" | "error" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a pass/fail flag
pub fn color_passed(passed: bool) -> String {
    if passed {
        color_status("passed")
    } else {
        color_status("failed")
    }
}

/// Color a scaling action
pub fn color_action(action: ScalingAction) -> String {
    let text = action.to_string();
    match action {
        ScalingAction::ScaleUp => text.red().bold().to_string(),
        ScalingAction::ScaleDown => text.green().bold().to_string(),
        ScalingAction::Maintain => text.blue().bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(412.4), "412ms");
        assert_eq!(format_ms(2500.0), "2.50s");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(99.5), "99.50%");
    }
}
