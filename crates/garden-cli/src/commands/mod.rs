pub mod completions;
pub mod list;
pub mod run;
pub mod verify;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REGISTRY_ERROR: u8 = 2;
pub const EXIT_RUNTIME_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Split a comma-separated flag value, dropping empty entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Coloured per-module status mark.
pub fn status_mark(success: bool) -> String {
    use console::Style;
    if success {
        Style::new().green().apply_to("✓").to_string()
    } else {
        Style::new().red().bold().apply_to("✗").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"module": "net/nmap"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"module\""));
        assert!(result.contains("\"net/nmap\""));
    }

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" net, web ,,"), vec!["net", "web"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn status_marks_differ() {
        assert!(status_mark(true).contains('✓'));
        assert!(status_mark(false).contains('✗'));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_REGISTRY_ERROR);
        assert_ne!(EXIT_REGISTRY_ERROR, EXIT_RUNTIME_ERROR);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("running...");
        spin_ok(&pb, "done");
        let pb = spinner("running...");
        spin_fail(&pb, "failed");
    }
}
