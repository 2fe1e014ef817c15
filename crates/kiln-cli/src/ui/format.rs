//! Formatting utilities for sizes, durations and build summaries.

use std::fs;
use std::time::Duration;

use console::Term;
use kiln_bundler::BuildReport;
use owo_colors::OwoColorize;

use super::colors_enabled;

/// Format a file size in human-readable form.
///
/// ```
/// use kiln_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(500), "500 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// assert_eq!(format_size(1_048_576), "1.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Format a duration as `ms`, `s` or `m s`.
///
/// ```
/// use std::time::Duration;
/// use kiln_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Print the emitted chunks of every target, with sizes, plus phase timings.
pub fn print_build_summary(report: &BuildReport) {
    let width = (Term::stderr().size().1 as usize).clamp(20, 80);
    let rule = "─".repeat(width);

    for target in &report.targets {
        let title = format!("{} → {}", target.name, target.out_dir.display());
        if colors_enabled() {
            eprintln!("\n{}", title.bold().underline());
        } else {
            eprintln!("\n{title}");
        }
        eprintln!("{rule}");

        for (chunk, entry) in &target.manifest {
            let size = fs::metadata(target.out_dir.join(&entry.file))
                .map(|m| m.len())
                .unwrap_or(0);
            if colors_enabled() {
                eprintln!(
                    "  {} {} {} {}",
                    "▸".blue(),
                    entry.file.bright_white().bold(),
                    format_size(size).dimmed(),
                    format!("({chunk})").dimmed()
                );
            } else {
                eprintln!("  ▸ {} {} ({chunk})", entry.file, format_size(size));
            }
        }
    }

    eprintln!("{rule}");
    let phases: Vec<String> = report
        .phases
        .iter()
        .map(|(phase, d)| format!("{phase} {}", format_duration(*d)))
        .collect();
    eprintln!(
        "  {} modules, dependencies {:?}, {} in {}",
        report.modules,
        report.prebundle,
        phases.join(" · "),
        format_duration(report.total_duration())
    );
}
