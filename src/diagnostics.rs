use std::fmt::Write as _;
use std::path::Path;

use crate::runtime::ChimeRuntime;
use crate::status::StatusSurface;
use crate::tone::player::ChimeOutput;

/// Where the inputs to the report came from, for the lines that explain them.
pub struct DiagnosticsContext<'a> {
    pub settings_path: &'a Path,
    pub settings_found: bool,
    pub time_source: &'static str,
    pub theme_source: &'static str,
    pub time_format_source: &'static str,
    pub locale: Option<&'a str>,
}

pub fn diagnostics_report<O: ChimeOutput, S: StatusSurface>(
    runtime: &ChimeRuntime<O, S>,
    context: &DiagnosticsContext<'_>,
) -> String {
    let snapshot = runtime.snapshot();
    let mut out = String::new();
    let _ = writeln!(out, "Time Chime diagnostics");
    let _ = writeln!(
        out,
        "Settings file: {}{}",
        context.settings_path.display(),
        if context.settings_found {
            ""
        } else {
            " (not found, defaults)"
        }
    );
    let _ = writeln!(out, "Time source: {}", context.time_source);
    let _ = writeln!(out, "Current time: {}", snapshot.current_time);
    let _ = writeln!(out, "Chime minute: :{:02}", snapshot.minute_of_hour);
    let _ = writeln!(
        out,
        "Chimes: {}",
        if snapshot.active { "on" } else { "off" }
    );
    let _ = writeln!(
        out,
        "Theme: {} -> {} (OS signal: {})",
        snapshot.theme_preference, snapshot.resolved_theme, context.theme_source
    );
    let _ = writeln!(
        out,
        "Time format: {} ({}, locale {})",
        runtime.formatter().effective_mode().label(),
        context.time_format_source,
        context.locale.unwrap_or("unset")
    );
    let _ = writeln!(out, "Next chimes:");
    for chime in &snapshot.next_chimes {
        let _ = writeln!(out, "  {chime}");
    }
    out
}
