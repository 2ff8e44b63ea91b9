use std::fmt::Write as _;

use anyhow::{Context, Result};

use crate::controller::WidgetSnapshot;

/// Labelled plain-text rendering of one snapshot, one field per line.
pub fn render_text(snapshot: &WidgetSnapshot) -> String {
    let mut out = String::new();
    if let Some(title) = &snapshot.title {
        let _ = writeln!(out, "{title}");
    }
    let _ = writeln!(out, "Now: {} ({})", snapshot.now_local, snapshot.clock_source);
    let _ = writeln!(out, "Mode: {}", snapshot.mode.as_str());
    let _ = writeln!(out, "Selected time: {}", snapshot.selected_time);
    if snapshot.toggle_visible {
        let best = snapshot
            .best_price_time
            .as_deref()
            .unwrap_or("not available");
        let _ = writeln!(
            out,
            "Best price: {best} (following: {})",
            if snapshot.use_best_price { "yes" } else { "no" }
        );
    }
    if let Some(program) = &snapshot.selected_program {
        let _ = writeln!(out, "Program: {program}");
    }
    let _ = writeln!(out, "Target: {}", snapshot.target_local);
    let _ = writeln!(out, "Effective: {}", snapshot.effective_local);
    let _ = writeln!(out, "Raw delay: {:.2} min", snapshot.raw_delay_minutes);
    let _ = writeln!(
        out,
        "Device timer: {} min (interval {} min)",
        snapshot.delay_minutes, snapshot.device_timer_interval
    );
    let _ = writeln!(out, "Delay: {}", snapshot.delay_text);
    let _ = writeln!(
        out,
        "Timer runs out: {} ({})",
        snapshot.timer_elapses_time, snapshot.timer_elapses_local
    );
    out
}

pub fn render_json(snapshot: &WidgetSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).context("failed to encode snapshot as JSON")
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate, TimeZone};

    use super::*;
    use crate::clock::FixedClock;
    use crate::controller::WidgetController;
    use crate::timer::config::parse_widget_config_text;

    fn snapshot(json: &str) -> WidgetSnapshot {
        let config = parse_widget_config_text(json).expect("valid config");
        let now = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2026, 6, 15)
                    .expect("date")
                    .and_hms_opt(8, 10, 0)
                    .expect("time"),
            )
            .earliest()
            .expect("local time exists");
        WidgetController::new(config, Box::new(FixedClock::new(now))).snapshot()
    }

    #[test]
    fn text_report_lists_delay_fields() {
        let text = render_text(&snapshot(
            r#"{ "title": "Dishwasher", "default_time": "12:00" }"#,
        ));
        assert!(text.starts_with("Dishwasher\n"));
        assert!(text.contains("Selected time: 12:00"));
        assert!(text.contains("Device timer: 240 min (interval 60 min)"));
        assert!(text.contains("Delay: 4h 00m"));
        assert!(text.contains("Timer runs out: 12:10 ("));
        assert!(!text.contains("Best price"));
        assert!(!text.contains("Program:"));
    }

    #[test]
    fn text_report_shows_unavailable_best_price() {
        let text = render_text(&snapshot(
            r#"{ "default_time": "12:00", "price_entity": "sensor.cheapest_in" }"#,
        ));
        assert!(text.contains("Best price: not available (following: no)"));
    }

    #[test]
    fn twelve_hour_config_formats_timer_end() {
        let text = render_text(&snapshot(
            r#"{ "default_time": "13:05", "time_format": "12h" }"#,
        ));
        assert!(text.contains("Selected time: 1:05 PM"));
        assert!(text.contains("Timer runs out: 1:10 PM ("));
    }

    #[test]
    fn json_report_is_parseable() {
        let json = render_json(&snapshot(r#"{ "default_time": "12:00" }"#)).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse back");
        assert_eq!(value["delay_minutes"], 240);
        assert_eq!(value["delay_text"], "4h 00m");
    }
}
