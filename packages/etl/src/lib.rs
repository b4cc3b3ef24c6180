#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! MercadoLibre listings ETL.
//!
//! Pulls listings, sellers and currency rates from the MercadoLibre API,
//! flattens them into records and appends them to a `DuckDB` warehouse.
//! The three streams run as independent tracks; [`run_etl`] reports how
//! each one ended instead of a single pass/fail.

pub mod config;
pub mod tracks;

pub use meli_etl_models::{RunOutcome, RunSummary, Track, TrackReport, TrackState};
pub use tracks::{EtlProgress, run_etl};

/// Environment variable holding the API bearer token.
pub const API_KEY_ENV: &str = "MELI_API_KEY";

/// Renders the per-track summary table printed at the end of a run.
#[must_use]
pub fn format_summary(summary: &RunSummary) -> String {
    let mut lines = vec![
        format!(
            "Run started {}",
            summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        String::new(),
        format!(
            "{:<10} {:<8} {:>8} {:>8} {:>8} {:>8}  TABLE / ERROR",
            "TRACK", "STATE", "FETCHED", "SKIPPED", "WRITTEN", "SECS"
        ),
        "-".repeat(80),
    ];

    lines.extend(summary.tracks.iter().map(|report| {
        let detail = report.error.as_deref().unwrap_or(&report.table);
        format!(
            "{:<10} {:<8} {:>8} {:>8} {:>8} {:>8.1}  {detail}",
            report.track.as_ref(),
            report.state.as_ref(),
            report.fetched,
            report.skipped,
            report.written,
            report.duration.as_secs_f64(),
        )
    }));

    let outcome = summary.outcome();
    lines.push(String::new());
    lines.push(format!(
        "Outcome: {outcome} (exit code {})",
        outcome.exit_code()
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_every_track_and_the_outcome() {
        let mut sellers = TrackReport::new(Track::Sellers, "meli.sellers_details".to_string());
        sellers.state = TrackState::Failed;
        sellers.fetched = 4;
        sellers.error = Some("Permission denied for meli.sellers_details".to_string());

        let mut items = TrackReport::new(Track::Items, "meli.items_details".to_string());
        items.state = TrackState::Done;
        items.fetched = 3;
        items.skipped = 1;
        items.written = 2;

        let text = format_summary(&RunSummary {
            started_at: chrono::Utc::now(),
            tracks: vec![items, sellers],
        });

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Run started "));
        assert!(lines[4].starts_with("items"));
        assert!(lines[4].contains("DONE"));
        assert!(lines[4].ends_with("meli.items_details"));
        assert!(lines[5].starts_with("sellers"));
        assert!(lines[5].contains("FAILED"));
        assert!(lines[5].ends_with("Permission denied for meli.sellers_details"));
        assert!(text.contains("Outcome: PARTIAL (exit code 1)"));
    }
}
