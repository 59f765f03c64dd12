// pg-startup-profiler - core/export.rs
//
// JSON and CSV export of finalized profiles and comparisons.
// Core layer: writes to any Write implementor, never opens files.

use crate::core::compare::ProfileComparison;
use crate::core::model::StartupProfile;
use crate::util::error::ReportError;
use chrono::TimeDelta;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

// =============================================================================
// JSON report document
// =============================================================================

/// Machine-readable profile report.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    /// Image tag or input name the profile was taken from.
    pub image: String,
    pub total_duration_ms: i64,
    pub degraded: bool,
    pub phases: Vec<JsonPhase>,
    pub init_scripts: Vec<JsonScript>,
    pub extensions: Vec<JsonExtension>,
    pub background_workers: Vec<JsonWorker>,

    /// Full event timeline; verbose reports only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<JsonEvent>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonPhase {
    pub name: String,
    pub duration_ms: i64,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonScript {
    pub path: String,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonExtension {
    pub name: String,
    pub load_time_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonWorker {
    pub name: String,
    pub started_at_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub offset_ms: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, String>,
}

fn ms(d: TimeDelta) -> i64 {
    d.num_milliseconds()
}

impl JsonReport {
    /// Build the report document for `profile`.
    pub fn from_profile(profile: &StartupProfile, image: &str, verbose: bool) -> Self {
        let events = verbose.then(|| {
            profile
                .events
                .iter()
                .map(|e| JsonEvent {
                    kind: e.source.label().to_string(),
                    name: e.name.clone(),
                    offset_ms: ms(e.offset()),
                    captures: e.captures.clone(),
                })
                .collect()
        });

        Self {
            image: image.to_string(),
            total_duration_ms: ms(profile.total_duration),
            degraded: profile.degraded,
            phases: profile
                .phases
                .iter()
                .map(|p| JsonPhase {
                    name: p.name.clone(),
                    duration_ms: ms(p.duration),
                    pct: p.percent,
                })
                .collect(),
            init_scripts: profile
                .init_scripts
                .iter()
                .map(|s| JsonScript {
                    path: s.path.clone(),
                    duration_ms: ms(s.duration),
                })
                .collect(),
            extensions: profile
                .extensions
                .iter()
                .map(|x| JsonExtension {
                    name: x.name.clone(),
                    load_time_ms: ms(x.load_time),
                })
                .collect(),
            background_workers: profile
                .bg_workers
                .iter()
                .map(|w| JsonWorker {
                    name: w.name.clone(),
                    started_at_ms: ms(w.started_at),
                })
                .collect(),
            events,
        }
    }
}

/// Write the JSON report for `profile`, pretty-printed, newline-terminated.
pub fn export_json<W: Write>(
    profile: &StartupProfile,
    image: &str,
    verbose: bool,
    mut writer: W,
) -> Result<(), ReportError> {
    let report = JsonReport::from_profile(profile, image, verbose);
    serde_json::to_writer_pretty(&mut writer, &report)
        .map_err(|e| ReportError::Json { source: e })?;
    writeln!(writer).map_err(|e| ReportError::Io { source: e })?;
    Ok(())
}

// =============================================================================
// Comparison report
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct JsonComparison {
    pub baseline: String,
    pub candidate: String,
    pub baseline_total_ms: i64,
    pub candidate_total_ms: i64,
    pub delta_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_pct: Option<f64>,
    pub baseline_degraded: bool,
    pub candidate_degraded: bool,
    pub extensions: Vec<JsonExtensionDelta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonExtensionDelta {
    pub name: String,
    pub baseline_ms: Option<i64>,
    pub candidate_ms: Option<i64>,
    pub delta_ms: Option<i64>,
}

/// Write a comparison as pretty JSON.
pub fn export_comparison_json<W: Write>(
    cmp: &ProfileComparison,
    baseline: &str,
    candidate: &str,
    mut writer: W,
) -> Result<(), ReportError> {
    let doc = JsonComparison {
        baseline: baseline.to_string(),
        candidate: candidate.to_string(),
        baseline_total_ms: ms(cmp.baseline_total),
        candidate_total_ms: ms(cmp.candidate_total),
        delta_ms: ms(cmp.delta()),
        delta_pct: cmp.delta_percent(),
        baseline_degraded: cmp.baseline_degraded,
        candidate_degraded: cmp.candidate_degraded,
        extensions: cmp
            .extensions
            .iter()
            .map(|e| JsonExtensionDelta {
                name: e.name.clone(),
                baseline_ms: e.baseline.map(ms),
                candidate_ms: e.candidate.map(ms),
                delta_ms: e.delta().map(ms),
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut writer, &doc).map_err(|e| ReportError::Json { source: e })?;
    writeln!(writer).map_err(|e| ReportError::Io { source: e })?;
    Ok(())
}

// =============================================================================
// CSV event timeline
// =============================================================================

/// Export the sorted event timeline to CSV.
///
/// Writes: offset_ms, timestamp, source, name, ready, captures, details.
/// Captures are flattened as `key=value` pairs joined by `;`.
/// Returns the number of data rows written.
pub fn export_csv<W: Write>(profile: &StartupProfile, writer: W) -> Result<usize, ReportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(["offset_ms", "timestamp", "source", "name", "ready", "captures", "details"])
        .map_err(|e| ReportError::Csv { source: e })?;

    let mut count = 0;
    for event in &profile.events {
        let captures = event
            .captures
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");

        let offset = ms(event.offset()).to_string();
        let timestamp = event.timestamp.to_rfc3339();

        csv_writer
            .write_record([
                offset.as_str(),
                timestamp.as_str(),
                event.source.label(),
                event.name.as_str(),
                if event.marks_ready { "true" } else { "false" },
                captures.as_str(),
                event.details.as_str(),
            ])
            .map_err(|e| ReportError::Csv { source: e })?;
        count += 1;
    }

    csv_writer
        .flush()
        .map_err(|e| ReportError::Io { source: e })?;

    Ok(count)
}
