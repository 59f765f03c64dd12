// pg-startup-profiler - core/model.rs
//
// Core data model types. Pure data definitions with no I/O.
//
// These types are the shared vocabulary between the rule set, the line
// classifier, the event sources, and the timeline aggregator.

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Pattern (runtime representation)
// =============================================================================

/// A compiled, named matching rule.
///
/// Built from `PatternDef` (the raw TOML structure) by `core::rules`.
/// Immutable after load; the occurrence counter it is gated on lives in
/// `Rules`, keyed by the literal regex text, so patterns that reuse the same
/// text share one counter.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Unique pattern name, copied onto every event the pattern emits.
    pub name: String,

    /// Compiled regex. `regex.as_str()` is the counter key.
    pub regex: Regex,

    /// Fire on the Nth line matching `regex` (1-based).
    pub occurrence: u32,

    /// Keep firing on every later match once `occurrence` is reached.
    pub repeat: bool,

    /// Whether the emitted event marks the readiness boundary.
    pub marks_ready: bool,

    /// Whether named capture groups are copied into the match.
    pub capture: bool,
}

impl Pattern {
    /// The literal regex source text, used as the occurrence counter key.
    pub fn regex_text(&self) -> &str {
        self.regex.as_str()
    }
}

/// Compiled timestamp extraction rule.
#[derive(Debug, Clone)]
pub struct TimestampRule {
    /// Regex whose first capturing group holds the timestamp text.
    pub regex: Regex,

    /// chrono format string applied to the captured text.
    pub layout: String,
}

/// A named phase boundary: the first event called `starts_at` opens the phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBoundary {
    pub name: String,
    pub starts_at: String,
}

// =============================================================================
// Match (transient output of the rule set)
// =============================================================================

/// Result of classifying one line against the rule set.
#[derive(Debug, Clone)]
pub struct Match<'r> {
    /// The pattern that fired.
    pub pattern: &'r Pattern,

    /// Timestamp parsed from the line, or the caller's fallback.
    pub timestamp: DateTime<Utc>,

    /// True when `timestamp` came from the line rather than the fallback.
    pub timestamp_from_line: bool,

    /// Named capture groups of the firing pattern (empty unless `capture`).
    pub captures: BTreeMap<String, String>,

    /// The original line text.
    pub line: String,
}

// =============================================================================
// Event
// =============================================================================

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventSource {
    /// Synthetic process / container lifecycle event.
    Process,
    /// Kernel exec trace record.
    Exec,
    /// Kernel file open trace record.
    Open,
    /// Classified log line.
    Log,
}

impl EventSource {
    /// Short label for compact display and CSV/JSON output.
    pub fn label(&self) -> &'static str {
        match self {
            EventSource::Process => "PROCESS",
            EventSource::Exec => "EXEC",
            EventSource::Open => "OPEN",
            EventSource::Log => "LOG",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The unit the timeline consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub source: EventSource,

    /// Pattern name, or a name synthesised by a non-log source.
    pub name: String,

    /// Absolute instant the event happened.
    pub timestamp: DateTime<Utc>,

    /// Offset from the timeline start. `None` until finalized.
    pub duration: Option<TimeDelta>,

    /// Free-form details (raw line, exec args, opened path).
    pub details: String,

    pub captures: BTreeMap<String, String>,

    /// Whether this event marks the readiness boundary.
    pub marks_ready: bool,
}

impl Event {
    /// A bare event with no details, captures, or readiness flag.
    pub fn new(source: EventSource, name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source,
            name: name.into(),
            timestamp,
            duration: None,
            details: String::new(),
            captures: BTreeMap::new(),
            marks_ready: false,
        }
    }

    /// Builder-style helper attaching one capture.
    pub fn with_capture(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.captures.insert(key.into(), value.into());
        self
    }

    /// Builder-style helper setting the readiness flag.
    pub fn ready(mut self) -> Self {
        self.marks_ready = true;
        self
    }

    /// Offset from the timeline start, zero before finalization.
    pub fn offset(&self) -> TimeDelta {
        self.duration.unwrap_or_else(TimeDelta::zero)
    }
}

// =============================================================================
// Derived timeline collections
// =============================================================================

/// When an extension finished loading, relative to the timeline start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionTiming {
    pub name: String,
    pub load_time: TimeDelta,
}

/// How long an init script ran, measured to the next script boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTiming {
    pub path: String,
    pub duration: TimeDelta,
}

/// When a background worker started, relative to the timeline start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTiming {
    pub name: String,
    pub started_at: TimeDelta,
}

/// A named slice of the total startup duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration: TimeDelta,
    /// Share of the total duration, 0.0 - 100.0.
    pub percent: f64,
}

/// How the last init script in a sequence is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrailingScriptPolicy {
    /// The last script has no following boundary and gets no entry.
    #[default]
    Drop,

    /// The last script is closed at the timeline end boundary.
    CloseAtReady,
}

// =============================================================================
// Startup profile (finalized timeline)
// =============================================================================

/// The sealed, read-only result of finalizing a timeline.
#[derive(Debug, Clone)]
pub struct StartupProfile {
    /// Events sorted by timestamp, each with `duration` set.
    pub events: Vec<Event>,

    pub phases: Vec<Phase>,

    pub total_duration: TimeDelta,

    /// Timestamp of the earliest event.
    pub start_time: Option<DateTime<Utc>>,

    /// Readiness boundary, or the last event when none was observed.
    pub end_time: Option<DateTime<Utc>>,

    /// True when no readiness event was observed and `end_time` fell back
    /// to the last event.
    pub degraded: bool,

    pub extensions: Vec<ExtensionTiming>,
    pub init_scripts: Vec<ScriptTiming>,
    pub bg_workers: Vec<WorkerTiming>,
}

impl Default for StartupProfile {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            phases: Vec::new(),
            total_duration: TimeDelta::zero(),
            start_time: None,
            end_time: None,
            degraded: false,
            extensions: Vec::new(),
            init_scripts: Vec::new(),
            bg_workers: Vec::new(),
        }
    }
}

impl StartupProfile {
    /// Returns true if the profile holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The readiness event, if one was observed.
    pub fn ready_event(&self) -> Option<&Event> {
        self.events.iter().find(|e| e.marks_ready)
    }
}
