// pg-startup-profiler - core/timeline.rs
//
// Timeline aggregation: accumulate events from any source in arrival order,
// then seal them into a `StartupProfile` with one finalize pass.
//
// Lifecycle: accumulating -> finalized. Events added after sealing are
// ignored with a warning. `finalize` is idempotent: the profile is built by
// a pure function over the collected events and cached on first call.

use crate::core::model::{
    Event, ExtensionTiming, Phase, PhaseBoundary, ScriptTiming, StartupProfile,
    TrailingScriptPolicy, WorkerTiming,
};
use crate::util::constants;
use chrono::{DateTime, TimeDelta, Utc};

/// Knobs for the finalize pass.
#[derive(Debug, Clone, Default)]
pub struct FinalizeOptions {
    /// How the last init script is treated.
    pub trailing_scripts: TrailingScriptPolicy,

    /// Phase boundaries; empty means a single `Total` phase.
    pub phase_boundaries: Vec<PhaseBoundary>,
}

/// Which half of the lifecycle a timeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineState {
    Accumulating,
    Finalized,
}

/// Event accumulator that seals into a `StartupProfile`.
///
/// Single writer: `add_event` is called from one consumer, so no locking.
#[derive(Debug, Default)]
pub struct Timeline {
    events: Vec<Event>,
    options: FinalizeOptions,
    sealed: Option<StartupProfile>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: FinalizeOptions) -> Self {
        Self {
            events: Vec::new(),
            options,
            sealed: None,
        }
    }

    pub fn state(&self) -> TimelineState {
        if self.sealed.is_some() {
            TimelineState::Finalized
        } else {
            TimelineState::Accumulating
        }
    }

    /// Append an event. No validation and no ordering requirement.
    ///
    /// Returns false, leaving the timeline untouched, once it is sealed.
    pub fn add_event(&mut self, event: Event) -> bool {
        if self.sealed.is_some() {
            tracing::warn!(event = %event.name, "Timeline already finalized; event ignored");
            return false;
        }
        self.events.push(event);
        true
    }

    /// Number of events collected (or sealed).
    pub fn len(&self) -> usize {
        match &self.sealed {
            Some(profile) => profile.events.len(),
            None => self.events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seal the timeline and return its profile. Later calls return the
    /// same profile.
    pub fn finalize(&mut self) -> &StartupProfile {
        let events = &mut self.events;
        let options = &self.options;
        self.sealed
            .get_or_insert_with(|| build_profile(std::mem::take(events), options))
    }

    /// Finalize if needed and hand over the profile.
    pub fn into_profile(mut self) -> StartupProfile {
        self.finalize();
        self.sealed.take().unwrap_or_default()
    }
}

// =============================================================================
// Finalize pass
// =============================================================================

/// Build a profile from an unordered set of events.
///
/// Never fails: no events yields an empty profile, and no readiness event
/// yields a degraded one whose end falls back to the last event.
pub fn build_profile(mut events: Vec<Event>, options: &FinalizeOptions) -> StartupProfile {
    if events.is_empty() {
        return StartupProfile::default();
    }

    // Stable: equal timestamps keep arrival order.
    events.sort_by_key(|e| e.timestamp);

    let start = events[0].timestamp;
    let last = events[events.len() - 1].timestamp;

    let ready_at = events.iter().find(|e| e.marks_ready).map(|e| e.timestamp);
    let degraded = ready_at.is_none();
    let end = ready_at.unwrap_or(last);
    let total_duration = end - start;

    for event in &mut events {
        event.duration = Some(event.timestamp - start);
    }

    let extensions = extract_extensions(&events);
    let init_scripts = extract_init_scripts(&events, end, options.trailing_scripts);
    let bg_workers = extract_bg_workers(&events);
    let phases = build_phases(&events, start, end, total_duration, &options.phase_boundaries);

    if degraded {
        tracing::warn!(
            events = events.len(),
            "No readiness event observed; timeline end falls back to the last event"
        );
    }

    tracing::debug!(
        events = events.len(),
        total_ms = total_duration.num_milliseconds(),
        degraded,
        extensions = extensions.len(),
        init_scripts = init_scripts.len(),
        bg_workers = bg_workers.len(),
        phases = phases.len(),
        "Timeline finalized"
    );

    StartupProfile {
        events,
        phases,
        total_duration,
        start_time: Some(start),
        end_time: Some(end),
        degraded,
        extensions,
        init_scripts,
        bg_workers,
    }
}

/// `extension_load` events carrying an `extension` capture. A repeated
/// extension keeps its first position but takes the latest offset.
fn extract_extensions(events: &[Event]) -> Vec<ExtensionTiming> {
    let mut out: Vec<ExtensionTiming> = Vec::new();
    for event in events {
        if event.name != constants::EVENT_EXTENSION_LOAD {
            continue;
        }
        let Some(name) = event.captures.get(constants::CAPTURE_EXTENSION) else {
            continue;
        };
        let load_time = event.offset();
        match out.iter_mut().find(|x| &x.name == name) {
            Some(existing) => existing.load_time = load_time,
            None => out.push(ExtensionTiming {
                name: name.clone(),
                load_time,
            }),
        }
    }
    out
}

/// Script durations measured as the gap to the next `migration_file`
/// boundary.
///
/// Known limitation: the last script has no following boundary, so under
/// `TrailingScriptPolicy::Drop` it gets no entry. `CloseAtReady` closes it
/// at `end` instead, provided it started before `end`.
fn extract_init_scripts(
    events: &[Event],
    end: DateTime<Utc>,
    policy: TrailingScriptPolicy,
) -> Vec<ScriptTiming> {
    let mut out = Vec::new();
    let mut previous: Option<(&str, DateTime<Utc>)> = None;

    for event in events {
        if event.name != constants::EVENT_MIGRATION_FILE {
            continue;
        }
        let Some(file) = event.captures.get(constants::CAPTURE_FILE) else {
            continue;
        };
        if let Some((path, started)) = previous {
            out.push(ScriptTiming {
                path: path.to_string(),
                duration: event.timestamp - started,
            });
        }
        previous = Some((file.as_str(), event.timestamp));
    }

    if let (TrailingScriptPolicy::CloseAtReady, Some((path, started))) = (policy, previous) {
        if started <= end {
            out.push(ScriptTiming {
                path: path.to_string(),
                duration: end - started,
            });
        }
    }

    out
}

/// `bgworker_start` events carrying a `worker` capture.
fn extract_bg_workers(events: &[Event]) -> Vec<WorkerTiming> {
    let mut out: Vec<WorkerTiming> = Vec::new();
    for event in events {
        if event.name != constants::EVENT_BGWORKER_START {
            continue;
        }
        let Some(name) = event.captures.get(constants::CAPTURE_WORKER) else {
            continue;
        };
        let started_at = event.offset();
        match out.iter_mut().find(|w| &w.name == name) {
            Some(existing) => existing.started_at = started_at,
            None => out.push(WorkerTiming {
                name: name.clone(),
                started_at,
            }),
        }
    }
    out
}

/// Split `[start, end]` at the first occurrence of each configured boundary
/// event. Falls back to one `Total` phase when no boundary lands inside the
/// window or the window is empty. Phase durations always partition the total.
fn build_phases(
    events: &[Event],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    total: TimeDelta,
    boundaries: &[PhaseBoundary],
) -> Vec<Phase> {
    let total_phase = vec![Phase {
        name: constants::PHASE_TOTAL.to_string(),
        start,
        end,
        duration: total,
        percent: 100.0,
    }];

    if boundaries.is_empty() || total <= TimeDelta::zero() {
        return total_phase;
    }

    let mut marks: Vec<(&str, DateTime<Utc>)> = boundaries
        .iter()
        .filter_map(|b| {
            events
                .iter()
                .find(|e| e.name == b.starts_at && e.timestamp >= start && e.timestamp <= end)
                .map(|e| (b.name.as_str(), e.timestamp))
        })
        .collect();

    if marks.is_empty() {
        return total_phase;
    }
    marks.sort_by_key(|(_, ts)| *ts);

    let mut phases = Vec::with_capacity(marks.len() + 1);
    let mut push = |name: &str, from: DateTime<Utc>, to: DateTime<Utc>| {
        let duration = to - from;
        phases.push(Phase {
            name: name.to_string(),
            start: from,
            end: to,
            duration,
            percent: percent_of(duration, total),
        });
    };

    if marks[0].1 > start {
        push(constants::PHASE_STARTUP, start, marks[0].1);
    }
    for (i, &(name, from)) in marks.iter().enumerate() {
        let to = marks.get(i + 1).map_or(end, |next| next.1);
        push(name, from, to);
    }

    phases
}

fn percent_of(part: TimeDelta, whole: TimeDelta) -> f64 {
    let whole = delta_secs(whole);
    if whole <= 0.0 {
        return 0.0;
    }
    delta_secs(part) / whole * 100.0
}

fn delta_secs(d: TimeDelta) -> f64 {
    match d.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => d.num_milliseconds() as f64 / 1e3,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::EventSource;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 30, 13, 18, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        t0() + TimeDelta::milliseconds(ms)
    }

    fn log(name: &str, ms: i64) -> Event {
        Event::new(EventSource::Log, name, at_ms(ms))
    }

    fn ms(n: i64) -> TimeDelta {
        TimeDelta::milliseconds(n)
    }

    #[test]
    fn test_empty_timeline_stays_zero() {
        let mut tl = Timeline::new();
        let profile = tl.finalize();
        assert!(profile.is_empty());
        assert_eq!(profile.total_duration, TimeDelta::zero());
        assert!(profile.start_time.is_none());
        assert!(profile.end_time.is_none());
        assert!(profile.phases.is_empty());
        assert!(!profile.degraded);
    }

    #[test]
    fn test_single_event_is_total_zero_with_one_phase() {
        let mut tl = Timeline::new();
        tl.add_event(log("container_start", 0));
        let profile = tl.finalize();

        assert_eq!(profile.total_duration, TimeDelta::zero());
        assert_eq!(profile.phases.len(), 1);
        assert_eq!(profile.phases[0].name, "Total");
        assert_eq!(profile.phases[0].percent, 100.0);
    }

    #[test]
    fn test_readiness_scenario() {
        let mut tl = Timeline::new();
        tl.add_event(Event::new(EventSource::Process, "container_start", at_ms(0)));
        tl.add_event(log("migration_file", 2000).with_capture("file", "a"));
        tl.add_event(log("migration_file", 3500).with_capture("file", "b"));
        tl.add_event(log("ready", 5000).ready());

        let profile = tl.finalize();
        assert_eq!(profile.total_duration, ms(5000));
        assert!(!profile.degraded);
        assert_eq!(
            profile.init_scripts,
            vec![ScriptTiming {
                path: "a".to_string(),
                duration: ms(1500),
            }]
        );
        assert!(profile.init_scripts.iter().all(|s| s.path != "b"));
    }

    #[test]
    fn test_trailing_script_closed_at_ready_when_requested() {
        let mut tl = Timeline::with_options(FinalizeOptions {
            trailing_scripts: TrailingScriptPolicy::CloseAtReady,
            ..Default::default()
        });
        tl.add_event(log("container_start", 0));
        tl.add_event(log("migration_file", 2000).with_capture("file", "a"));
        tl.add_event(log("migration_file", 3500).with_capture("file", "b"));
        tl.add_event(log("ready", 5000).ready());

        let profile = tl.finalize();
        assert_eq!(profile.init_scripts.len(), 2);
        assert_eq!(profile.init_scripts[1].path, "b");
        assert_eq!(profile.init_scripts[1].duration, ms(1500));
    }

    #[test]
    fn test_no_readiness_event_is_degraded() {
        let mut tl = Timeline::new();
        tl.add_event(log("a", 0));
        tl.add_event(log("b", 1000));

        let profile = tl.finalize();
        assert!(profile.degraded);
        assert_eq!(profile.end_time, Some(at_ms(1000)));
        assert_eq!(profile.total_duration, ms(1000));
    }

    #[test]
    fn test_out_of_order_events_are_sorted_with_offsets() {
        let mut tl = Timeline::new();
        for ms in [900, 100, 500, 300, 700] {
            tl.add_event(log("tick", ms));
        }
        tl.add_event(log("ready", 1200).ready());

        let profile = tl.finalize();
        let start = profile.start_time.unwrap();
        assert_eq!(start, at_ms(100));
        assert!(profile
            .events
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        for e in &profile.events {
            assert_eq!(e.duration, Some(e.timestamp - start));
        }
        assert_eq!(profile.total_duration, profile.end_time.unwrap() - start);
    }

    #[test]
    fn test_end_is_earliest_readiness_event() {
        let mut tl = Timeline::new();
        tl.add_event(log("late_ready", 4000).ready());
        tl.add_event(log("start", 0));
        tl.add_event(log("early_ready", 2500).ready());
        tl.add_event(log("after", 6000));

        let profile = tl.finalize();
        assert_eq!(profile.end_time, Some(at_ms(2500)));
        assert_eq!(profile.total_duration, ms(2500));
        assert_eq!(profile.ready_event().map(|e| e.name.as_str()), Some("early_ready"));
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let mut tl = Timeline::new();
        tl.add_event(log("first", 100));
        tl.add_event(log("second", 100));
        tl.add_event(log("third", 100));

        let names: Vec<&str> = tl.finalize().events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_extensions_last_write_wins() {
        let mut tl = Timeline::new();
        tl.add_event(log("start", 0));
        tl.add_event(log("extension_load", 400).with_capture("extension", "pg_cron"));
        tl.add_event(log("extension_load", 200).with_capture("extension", "pgsodium"));
        tl.add_event(log("extension_load", 900).with_capture("extension", "pg_cron"));
        tl.add_event(log("extension_load", 950));

        let profile = tl.finalize();
        assert_eq!(
            profile.extensions,
            vec![
                ExtensionTiming {
                    name: "pgsodium".to_string(),
                    load_time: ms(200),
                },
                ExtensionTiming {
                    name: "pg_cron".to_string(),
                    load_time: ms(900),
                },
            ]
        );
    }

    #[test]
    fn test_bg_workers_recorded_with_offsets() {
        let mut tl = Timeline::new();
        tl.add_event(log("start", 0));
        tl.add_event(log("bgworker_start", 1500).with_capture("worker", "pg_cron launcher"));
        tl.add_event(log("bgworker_start", 1700).with_capture("worker", "logical replication launcher"));

        let profile = tl.finalize();
        assert_eq!(profile.bg_workers.len(), 2);
        assert_eq!(profile.bg_workers[0].name, "pg_cron launcher");
        assert_eq!(profile.bg_workers[0].started_at, ms(1500));
        assert_eq!(profile.bg_workers[1].started_at, ms(1700));
    }

    #[test]
    fn test_phase_boundaries_partition_total() {
        let mut tl = Timeline::with_options(FinalizeOptions {
            phase_boundaries: vec![
                PhaseBoundary {
                    name: "Init scripts".to_string(),
                    starts_at: "migration_file".to_string(),
                },
                PhaseBoundary {
                    name: "initdb".to_string(),
                    starts_at: "initdb_start".to_string(),
                },
                PhaseBoundary {
                    name: "Never seen".to_string(),
                    starts_at: "missing".to_string(),
                },
            ],
            ..Default::default()
        });
        tl.add_event(log("container_start", 0));
        tl.add_event(log("initdb_start", 1000));
        tl.add_event(log("migration_file", 3000).with_capture("file", "a"));
        tl.add_event(log("migration_file", 3500).with_capture("file", "b"));
        tl.add_event(log("ready", 4000).ready());

        let profile = tl.finalize();
        let names: Vec<&str> = profile.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Startup", "initdb", "Init scripts"]);
        assert_eq!(profile.phases[0].duration, ms(1000));
        assert_eq!(profile.phases[1].duration, ms(2000));
        assert_eq!(profile.phases[2].duration, ms(1000));

        let pct: f64 = profile.phases.iter().map(|p| p.percent).sum();
        assert!((pct - 100.0).abs() < 1e-9, "phases sum to {pct}");
        let dur = profile
            .phases
            .iter()
            .fold(TimeDelta::zero(), |acc, p| acc + p.duration);
        assert_eq!(dur, profile.total_duration);
    }

    #[test]
    fn test_boundary_after_ready_falls_back_to_total() {
        let mut tl = Timeline::with_options(FinalizeOptions {
            phase_boundaries: vec![PhaseBoundary {
                name: "Late".to_string(),
                starts_at: "late".to_string(),
            }],
            ..Default::default()
        });
        tl.add_event(log("start", 0));
        tl.add_event(log("ready", 1000).ready());
        tl.add_event(log("late", 2000));

        let profile = tl.finalize();
        assert_eq!(profile.phases.len(), 1);
        assert_eq!(profile.phases[0].name, "Total");
    }

    #[test]
    fn test_finalize_is_idempotent_and_seals() {
        let mut tl = Timeline::new();
        tl.add_event(log("start", 0));
        tl.add_event(log("ready", 3000).ready());
        assert_eq!(tl.state(), TimelineState::Accumulating);

        let first_total = tl.finalize().total_duration;
        assert_eq!(tl.state(), TimelineState::Finalized);

        assert!(!tl.add_event(log("late", 9000)));
        let second = tl.finalize();
        assert_eq!(second.total_duration, first_total);
        assert_eq!(second.events.len(), 2);
        assert_eq!(tl.len(), 2);
    }

    #[test]
    fn test_build_profile_is_pure_over_events() {
        let events = vec![log("b", 700), log("a", 0), log("ready", 1000).ready()];
        let options = FinalizeOptions::default();
        let p1 = build_profile(events.clone(), &options);
        let p2 = build_profile(events, &options);
        assert_eq!(p1.events, p2.events);
        assert_eq!(p1.total_duration, p2.total_duration);
        assert_eq!(p1.phases, p2.phases);
    }

    #[test]
    fn test_into_profile_finalizes() {
        let mut tl = Timeline::new();
        tl.add_event(log("only", 0));
        let profile = tl.into_profile();
        assert_eq!(profile.events.len(), 1);
        assert_eq!(profile.events[0].duration, Some(TimeDelta::zero()));
    }
}
