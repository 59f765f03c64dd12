// pg-startup-profiler - core/source.rs
//
// Closed set of event producers. Each variant carries a source's native
// record and translates it into the common `Event` shape, so the timeline
// never branches on where an event came from.

use crate::core::classifier::LineClassifier;
use crate::core::model::{Event, EventSource};
use crate::util::constants;
use chrono::{DateTime, Utc};

/// A native record from one of the supported event sources.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    /// The profiled process (or its container) was started.
    ProcessStart { at: DateTime<Utc>, label: String },

    /// A raw log line with the wall-clock instant it was observed.
    LogLine {
        line: String,
        observed_at: DateTime<Utc>,
    },

    /// Kernel exec trace record.
    Exec {
        at: DateTime<Utc>,
        pid: u32,
        comm: String,
        args: String,
    },

    /// Kernel file-open trace record.
    Open {
        at: DateTime<Utc>,
        pid: u32,
        path: String,
    },
}

impl SourceRecord {
    /// Translate the record into an event.
    ///
    /// Log lines go through the classifier and may be dropped as noise;
    /// every other record always produces exactly one event.
    pub fn into_event(self, classifier: &mut LineClassifier<'_>) -> Option<Event> {
        match self {
            SourceRecord::ProcessStart { at, label } => {
                let mut event = Event::new(EventSource::Process, constants::EVENT_PROCESS_START, at);
                event.details = label;
                Some(event)
            }
            SourceRecord::LogLine { line, observed_at } => {
                classifier.classify(&line, observed_at)
            }
            SourceRecord::Exec { at, pid, comm, args } => {
                let mut event = Event::new(EventSource::Exec, comm.clone(), at);
                event.details = format!("pid={pid} {comm} {args}").trim_end().to_string();
                event.captures.insert("pid".to_string(), pid.to_string());
                event.captures.insert("comm".to_string(), comm);
                if !args.is_empty() {
                    event.captures.insert("args".to_string(), args);
                }
                Some(event)
            }
            SourceRecord::Open { at, pid, path } => {
                let mut event = Event::new(EventSource::Open, path.clone(), at);
                event.details = format!("pid={pid} {path}");
                event.captures.insert("pid".to_string(), pid.to_string());
                event.captures.insert("path".to_string(), path);
                Some(event)
            }
        }
    }
}
