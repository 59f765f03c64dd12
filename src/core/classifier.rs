// pg-startup-profiler - core/classifier.rs
//
// Adapts raw (line, fallback timestamp) pairs into log events.
// Holds no state of its own beyond the rule set it borrows; performs no I/O.

use crate::core::model::{Event, EventSource};
use crate::core::rules::Rules;
use chrono::{DateTime, Utc};
use std::sync::mpsc;

/// Classifies lines with a borrowed rule set and emits at most one event
/// per line.
pub struct LineClassifier<'r> {
    rules: &'r mut Rules,
}

impl<'r> LineClassifier<'r> {
    pub fn new(rules: &'r mut Rules) -> Self {
        Self { rules }
    }

    /// Classify one line. Calls the rule set exactly once.
    pub fn classify(&mut self, line: &str, fallback: DateTime<Utc>) -> Option<Event> {
        let m = self.rules.match_line(line, fallback)?;
        Some(Event {
            source: EventSource::Log,
            name: m.pattern.name.clone(),
            timestamp: m.timestamp,
            duration: None,
            details: m.line,
            captures: m.captures,
            marks_ready: m.pattern.marks_ready,
        })
    }

    /// Classify one line and push the resulting event, if any, onto `events`.
    ///
    /// Returns whether an event was delivered. A closed receiver drops the
    /// event and returns `false`.
    pub fn parse_line(
        &mut self,
        line: &str,
        fallback: DateTime<Utc>,
        events: &mpsc::Sender<Event>,
    ) -> bool {
        match self.classify(line, fallback) {
            Some(event) => match events.send(event) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!("Event receiver closed; dropping classified event");
                    false
                }
            },
            None => false,
        }
    }

    /// Clear the borrowed rule set's occurrence counters.
    pub fn reset(&mut self) {
        self.rules.reset();
    }
}
