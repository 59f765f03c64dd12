// pg-startup-profiler - app/session.rs
//
// Profiling session: one reader thread feeds lines through a bounded queue
// to one consumer that classifies them and owns the timeline.
//
// Architecture:
//   - The producer reads any `BufRead` (file or stdin), stamps each line
//     with a fallback timestamp, and pushes it onto a `sync_channel` of
//     `LINE_QUEUE_CAPACITY`. A full queue blocks the reader.
//   - The consumer wakes at least every `SESSION_POLL_INTERVAL_MS` to check
//     the deadline and the caller's cancel flag.
//   - The session ends at the first readiness event, end of input, the
//     deadline, or cancellation. Whatever was collected is finalized.
//   - On exit the consumer raises a stop flag and drops the receiver. The
//     reader is detached; it exits on its next line, or never if it is
//     blocked on an idle stdin, which ends with the process.
//
// Fallback clocks:
//   - `Wall`: `Utc::now()` at read time. For live input.
//   - `Replay`: the last timestamp parsed from a line. Lines that precede
//     the first parsable timestamp are held and released with it, so
//     captured logs keep their relative order.

use crate::core::classifier::LineClassifier;
use crate::core::model::{StartupProfile, TimestampRule, TrailingScriptPolicy};
use crate::core::rules::Rules;
use crate::core::source::SourceRecord;
use crate::core::timeline::{FinalizeOptions, Timeline};
use crate::util::constants::{LINE_QUEUE_CAPACITY, REPLAY_PENDING_LIMIT, SESSION_POLL_INTERVAL_MS};
use crate::util::error::SessionError;
use chrono::{DateTime, Utc};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where fallback timestamps come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineClock {
    #[default]
    Wall,
    Replay,
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long to wait for readiness.
    pub timeout: Duration,

    pub trailing_scripts: TrailingScriptPolicy,

    /// Record a synthetic `process_start` event with this label when the
    /// session starts (wall clock) or on the first line (replay clock).
    pub mark_start: Option<String>,

    pub clock: LineClock,

    /// Set by the caller to end the session early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::util::constants::DEFAULT_TIMEOUT_SECS),
            trailing_scripts: TrailingScriptPolicy::Drop,
            mark_start: None,
            clock: LineClock::Wall,
            cancel: None,
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Ready,
    EndOfInput,
    TimedOut,
    Cancelled,
}

/// Finalized profile plus session bookkeeping.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub profile: StartupProfile,
    pub lines_read: u64,
    pub lines_matched: u64,
    pub elapsed: Duration,
}

impl SessionReport {
    /// Turn a session without readiness into an error.
    pub fn require_ready(self) -> Result<Self, SessionError> {
        if self.outcome == SessionOutcome::Ready && !self.profile.degraded {
            Ok(self)
        } else {
            Err(SessionError::NotReady {
                waited: self.elapsed,
            })
        }
    }
}

/// One line handed from the reader to the classifier.
struct QueuedLine {
    line: String,
    fallback: DateTime<Utc>,
}

/// Run one profiling session over `reader`.
///
/// Occurrence counters in `rules` carry over from earlier sessions; call
/// `Rules::reset` first when reusing a rule set.
pub fn run<R>(rules: &mut Rules, reader: R, options: &SessionOptions) -> SessionReport
where
    R: BufRead + Send + 'static,
{
    let started = Instant::now();
    let wall_start = Utc::now();
    let deadline = started + options.timeout;
    let poll = Duration::from_millis(SESSION_POLL_INTERVAL_MS);

    let (tx, rx) = mpsc::sync_channel::<QueuedLine>(LINE_QUEUE_CAPACITY);
    let stop = Arc::new(AtomicBool::new(false));

    let replay_rule = match options.clock {
        LineClock::Wall => None,
        LineClock::Replay => Some(rules.timestamp_rule().cloned()),
    };
    {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || read_lines(reader, tx, stop, replay_rule));
    }

    let mut timeline = Timeline::with_options(FinalizeOptions {
        trailing_scripts: options.trailing_scripts,
        phase_boundaries: rules.phase_boundaries().to_vec(),
    });
    let mut classifier = LineClassifier::new(rules);

    let mut pending_start = options.mark_start.clone();
    if options.clock == LineClock::Wall {
        if let Some(label) = pending_start.take() {
            let start = SourceRecord::ProcessStart {
                at: wall_start,
                label,
            };
            push_record(&mut timeline, &mut classifier, start);
        }
    }

    let mut lines_read: u64 = 0;
    let mut lines_matched: u64 = 0;

    tracing::info!(
        timeout_secs = options.timeout.as_secs(),
        clock = ?options.clock,
        "Profiling session started"
    );

    let outcome = loop {
        if options
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            break SessionOutcome::Cancelled;
        }

        let now = Instant::now();
        if now >= deadline {
            break SessionOutcome::TimedOut;
        }

        match rx.recv_timeout(poll.min(deadline - now)) {
            Ok(QueuedLine { line, fallback }) => {
                lines_read += 1;

                if let Some(label) = pending_start.take() {
                    let start = SourceRecord::ProcessStart { at: fallback, label };
                    push_record(&mut timeline, &mut classifier, start);
                }

                let ready = push_record(
                    &mut timeline,
                    &mut classifier,
                    SourceRecord::LogLine {
                        line,
                        observed_at: fallback,
                    },
                );
                match ready {
                    Some(true) => {
                        lines_matched += 1;
                        break SessionOutcome::Ready;
                    }
                    Some(false) => lines_matched += 1,
                    None => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break SessionOutcome::EndOfInput,
        }
    };

    stop.store(true, Ordering::SeqCst);
    drop(rx);

    if timeline.is_empty() {
        tracing::warn!(lines = lines_read, "No startup events recognised");
    }
    tracing::debug!(
        state = ?timeline.state(),
        events = timeline.len(),
        "Finalizing timeline"
    );
    let profile = timeline.into_profile();
    let elapsed = started.elapsed();

    match outcome {
        SessionOutcome::Ready => tracing::info!(
            total_ms = profile.total_duration.num_milliseconds(),
            lines = lines_read,
            events = profile.events.len(),
            "Readiness observed"
        ),
        SessionOutcome::EndOfInput => tracing::info!(
            lines = lines_read,
            events = profile.events.len(),
            "Input ended before readiness"
        ),
        SessionOutcome::TimedOut => tracing::warn!(
            waited_secs = elapsed.as_secs_f64(),
            lines = lines_read,
            "Timed out waiting for readiness"
        ),
        SessionOutcome::Cancelled => tracing::info!(lines = lines_read, "Session cancelled"),
    }

    SessionReport {
        outcome,
        profile,
        lines_read,
        lines_matched,
        elapsed,
    }
}

/// Profile two captures with one rule set, resetting its occurrence
/// counters before each run.
pub fn run_pair<A, B>(
    rules: &mut Rules,
    baseline: A,
    candidate: B,
    options: &SessionOptions,
) -> (SessionReport, SessionReport)
where
    A: BufRead + Send + 'static,
    B: BufRead + Send + 'static,
{
    rules.reset();
    let first = run(rules, baseline, options);
    rules.reset();
    let second = run(rules, candidate, options);
    (first, second)
}

/// Translate a record into the timeline. Returns the readiness flag of the
/// recorded event, or `None` when the record was dropped as noise.
fn push_record(
    timeline: &mut Timeline,
    classifier: &mut LineClassifier<'_>,
    record: SourceRecord,
) -> Option<bool> {
    let event = record.into_event(classifier)?;
    let ready = event.marks_ready;
    timeline.add_event(event);
    Some(ready)
}

// =============================================================================
// Producer
// =============================================================================

/// Reader thread body. Exits at end of input, on a read error, when the
/// stop flag is raised, or when the consumer drops the receiver.
fn read_lines<R: BufRead>(
    mut reader: R,
    tx: mpsc::SyncSender<QueuedLine>,
    stop: Arc<AtomicBool>,
    replay: Option<Option<TimestampRule>>,
) {
    let mut clock = FallbackClock::new(replay);
    let mut buf = Vec::new();

    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("Line reader stopped");
            return;
        }

        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Input read failed; treating as end of input");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();

        for queued in clock.stamp(line) {
            if tx.send(queued).is_err() {
                return;
            }
        }
    }

    for queued in clock.drain() {
        if tx.send(queued).is_err() {
            return;
        }
    }
    tracing::debug!("Line reader reached end of input");
}

/// Assigns fallback timestamps on the producer side.
struct FallbackClock {
    /// `None` for the wall clock; `Some(rule)` for replay.
    replay: Option<Option<TimestampRule>>,
    last_seen: Option<DateTime<Utc>>,
    pending: Vec<String>,
}

impl FallbackClock {
    fn new(replay: Option<Option<TimestampRule>>) -> Self {
        Self {
            replay,
            last_seen: None,
            pending: Vec::new(),
        }
    }

    /// Stamp one line. May release held lines, or hold this one.
    fn stamp(&mut self, line: String) -> Vec<QueuedLine> {
        let rule = match &self.replay {
            None | Some(None) => {
                return vec![QueuedLine {
                    line,
                    fallback: Utc::now(),
                }]
            }
            Some(Some(rule)) => rule,
        };

        if let Some(ts) = rule.extract(&line) {
            self.last_seen = Some(ts);
        }

        match self.last_seen {
            Some(ts) => {
                let mut out: Vec<QueuedLine> = self
                    .pending
                    .drain(..)
                    .map(|held| QueuedLine {
                        line: held,
                        fallback: ts,
                    })
                    .collect();
                out.push(QueuedLine { line, fallback: ts });
                out
            }
            None => {
                self.pending.push(line);
                if self.pending.len() == REPLAY_PENDING_LIMIT {
                    tracing::warn!(
                        held = self.pending.len(),
                        "No line timestamp yet; still holding leading lines"
                    );
                }
                Vec::new()
            }
        }
    }

    /// Release everything still held, stamped with the wall clock. Only
    /// called at end of input, when no line timestamp ever appeared.
    fn drain(&mut self) -> Vec<QueuedLine> {
        let now = Utc::now();
        self.pending
            .drain(..)
            .map(|line| QueuedLine { line, fallback: now })
            .collect()
    }
}
