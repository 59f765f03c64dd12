// pg-startup-profiler - core/compare.rs
//
// Side-by-side comparison of two finalized startup profiles.

use crate::core::model::StartupProfile;
use chrono::TimeDelta;

/// Per-extension load offsets in both runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionDelta {
    pub name: String,
    pub baseline: Option<TimeDelta>,
    pub candidate: Option<TimeDelta>,
}

impl ExtensionDelta {
    /// Candidate minus baseline, when the extension loaded in both runs.
    pub fn delta(&self) -> Option<TimeDelta> {
        Some(self.candidate? - self.baseline?)
    }
}

/// Result of comparing a baseline profile against a candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileComparison {
    pub baseline_total: TimeDelta,
    pub candidate_total: TimeDelta,
    pub baseline_degraded: bool,
    pub candidate_degraded: bool,

    /// Baseline extensions in load order, then candidate-only extensions.
    pub extensions: Vec<ExtensionDelta>,
}

impl ProfileComparison {
    /// Candidate total minus baseline total. Negative means faster.
    pub fn delta(&self) -> TimeDelta {
        self.candidate_total - self.baseline_total
    }

    /// Delta as a percentage of the baseline total. `None` when the
    /// baseline total is zero.
    pub fn delta_percent(&self) -> Option<f64> {
        let base = self.baseline_total.num_milliseconds();
        if base == 0 {
            return None;
        }
        Some(self.delta().num_milliseconds() as f64 / base as f64 * 100.0)
    }
}

/// Compare two profiles.
pub fn compare_profiles(baseline: &StartupProfile, candidate: &StartupProfile) -> ProfileComparison {
    let mut extensions: Vec<ExtensionDelta> = baseline
        .extensions
        .iter()
        .map(|ext| ExtensionDelta {
            name: ext.name.clone(),
            baseline: Some(ext.load_time),
            candidate: candidate
                .extensions
                .iter()
                .find(|c| c.name == ext.name)
                .map(|c| c.load_time),
        })
        .collect();

    for ext in &candidate.extensions {
        if !extensions.iter().any(|e| e.name == ext.name) {
            extensions.push(ExtensionDelta {
                name: ext.name.clone(),
                baseline: None,
                candidate: Some(ext.load_time),
            });
        }
    }

    ProfileComparison {
        baseline_total: baseline.total_duration,
        candidate_total: candidate.total_duration,
        baseline_degraded: baseline.degraded,
        candidate_degraded: candidate.degraded,
        extensions,
    }
}
