// pg-startup-profiler - core/rules.rs
//
// Rules document loading, validation, and occurrence-gated line matching.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::rules_mgr which feeds content here.
//
// Occurrence counters are keyed by the literal regex source text. Two
// patterns with the same text share one counter, which is how a document
// says "the 1st vs. the 2nd time this line appears". Patterns meant to count
// independently must use distinguishable regex text (e.g. `ready` vs.
// `(?:ready)`), even when the two are functionally equivalent.

use crate::core::model::{Match, Pattern, PhaseBoundary, TimestampRule};
use crate::util::constants;
use crate::util::error::ConfigError;
use crate::util::logging::preview;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw rules document as deserialized from TOML.
/// Validated and compiled into `Rules` for runtime use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesDefinition {
    pub patterns: Vec<PatternDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseBoundary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDef {
    pub name: String,
    pub regex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub repeat: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub marks_ready: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub capture: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampDef {
    pub regex: String,
    #[serde(alias = "format")]
    pub layout: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Parse a TOML string into a `RulesDefinition`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_rules_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<RulesDefinition, ConfigError> {
    toml::from_str(toml_content).map_err(|e| ConfigError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

// =============================================================================
// Rules (compiled, with occurrence state)
// =============================================================================

/// The loaded rule set: compiled patterns, the optional timestamp rule,
/// phase boundaries, and the per-regex occurrence counters.
///
/// `match_line` mutates the counters and takes `&mut self`; callers that
/// classify concurrently must give each classifier its own `Rules`.
#[derive(Debug, Clone)]
pub struct Rules {
    patterns: Vec<Pattern>,
    timestamp: Option<TimestampRule>,
    phases: Vec<PhaseBoundary>,
    /// Matches seen so far, keyed by literal regex source text.
    regex_counts: HashMap<String, u32>,
}

impl Rules {
    /// Parse, validate, and compile a TOML rules document.
    pub fn from_toml(toml_content: &str, source_path: &Path) -> Result<Self, ConfigError> {
        let def = parse_rules_toml(toml_content, source_path)?;
        Self::from_definition(def)
    }

    /// Validate a `RulesDefinition` and compile it.
    ///
    /// Validates:
    /// - pattern names are present and unique
    /// - every regex compiles and is within size limits
    /// - the timestamp regex has a capturing group and a layout
    ///
    /// A missing or zero `occurrence` is normalised to 1.
    pub fn from_definition(def: RulesDefinition) -> Result<Self, ConfigError> {
        if def.patterns.len() > constants::MAX_PATTERNS {
            return Err(ConfigError::TooManyPatterns {
                count: def.patterns.len(),
                max: constants::MAX_PATTERNS,
            });
        }

        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut patterns = Vec::with_capacity(def.patterns.len());

        for p in &def.patterns {
            if p.name.is_empty() {
                return Err(ConfigError::MissingField {
                    pattern: "(unnamed)".to_string(),
                    field: "patterns.name",
                });
            }
            if p.regex.is_empty() {
                return Err(ConfigError::MissingField {
                    pattern: p.name.clone(),
                    field: "patterns.regex",
                });
            }
            if !seen_names.insert(p.name.as_str()) {
                return Err(ConfigError::DuplicatePattern {
                    name: p.name.clone(),
                });
            }

            let regex = compile_regex(&p.name, "patterns.regex", &p.regex)?;

            let occurrence = match p.occurrence {
                None => constants::DEFAULT_OCCURRENCE,
                Some(0) => {
                    tracing::warn!(
                        pattern = %p.name,
                        "occurrence = 0 can never fire; treating as 1"
                    );
                    constants::DEFAULT_OCCURRENCE
                }
                Some(n) => n,
            };

            if p.capture && regex.capture_names().flatten().next().is_none() {
                tracing::warn!(
                    pattern = %p.name,
                    "Pattern requests capture but its regex has no named groups"
                );
            }

            patterns.push(Pattern {
                name: p.name.clone(),
                regex,
                occurrence,
                repeat: p.repeat,
                marks_ready: p.marks_ready,
                capture: p.capture,
            });
        }

        let timestamp = match def.timestamp {
            Some(ts) => Some(compile_timestamp(ts)?),
            None => None,
        };

        for phase in &def.phases {
            if phase.name.is_empty() {
                return Err(ConfigError::MissingField {
                    pattern: "(phase)".to_string(),
                    field: "phases.name",
                });
            }
            if phase.starts_at.is_empty() {
                return Err(ConfigError::MissingField {
                    pattern: phase.name.clone(),
                    field: "phases.starts_at",
                });
            }
        }

        tracing::debug!(
            patterns = patterns.len(),
            timestamp = timestamp.is_some(),
            phases = def.phases.len(),
            "Rules compiled"
        );

        Ok(Self {
            patterns,
            timestamp,
            phases: def.phases,
            regex_counts: HashMap::new(),
        })
    }

    /// Load the built-in rules document embedded at compile time.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(BUILTIN_RULES, Path::new(BUILTIN_RULES_PATH))
    }

    /// Compiled patterns in configured order.
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// The timestamp extraction rule, if configured.
    pub fn timestamp_rule(&self) -> Option<&TimestampRule> {
        self.timestamp.as_ref()
    }

    /// Phase boundaries in configured order.
    pub fn phase_boundaries(&self) -> &[PhaseBoundary] {
        &self.phases
    }

    /// Number of lines that have matched `regex_text` since the last reset.
    pub fn occurrences(&self, regex_text: &str) -> u32 {
        self.regex_counts.get(regex_text).copied().unwrap_or(0)
    }

    /// Classify one line.
    ///
    /// Patterns are tried in configured order. Every pattern whose regex
    /// matches bumps that regex text's counter, at most once per line. The
    /// first pattern whose counter now equals its `occurrence` (or, for
    /// `repeat` patterns, has reached it) fires and evaluation stops.
    /// Returns `None` when nothing fires.
    ///
    /// `fallback` is used when there is no timestamp rule, the rule does
    /// not match the line, or the captured text does not parse.
    pub fn match_line(&mut self, line: &str, fallback: DateTime<Utc>) -> Option<Match<'_>> {
        let patterns = &self.patterns;
        let counts = &mut self.regex_counts;
        let mut counted_this_line: HashSet<&str> = HashSet::new();

        for pattern in patterns {
            if !pattern.regex.is_match(line) {
                continue;
            }

            let key = pattern.regex_text();
            if counted_this_line.insert(key) {
                *counts.entry(key.to_string()).or_insert(0) += 1;
            }

            let seen = counts.get(key).copied().unwrap_or(0);
            let fires = if pattern.repeat {
                seen >= pattern.occurrence
            } else {
                seen == pattern.occurrence
            };
            if !fires {
                continue;
            }

            let (timestamp, timestamp_from_line) =
                match self.timestamp.as_ref().and_then(|ts| ts.extract(line)) {
                    Some(ts) => (ts, true),
                    None => {
                        if self.timestamp.is_some() {
                            tracing::debug!(
                                pattern = %pattern.name,
                                line = preview(line),
                                "No parseable timestamp; using fallback"
                            );
                        }
                        (fallback, false)
                    }
                };

            let captures = if pattern.capture {
                extract_captures(&pattern.regex, line)
            } else {
                BTreeMap::new()
            };

            tracing::debug!(
                pattern = %pattern.name,
                occurrence = pattern.occurrence,
                marks_ready = pattern.marks_ready,
                "Pattern fired"
            );

            return Some(Match {
                pattern,
                timestamp,
                timestamp_from_line,
                captures,
                line: line.to_string(),
            });
        }

        None
    }

    /// Clear every occurrence counter so the same rules can classify an
    /// unrelated capture without reloading.
    pub fn reset(&mut self) {
        self.regex_counts.clear();
    }

    /// Rebuild the document this rule set was compiled from, with
    /// occurrences normalised.
    pub fn to_definition(&self) -> RulesDefinition {
        RulesDefinition {
            patterns: self
                .patterns
                .iter()
                .map(|p| PatternDef {
                    name: p.name.clone(),
                    regex: p.regex_text().to_string(),
                    occurrence: Some(p.occurrence),
                    repeat: p.repeat,
                    marks_ready: p.marks_ready,
                    capture: p.capture,
                })
                .collect(),
            timestamp: self.timestamp.as_ref().map(|ts| TimestampDef {
                regex: ts.regex.as_str().to_string(),
                layout: ts.layout.clone(),
            }),
            phases: self.phases.clone(),
        }
    }

    /// Serialise the normalised document back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(&self.to_definition()).map_err(|e| ConfigError::Serialize { source: e })
    }
}

// =============================================================================
// Compilation helpers
// =============================================================================

/// Compile a regex pattern with length validation to prevent ReDoS.
fn compile_regex(pattern: &str, field: &'static str, regex: &str) -> Result<Regex, ConfigError> {
    if regex.len() > constants::MAX_REGEX_PATTERN_LENGTH {
        return Err(ConfigError::RegexTooLong {
            pattern: pattern.to_string(),
            field,
            length: regex.len(),
            max_length: constants::MAX_REGEX_PATTERN_LENGTH,
        });
    }

    Regex::new(regex).map_err(|e| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        field,
        regex: regex.to_string(),
        source: e,
    })
}

fn compile_timestamp(def: TimestampDef) -> Result<TimestampRule, ConfigError> {
    if def.regex.is_empty() {
        return Err(ConfigError::MissingField {
            pattern: "timestamp".to_string(),
            field: "timestamp.regex",
        });
    }
    if def.layout.is_empty() {
        return Err(ConfigError::MissingField {
            pattern: "timestamp".to_string(),
            field: "timestamp.layout",
        });
    }

    let regex = compile_regex("timestamp", "timestamp.regex", &def.regex)?;

    // captures_len() counts the implicit whole-match group.
    if regex.captures_len() < 2 {
        return Err(ConfigError::TimestampWithoutGroup { regex: def.regex });
    }

    Ok(TimestampRule {
        regex,
        layout: def.layout,
    })
}

// =============================================================================
// Extraction helpers
// =============================================================================

impl TimestampRule {
    /// Apply the rule to a line and parse its first group.
    ///
    /// Returns `None` when the regex does not match or the text does not
    /// parse with the layout.
    pub fn extract(&self, line: &str) -> Option<DateTime<Utc>> {
        let caps = self.regex.captures(line)?;
        let raw = caps.get(1)?.as_str();
        parse_timestamp(raw, &self.layout)
    }
}

/// Parse a timestamp with a chrono layout.
///
/// Layouts carrying an offset (`%z`, `%:z`, `%+`) are parsed as zoned
/// instants; everything else is read as a naive wall-clock time in UTC.
/// Text that does not fit the layout yields `None`.
pub fn parse_timestamp(raw: &str, layout: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(raw, layout) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, layout)
        .ok()
        .map(|ndt| ndt.and_utc())
}

/// Collect the participating named groups of `regex` in `line`.
fn extract_captures(regex: &Regex, line: &str) -> BTreeMap<String, String> {
    let mut captures = BTreeMap::new();
    if let Some(caps) = regex.captures(line) {
        for name in regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                captures.insert(name.to_string(), m.as_str().to_string());
            }
        }
    }
    captures
}

// =============================================================================
// Built-in rules (embedded at compile time)
// =============================================================================

/// Pseudo-path used in error messages for the embedded document.
pub const BUILTIN_RULES_PATH: &str = "<builtin>/default.toml";

/// Embedded TOML content of the built-in PostgreSQL startup rules.
pub const BUILTIN_RULES: &str = include_str!("../../rules/default.toml");

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const READY_RULES_TOML: &str = r#"
[[patterns]]
name = "ready"
regex = 'database system is ready to accept connections'
marks_ready = true

[timestamp]
regex = '^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3}) UTC'
layout = "%Y-%m-%d %H:%M:%S%.f"
"#;

    const READY_LINE: &str =
        "2026-01-30 13:18:21.286 UTC [41] LOG:  database system is ready to accept connections";

    fn load(toml: &str) -> Rules {
        Rules::from_toml(toml, Path::new("test.toml")).unwrap()
    }

    fn fallback() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_load_rules() {
        let rules = load(READY_RULES_TOML);
        assert_eq!(rules.patterns().len(), 1);
        assert_eq!(rules.patterns()[0].name, "ready");
        assert!(rules.patterns()[0].marks_ready);
        assert!(!rules.patterns()[0].capture);
        assert_eq!(rules.patterns()[0].occurrence, 1);
        assert!(rules.timestamp_rule().is_some());
    }

    #[test]
    fn test_match_parses_timestamp_from_line() {
        let mut rules = load(READY_RULES_TOML);
        let m = rules.match_line(READY_LINE, fallback()).unwrap();

        assert_eq!(m.pattern.name, "ready");
        assert!(m.timestamp_from_line);
        let expected = Utc
            .with_ymd_and_hms(2026, 1, 30, 13, 18, 21)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::milliseconds(286))
            .unwrap();
        assert_eq!(m.timestamp, expected);
        assert_eq!(m.line, READY_LINE);
    }

    #[test]
    fn test_unmatched_line_returns_none() {
        let mut rules = load(READY_RULES_TOML);
        assert!(rules.match_line("LOG:  checkpoint starting", fallback()).is_none());
    }

    #[test]
    fn test_malformed_timestamp_falls_back() {
        let mut rules = load(READY_RULES_TOML);
        // Month 13 matches the timestamp regex but does not parse.
        let line = "2026-13-30 13:18:21.286 UTC LOG:  database system is ready to accept connections";
        let m = rules.match_line(line, fallback()).unwrap();
        assert_eq!(m.timestamp, fallback());
        assert!(!m.timestamp_from_line);
    }

    #[test]
    fn test_missing_timestamp_rule_uses_fallback() {
        let mut rules = load(
            r#"
[[patterns]]
name = "ready"
regex = 'ready'
"#,
        );
        let m = rules.match_line("ready", fallback()).unwrap();
        assert_eq!(m.timestamp, fallback());
    }

    #[test]
    fn test_occurrence_k_fires_only_on_kth_line() {
        for k in 1..=5u32 {
            let mut rules = load(&format!(
                "[[patterns]]\nname = \"nth\"\nregex = 'tick'\noccurrence = {k}\n"
            ));
            let fired_on: Vec<u32> = (1..=8u32)
                .filter(|_| rules.match_line("tick", fallback()).is_some())
                .collect();
            assert_eq!(fired_on, vec![k], "occurrence = {k}");
        }
    }

    #[test]
    fn test_occurrence_never_reached_never_fires() {
        let mut rules = load("[[patterns]]\nname = \"third\"\nregex = 'tick'\noccurrence = 3\n");
        assert!(rules.match_line("tick", fallback()).is_none());
        assert!(rules.match_line("tick", fallback()).is_none());
        assert_eq!(rules.occurrences("tick"), 2);
    }

    #[test]
    fn test_shared_regex_occurrences_one_and_three() {
        let mut rules = load(
            r#"
[[patterns]]
name = "first"
regex = 'ready'

[[patterns]]
name = "third"
regex = 'ready'
occurrence = 3
"#,
        );

        let names: Vec<Option<String>> = (0..4)
            .map(|_| {
                rules
                    .match_line("ready", fallback())
                    .map(|m| m.pattern.name.clone())
            })
            .collect();

        assert_eq!(
            names,
            vec![Some("first".to_string()), None, Some("third".to_string()), None]
        );
        // Counted once per line, not once per pattern sharing the text.
        assert_eq!(rules.occurrences("ready"), 4);
    }

    #[test]
    fn test_shared_regex_occurrences_one_and_two() {
        let mut rules = load(
            r#"
[[patterns]]
name = "temp_server_ready"
regex = 'ready to accept connections'
occurrence = 1

[[patterns]]
name = "final_server_ready"
regex = 'ready to accept connections'
occurrence = 2
marks_ready = true
"#,
        );

        let first = rules
            .match_line("LOG: ready to accept connections", fallback())
            .unwrap();
        assert_eq!(first.pattern.name, "temp_server_ready");
        assert!(!first.pattern.marks_ready);

        let second = rules
            .match_line("other text, ready to accept connections", fallback())
            .unwrap();
        assert_eq!(second.pattern.name, "final_server_ready");
        assert!(second.pattern.marks_ready);
    }

    #[test]
    fn test_distinct_regex_text_counts_independently() {
        let mut rules = load(
            r#"
[[patterns]]
name = "a"
regex = 'ready'
occurrence = 2

[[patterns]]
name = "b"
regex = '(?:ready)'
"#,
        );
        // Line 1: "a" counts to 1 (no fire), "b" counts to 1 and fires.
        let m = rules.match_line("ready", fallback()).unwrap();
        assert_eq!(m.pattern.name, "b");
        // Line 2: "a" reaches 2 and fires first.
        let m = rules.match_line("ready", fallback()).unwrap();
        assert_eq!(m.pattern.name, "a");
    }

    #[test]
    fn test_first_firing_pattern_wins() {
        let mut rules = load(
            r#"
[[patterns]]
name = "specific"
regex = 'worker "(?P<worker>[^"]+)"'
capture = true

[[patterns]]
name = "generic"
regex = 'worker'
"#,
        );
        let m = rules.match_line(r#"starting worker "pg_cron""#, fallback()).unwrap();
        assert_eq!(m.pattern.name, "specific");
        assert_eq!(m.captures.get("worker").map(String::as_str), Some("pg_cron"));
        // "generic" was never evaluated for that line.
        assert_eq!(rules.occurrences("worker"), 0);
    }

    #[test]
    fn test_captures_only_when_requested() {
        let mut rules = load(
            r#"
[[patterns]]
name = "ext"
regex = 'loaded library "(?P<extension>[^"]+)"'
"#,
        );
        let m = rules.match_line(r#"loaded library "pgsodium""#, fallback()).unwrap();
        assert!(m.captures.is_empty());
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut rules = load("[[patterns]]\nname = \"second\"\nregex = 'tick'\noccurrence = 2\n");
        assert!(rules.match_line("tick", fallback()).is_none());
        assert!(rules.match_line("tick", fallback()).is_some());
        rules.reset();
        assert_eq!(rules.occurrences("tick"), 0);
        assert!(rules.match_line("tick", fallback()).is_none());
        assert!(rules.match_line("tick", fallback()).is_some());
    }

    #[test]
    fn test_zero_occurrence_normalised() {
        let rules = load("[[patterns]]\nname = \"z\"\nregex = 'x'\noccurrence = 0\n");
        assert_eq!(rules.patterns()[0].occurrence, 1);
    }

    #[test]
    fn test_invalid_pattern_regex() {
        let result = Rules::from_toml(
            "[[patterns]]\nname = \"bad\"\nregex = '[invalid'\n",
            Path::new("bad.toml"),
        );
        match result.unwrap_err() {
            ConfigError::InvalidRegex { pattern, field, .. } => {
                assert_eq!(pattern, "bad");
                assert_eq!(field, "patterns.regex");
            }
            other => panic!("Expected InvalidRegex, got: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_timestamp_regex() {
        let result = Rules::from_toml(
            "[[patterns]]\nname = \"ok\"\nregex = 'x'\n\n[timestamp]\nregex = '(unclosed'\nlayout = \"%Y\"\n",
            Path::new("bad.toml"),
        );
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidRegex {
                field: "timestamp.regex",
                ..
            }
        ));
    }

    #[test]
    fn test_timestamp_regex_without_group() {
        let result = Rules::from_toml(
            "[[patterns]]\nname = \"ok\"\nregex = 'x'\n\n[timestamp]\nregex = '\\d+'\nlayout = \"%s\"\n",
            Path::new("bad.toml"),
        );
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::TimestampWithoutGroup { .. }
        ));
    }

    #[test]
    fn test_structurally_invalid_document() {
        let result = Rules::from_toml("patterns = \"not a list\"\n", Path::new("bad.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParse { .. }));

        let result = Rules::from_toml("[timestamp]\nregex = '(x)'\nlayout = \"%Y\"\n", Path::new("bad.toml"));
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParse { .. }));
    }

    #[test]
    fn test_duplicate_pattern_name() {
        let result = Rules::from_toml(
            "[[patterns]]\nname = \"dup\"\nregex = 'a'\n\n[[patterns]]\nname = \"dup\"\nregex = 'b'\n",
            Path::new("dup.toml"),
        );
        match result.unwrap_err() {
            ConfigError::DuplicatePattern { name } => assert_eq!(name, "dup"),
            other => panic!("Expected DuplicatePattern, got: {other:?}"),
        }
    }

    #[test]
    fn test_regex_too_long() {
        let long = "a".repeat(constants::MAX_REGEX_PATTERN_LENGTH + 1);
        let result = Rules::from_toml(
            &format!("[[patterns]]\nname = \"long\"\nregex = '{long}'\n"),
            Path::new("long.toml"),
        );
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::RegexTooLong { .. }
        ));
    }

    #[test]
    fn test_round_trip_preserves_rules() {
        let original = Rules::builtin().unwrap();
        let toml = original.to_toml().unwrap();
        let reloaded = Rules::from_toml(&toml, Path::new("roundtrip.toml")).unwrap();

        let summary = |r: &Rules| -> Vec<(String, String, u32, bool, bool)> {
            r.patterns()
                .iter()
                .map(|p| {
                    (
                        p.name.clone(),
                        p.regex_text().to_string(),
                        p.occurrence,
                        p.marks_ready,
                        p.capture,
                    )
                })
                .collect()
        };
        assert_eq!(summary(&original), summary(&reloaded));
        assert_eq!(original.to_definition(), reloaded.to_definition());
        assert_eq!(original.phase_boundaries(), reloaded.phase_boundaries());
    }

    #[test]
    fn test_layout_accepts_format_alias() {
        let rules = load(
            "[[patterns]]\nname = \"x\"\nregex = 'x'\n\n[timestamp]\nregex = '^(\\S+)'\nformat = \"%+\"\n",
        );
        assert_eq!(rules.timestamp_rule().unwrap().layout, "%+");
    }

    #[test]
    fn test_parse_timestamp_with_offset() {
        let ts = parse_timestamp("2026-01-30 13:18:21 +0200", "%Y-%m-%d %H:%M:%S %z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 1, 30, 11, 18, 21).unwrap());
    }

    #[test]
    fn test_rfc3339_text_under_other_layout_falls_back() {
        let mut rules = load(
            r#"
[[patterns]]
name = "ready"
regex = 'ready'

[timestamp]
regex = '^(\S+) '
layout = "%Y-%m-%d %H:%M:%S"
"#,
        );
        let m = rules.match_line("2026-01-30T13:18:21Z ready", fallback()).unwrap();
        assert_eq!(m.timestamp, fallback());
        assert!(!m.timestamp_from_line);

        assert!(parse_timestamp("2026-01-30T13:18:21Z", "%Y-%m-%d %H:%M:%S").is_none());
        assert_eq!(
            parse_timestamp("2026-01-30T13:18:21+00:00", "%+"),
            Some(Utc.with_ymd_and_hms(2026, 1, 30, 13, 18, 21).unwrap())
        );
    }

    #[test]
    fn test_parse_timestamp_garbage() {
        assert!(parse_timestamp("yesterday", "%Y-%m-%d %H:%M:%S").is_none());
    }

    #[test]
    fn test_repeat_pattern_fires_from_occurrence_on() {
        let mut rules = load(
            r#"
[[patterns]]
name = "script"
regex = 'running (?P<file>\S+)'
occurrence = 2
repeat = true
capture = true
"#,
        );
        assert!(rules.match_line("running a.sql", fallback()).is_none());
        let files: Vec<String> = ["b.sql", "c.sql", "d.sql"]
            .iter()
            .map(|f| {
                let m = rules.match_line(&format!("running {f}"), fallback()).unwrap();
                m.captures["file"].clone()
            })
            .collect();
        assert_eq!(files, vec!["b.sql", "c.sql", "d.sql"]);
        assert_eq!(rules.occurrences(r"running (?P<file>\S+)"), 4);
    }

    #[test]
    fn test_builtin_rules_load() {
        let rules = Rules::builtin().unwrap();
        assert!(rules.patterns().iter().any(|p| p.marks_ready));
        assert!(rules.timestamp_rule().is_some());
        assert!(!rules.phase_boundaries().is_empty());
    }
}
