// pg-startup-profiler - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Only rules loading is fatal inside the core; everything on the
// classification and aggregation path degrades instead of failing.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all profiler operations.
#[derive(Debug)]
pub enum ProfilerError {
    /// Rules document loading or validation failed.
    Config(ConfigError),

    /// A profiling session could not complete.
    Session(SessionError),

    /// Report export failed.
    Report(ReportError),
}

impl fmt::Display for ProfilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Session(e) => write!(f, "Session error: {e}"),
            Self::Report(e) => write!(f, "Report error: {e}"),
        }
    }
}

impl std::error::Error for ProfilerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::Report(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors raised while loading a rules document.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML could not be parsed into the rules document shape.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Rules could not be serialised back to TOML.
    Serialize { source: toml::ser::Error },

    /// A required field is missing or empty.
    MissingField {
        pattern: String,
        field: &'static str,
    },

    /// A regex failed to compile.
    InvalidRegex {
        pattern: String,
        field: &'static str,
        regex: String,
        source: regex::Error,
    },

    /// A regex exceeds the maximum allowed length.
    RegexTooLong {
        pattern: String,
        field: &'static str,
        length: usize,
        max_length: usize,
    },

    /// Two patterns share the same name.
    DuplicatePattern { name: String },

    /// The document defines more patterns than allowed.
    TooManyPatterns { count: usize, max: usize },

    /// The timestamp regex has no capturing group to parse.
    TimestampWithoutGroup { regex: String },

    /// A rules file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// I/O error reading a rules file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse rules '{}': {source}", path.display())
            }
            Self::Serialize { source } => write!(f, "Failed to serialise rules: {source}"),
            Self::MissingField { pattern, field } => {
                write!(f, "Pattern '{pattern}': missing required field '{field}'")
            }
            Self::InvalidRegex {
                pattern,
                field,
                regex,
                source,
            } => write!(
                f,
                "Pattern '{pattern}': invalid regex in '{field}' ('{regex}'): {source}"
            ),
            Self::RegexTooLong {
                pattern,
                field,
                length,
                max_length,
            } => write!(
                f,
                "Pattern '{pattern}': regex in '{field}' is {length} chars, \
                 exceeds maximum of {max_length}"
            ),
            Self::DuplicatePattern { name } => {
                write!(f, "Duplicate pattern name '{name}'")
            }
            Self::TooManyPatterns { count, max } => {
                write!(f, "Rules define {count} patterns, maximum is {max}")
            }
            Self::TimestampWithoutGroup { regex } => write!(
                f,
                "Timestamp regex '{regex}' has no capturing group to parse"
            ),
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Rules file '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::Io { path, source } => {
                write!(f, "I/O error reading rules '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Serialize { source } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for ProfilerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Errors raised by the orchestrating session, never by the core.
#[derive(Debug)]
pub enum SessionError {
    /// The line source could not be opened.
    Io { path: PathBuf, source: io::Error },

    /// No readiness event arrived before the deadline and the caller
    /// asked for that to be fatal.
    NotReady { waited: Duration },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Cannot read input '{}': {source}", path.display())
            }
            Self::NotReady { waited } => write!(
                f,
                "No readiness event observed after {:.1}s",
                waited.as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::NotReady { .. } => None,
        }
    }
}

impl From<SessionError> for ProfilerError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Report errors
// ---------------------------------------------------------------------------

/// Errors related to report export.
#[derive(Debug)]
pub enum ReportError {
    /// I/O error writing the report.
    Io { source: io::Error },

    /// CSV serialisation error.
    Csv { source: csv::Error },

    /// JSON serialisation error.
    Json { source: serde_json::Error },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { source } => write!(f, "Report I/O error: {source}"),
            Self::Csv { source } => write!(f, "CSV report error: {source}"),
            Self::Json { source } => write!(f, "JSON report error: {source}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Csv { source } => Some(source),
            Self::Json { source } => Some(source),
        }
    }
}

impl From<ReportError> for ProfilerError {
    fn from(e: ReportError) -> Self {
        Self::Report(e)
    }
}

/// Convenience type alias for profiler results.
pub type Result<T> = std::result::Result<T, ProfilerError>;
