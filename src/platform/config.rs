// pg-startup-profiler - platform/config.rs
//
// Platform-specific configuration directory resolution and config.toml
// loading with startup validation.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved platform paths for configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/pg-startup-profiler/)
    pub config_dir: PathBuf,

    /// Operator rules override, used when present and no `--rules` is given.
    pub user_rules_file: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let user_rules_file = config_dir.join(constants::RULES_FILE_NAME);

            tracing::debug!(
                config = %config_dir.display(),
                rules = %user_rules_file.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                user_rules_file,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                user_rules_file: fallback.join(constants::RULES_FILE_NAME),
                config_dir: fallback,
            }
        }
    }
}

// =============================================================================
// config.toml loading and validation
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored so a newer config file still loads
/// with an older binary.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[profiler]` section.
    pub profiler: ProfilerSection,
    /// `[report]` section.
    pub report: ReportSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[profiler]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ProfilerSection {
    /// Seconds to wait for the readiness event.
    pub timeout_secs: Option<u64>,
    /// Rules document to load instead of the built-in one.
    pub rules_file: Option<String>,
    /// "drop" or "close-at-ready".
    pub trailing_scripts: Option<String>,
}

/// `[report]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// "json" or "csv".
    pub format: Option<String>,
    /// Include the full event list in JSON reports.
    pub verbose: Option<bool>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
}

/// Output format of the `profile` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

/// Validated application configuration derived from `config.toml`.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Profiler --
    /// How long a session waits for readiness.
    pub timeout: Duration,
    /// Rules file override.
    pub rules_file: Option<PathBuf>,
    /// Close the last init script at the readiness boundary.
    pub close_trailing_script: bool,

    // -- Report --
    pub report_format: ReportFormat,
    pub verbose: bool,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(constants::DEFAULT_TIMEOUT_SECS),
            rules_file: None,
            close_trailing_script: false,
            report_format: ReportFormat::Json,
            verbose: false,
            log_level: None,
        }
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings.
/// If the file is unparseable, returns defaults with a warning so the
/// profiler still runs but the operator is told.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(&config_path) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!(
                "Could not read config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!(
                "Failed to parse config file '{}': {e}. Using defaults.",
                config_path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let config = validate(raw, config_dir, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

/// Validate each field against named limits, accumulating all warnings.
fn validate(raw: RawConfig, config_dir: &Path, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Profiler: timeout_secs --
    if let Some(secs) = raw.profiler.timeout_secs {
        if (constants::MIN_TIMEOUT_SECS..=constants::MAX_TIMEOUT_SECS).contains(&secs) {
            config.timeout = Duration::from_secs(secs);
        } else {
            warnings.push(format!(
                "[profiler] timeout_secs = {secs} is out of range ({}-{}). Using default ({}).",
                constants::MIN_TIMEOUT_SECS,
                constants::MAX_TIMEOUT_SECS,
                constants::DEFAULT_TIMEOUT_SECS,
            ));
        }
    }

    // -- Profiler: rules_file (relative paths resolve against the config dir) --
    if let Some(ref file) = raw.profiler.rules_file {
        if !file.is_empty() {
            let path = PathBuf::from(file);
            config.rules_file = Some(if path.is_absolute() {
                path
            } else {
                config_dir.join(path)
            });
        }
    }

    // -- Profiler: trailing_scripts --
    if let Some(ref policy) = raw.profiler.trailing_scripts {
        match policy.to_lowercase().as_str() {
            "drop" => config.close_trailing_script = false,
            "close-at-ready" => config.close_trailing_script = true,
            other => warnings.push(format!(
                "[profiler] trailing_scripts = \"{other}\" is not recognised. \
                 Expected \"drop\" or \"close-at-ready\". Using default (drop).",
            )),
        }
    }

    // -- Report: format --
    if let Some(ref format) = raw.report.format {
        match format.to_lowercase().as_str() {
            "json" => config.report_format = ReportFormat::Json,
            "csv" => config.report_format = ReportFormat::Csv,
            other => warnings.push(format!(
                "[report] format = \"{other}\" is not recognised. \
                 Expected \"json\" or \"csv\". Using default (json).",
            )),
        }
    }

    if let Some(verbose) = raw.report.verbose {
        config.verbose = verbose;
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    config
}
