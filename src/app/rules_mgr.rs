// pg-startup-profiler - app/rules_mgr.rs
//
// Resolves which rules document to use and reads it from disk.
// Precedence: explicit path (CLI or config) > operator override in the
// config directory > the built-in document embedded in the binary.

use crate::core::rules::{Rules, BUILTIN_RULES_PATH};
use crate::util::constants;
use crate::util::error::ConfigError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the loaded rules came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesOrigin {
    Builtin,
    File(PathBuf),
}

impl fmt::Display for RulesOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin => f.write_str(BUILTIN_RULES_PATH),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Load the effective rule set.
///
/// An explicit path must exist and be valid. The operator override is only
/// used if the file exists; a broken override is still an error.
pub fn load_rules(
    explicit: Option<&Path>,
    user_override: Option<&Path>,
) -> Result<(Rules, RulesOrigin), ConfigError> {
    if let Some(path) = explicit {
        let rules = load_rules_file(path)?;
        return Ok((rules, RulesOrigin::File(path.to_path_buf())));
    }

    if let Some(path) = user_override {
        if path.is_file() {
            tracing::info!(path = %path.display(), "Using operator rules override");
            let rules = load_rules_file(path)?;
            return Ok((rules, RulesOrigin::File(path.to_path_buf())));
        }
        tracing::debug!(path = %path.display(), "No operator rules override (using built-in)");
    }

    let rules = Rules::builtin()?;
    tracing::info!(patterns = rules.patterns().len(), "Loaded built-in rules");
    Ok((rules, RulesOrigin::Builtin))
}

/// Read, size-check, and compile one rules file.
pub fn load_rules_file(path: &Path) -> Result<Rules, ConfigError> {
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > constants::MAX_RULES_FILE_SIZE {
        return Err(ConfigError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_RULES_FILE_SIZE,
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let rules = Rules::from_toml(&content, path)?;
    tracing::info!(
        path = %path.display(),
        patterns = rules.patterns().len(),
        "Loaded rules file"
    );
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "[[patterns]]\nname = \"ready\"\nregex = 'ready'\nmarks_ready = true\n";

    #[test]
    fn test_builtin_when_nothing_given() {
        let (rules, origin) = load_rules(None, None).unwrap();
        assert_eq!(origin, RulesOrigin::Builtin);
        assert!(!rules.patterns().is_empty());
    }

    #[test]
    fn test_missing_override_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let (_, origin) = load_rules(None, Some(&dir.path().join("rules.toml"))).unwrap();
        assert_eq!(origin, RulesOrigin::Builtin);
    }

    #[test]
    fn test_override_used_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let (rules, origin) = load_rules(None, Some(&path)).unwrap();
        assert_eq!(origin, RulesOrigin::File(path));
        assert_eq!(rules.patterns().len(), 1);
    }

    #[test]
    fn test_explicit_path_wins_and_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_rules(Some(&missing), None).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[[patterns]]\nname = \"x\"\nregex = '(unclosed'\n").unwrap();

        let err = load_rules_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.toml");
        let padding = "#".repeat(constants::MAX_RULES_FILE_SIZE as usize + 1);
        std::fs::write(&path, padding).unwrap();

        let err = load_rules_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::FileTooLarge { .. }));
    }
}
