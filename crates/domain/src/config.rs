//! Domain configuration loaded from environment variables.

/// Repository and command handling settings with sensible defaults.
///
/// Reads from environment variables:
/// - `ES_SNAPSHOTS_ENABLED`: use and take snapshots (default: `true`)
/// - `ES_STRICT_NOT_FOUND`: command handlers fail on unknown ids (default: `false`)
/// - `ES_LOG_JSON`: emit JSON log lines (default: `false`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainConfig {
    pub snapshots_enabled: bool,
    pub strict_not_found: bool,
    pub log_json: bool,
    pub log_level: String,
}

impl DomainConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            snapshots_enabled: env_flag("ES_SNAPSHOTS_ENABLED").unwrap_or(defaults.snapshots_enabled),
            strict_not_found: env_flag("ES_STRICT_NOT_FOUND").unwrap_or(defaults.strict_not_found),
            log_json: env_flag("ES_LOG_JSON").unwrap_or(defaults.log_json),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            snapshots_enabled: true,
            strict_not_found: false,
            log_json: false,
            log_level: "info".to_string(),
        }
    }
}

/// Unset or unparsable values yield `None`.
fn env_flag(name: &str) -> Option<bool> {
    parse_flag(&std::env::var(name).ok()?)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
