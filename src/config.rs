//! Checker configuration: tool invocation, timeouts, and the accept-pattern
//! table, loaded from `config.toml`.
//!
//! Resolution for the user-level base directory:
//!   1. `KRBGATE_HOME` env var (if set and non-empty)
//!   2. `dirs::config_dir().map(|d| d.join("krbgate"))` (platform default)
//!
//! A missing config file is not an error; every field has a usable default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Tool invocation and timing knobs for one `CredentialChecker`.
///
/// ```toml
/// command = "kinit"
/// cache_path = "/dev/null"
/// accept_patterns = ["Permission denied", "No such file or directory"]
/// drain_timeout_ms = 3000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// External credential tool (searched on `PATH` unless absolute).
    pub command: String,

    /// Ticket lifetime passed as `-l`. Kept minimal since the ticket is
    /// discarded anyway.
    pub ticket_lifetime: String,

    /// Cache destination passed as `-c`. `/dev/null` discards the ticket; a
    /// deliberately unwritable path works too and produces the
    /// permission-denied accept case instead.
    pub cache_path: String,

    /// stderr substrings that mean the password was verified even though the
    /// ticket could not be written. Plain substring match, first hit wins.
    pub accept_patterns: Vec<String>,

    /// Deadline for writing the password to the tool's stdin.
    pub write_timeout_ms: u64,

    /// Deadline for draining stdout/stderr until the tool exits.
    pub drain_timeout_ms: u64,

    /// How long to wait for a password prompt before writing anyway.
    /// `0` skips the wait entirely.
    pub prompt_timeout_ms: u64,

    /// Readiness-poll tick shared by all timed pipe I/O.
    pub poll_interval_ms: u64,

    /// Floor for the wall-clock duration of one attempt, failed or not.
    pub min_duration_ms: u64,

    /// Grace period between SIGTERM and SIGKILL during cleanup.
    pub term_grace_ms: u64,

    /// Maximum accepted username length in bytes.
    pub max_username_len: usize,

    /// Per-stream ceiling on captured output. Bytes past the ceiling are
    /// still drained so the tool never blocks on a full pipe, but discarded.
    pub max_capture_bytes: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            command: "kinit".to_string(),
            ticket_lifetime: "1s".to_string(),
            cache_path: "/dev/null".to_string(),
            accept_patterns: vec![
                "Permission denied".to_string(),
                "No such file or directory".to_string(),
            ],
            write_timeout_ms: 1500,
            drain_timeout_ms: 3000,
            prompt_timeout_ms: 500,
            poll_interval_ms: 25,
            min_duration_ms: 1000,
            term_grace_ms: 200,
            max_username_len: 64,
            max_capture_bytes: 64 * 1024,
        }
    }
}

impl CheckerConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_millis(self.prompt_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    pub fn term_grace(&self) -> Duration {
        Duration::from_millis(self.term_grace_ms)
    }

    /// Reject configurations that cannot drive an attempt at all.
    ///
    /// `prompt_timeout_ms`, `min_duration_ms`, and `term_grace_ms` may be
    /// zero; the hard timeouts and the poll tick may not.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending field.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.command.trim().is_empty(), "command must not be empty");
        anyhow::ensure!(self.write_timeout_ms > 0, "write_timeout_ms must be positive");
        anyhow::ensure!(self.drain_timeout_ms > 0, "drain_timeout_ms must be positive");
        anyhow::ensure!(self.poll_interval_ms > 0, "poll_interval_ms must be positive");
        anyhow::ensure!(self.max_username_len > 0, "max_username_len must be positive");
        anyhow::ensure!(
            self.max_capture_bytes > 0,
            "max_capture_bytes must be positive"
        );
        anyhow::ensure!(
            self.accept_patterns.iter().all(|p| !p.is_empty()),
            "accept_patterns must not contain empty strings"
        );
        Ok(())
    }
}

/// krbgate user-level base directory, or `None` when the platform has no
/// config dir and `KRBGATE_HOME` is unset.
fn user_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("KRBGATE_HOME")
        && !home.is_empty()
    {
        return Some(PathBuf::from(home));
    }
    dirs::config_dir().map(|d| d.join("krbgate"))
}

/// Resolved path of the user config file, whether or not it exists yet.
pub fn config_path() -> Option<PathBuf> {
    user_dir().map(|d| d.join("config.toml"))
}

/// Load the user config, falling back to defaults when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or contains
/// invalid TOML.
pub fn load() -> anyhow::Result<CheckerConfig> {
    let Some(path) = config_path() else {
        return Ok(CheckerConfig::default());
    };
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CheckerConfig::default());
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to read config file: {}", path.display())));
        }
    };
    let config: CheckerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn set_krbgate_home(val: &str) {
        // SAFETY: test-only env mutation; #[serial] prevents races.
        unsafe { std::env::set_var("KRBGATE_HOME", val) };
    }

    fn clear_krbgate_home() {
        unsafe { std::env::remove_var("KRBGATE_HOME") };
    }

    // --- defaults ---

    #[test]
    fn defaults_are_usable() {
        let config = CheckerConfig::default();
        assert_eq!(config.command, "kinit");
        assert_eq!(config.cache_path, "/dev/null");
        assert_eq!(config.write_timeout(), Duration::from_millis(1500));
        assert_eq!(config.drain_timeout(), Duration::from_millis(3000));
        assert_eq!(config.min_duration(), Duration::from_millis(1000));
        assert!(
            config
                .accept_patterns
                .iter()
                .any(|p| p == "Permission denied")
        );
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: CheckerConfig =
            toml::from_str("command = \"/usr/local/bin/kinit\"\ndrain_timeout_ms = 5000\n")
                .unwrap();
        assert_eq!(config.command, "/usr/local/bin/kinit");
        assert_eq!(config.drain_timeout_ms, 5000);
        assert_eq!(config.write_timeout_ms, 1500);
        assert_eq!(config.ticket_lifetime, "1s");
    }

    // --- validate ---

    #[test]
    fn validate_rejects_empty_command() {
        let config = CheckerConfig {
            command: "  ".to_string(),
            ..CheckerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        for field in ["write", "drain", "poll"] {
            let mut config = CheckerConfig::default();
            match field {
                "write" => config.write_timeout_ms = 0,
                "drain" => config.drain_timeout_ms = 0,
                _ => config.poll_interval_ms = 0,
            }
            assert!(config.validate().is_err(), "{field} timeout of 0 accepted");
        }
    }

    #[test]
    fn validate_allows_zero_optional_durations() {
        let config = CheckerConfig {
            prompt_timeout_ms: 0,
            min_duration_ms: 0,
            term_grace_ms: 0,
            ..CheckerConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_capture_cap() {
        // A zero cap would make every stderr look empty to the classifier.
        let config = CheckerConfig {
            max_capture_bytes: 0,
            ..CheckerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_accept_pattern() {
        let config = CheckerConfig {
            accept_patterns: vec!["Permission denied".to_string(), String::new()],
            ..CheckerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    // --- path resolution and loading ---

    #[test]
    #[serial]
    fn config_path_uses_krbgate_home_when_set() {
        set_krbgate_home("/custom/krbgate/home");
        let result = config_path();
        clear_krbgate_home();
        assert_eq!(
            result,
            Some(PathBuf::from("/custom/krbgate/home/config.toml"))
        );
    }

    #[test]
    #[serial]
    fn config_path_ignores_empty_krbgate_home() {
        set_krbgate_home("");
        let result = config_path();
        clear_krbgate_home();
        let fallback = dirs::config_dir().map(|d| d.join("krbgate/config.toml"));
        assert_eq!(result, fallback);
    }

    #[test]
    #[serial]
    fn load_returns_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        set_krbgate_home(&dir.path().to_string_lossy());
        let result = load();
        clear_krbgate_home();
        assert_eq!(result.unwrap(), CheckerConfig::default());
    }

    #[test]
    #[serial]
    fn load_reads_file_from_krbgate_home() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "command = \"/opt/heimdal/bin/kinit\"\nmin_duration_ms = 250\n",
        )
        .unwrap();
        set_krbgate_home(&dir.path().to_string_lossy());
        let result = load();
        clear_krbgate_home();
        let config = result.unwrap();
        assert_eq!(config.command, "/opt/heimdal/bin/kinit");
        assert_eq!(config.min_duration_ms, 250);
    }

    #[test]
    #[serial]
    fn load_reports_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "command = [not toml").unwrap();
        set_krbgate_home(&dir.path().to_string_lossy());
        let result = load();
        clear_krbgate_home();
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("failed to parse config file"));
    }
}
