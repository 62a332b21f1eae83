//! Project configuration loaded from `.pygmalion.conf` (YAML).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = ".pygmalion.conf";

/// Per-project configuration.
///
/// Every field has a default, so a missing file or an empty document is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Build command template. `$(args)` expands to the client's arguments
    /// (appended when absent), `$(projectroot)` to the project root.
    #[serde(default = "default_make")]
    pub make: String,

    /// Number of concurrent indexing workers; `0` means one per core.
    #[serde(rename = "indexingThreads", default = "default_indexing_threads")]
    pub indexing_threads: usize,

    /// Regenerate `compile_commands.json` after each indexing batch.
    #[serde(rename = "compilationDatabase", default)]
    pub compilation_database: bool,

    /// Regenerate ctags after each indexing batch.
    #[serde(default)]
    pub tags: bool,

    /// Minimum severity that reaches the log.
    #[serde(rename = "logLevel", default)]
    pub log_level: LogLevel,
}

fn default_make() -> String {
    "make".to_string()
}

fn default_indexing_threads() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            make: default_make(),
            indexing_threads: default_indexing_threads(),
            compilation_database: false,
            tags: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load the configuration for a project root.
    ///
    /// A missing `.pygmalion.conf` yields the defaults; a malformed one is a
    /// hard error (silently falling back would mask typos).
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Number of indexing threads after resolving `0` to the core count.
    #[must_use]
    pub fn effective_indexing_threads(&self) -> usize {
        if self.indexing_threads > 0 {
            return self.indexing_threads;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }

    /// Expand the `make` template into a shell command line.
    ///
    /// `$(args)` is replaced by the space-joined `args`; if the template
    /// never names it the arguments are appended. `$(projectroot)` is
    /// replaced by the project root.
    #[must_use]
    pub fn make_command(&self, args: &[String], project_root: &Path) -> String {
        let joined = args.join(" ");
        let root = project_root.display().to_string();

        let mut command = self.make.replace("$(projectroot)", &root);
        if command.contains("$(args)") {
            command = command.replace("$(args)", &joined);
        } else if !joined.is_empty() {
            command.push(' ');
            command.push_str(&joined);
        }
        command
    }
}

/// Syslog-style severity names accepted by `logLevel`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    /// The `tracing` filter directive this level maps onto.
    ///
    /// The syslog names above `error` have no tracing counterpart and
    /// collapse onto `error`.
    #[must_use]
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info | Self::Notice => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical | Self::Alert | Self::Emergency => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.make, "make");
        assert_eq!(config.indexing_threads, 4);
        assert!(!config.compilation_database);
        assert!(!config.tags);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn yaml_overrides_are_honored() {
        let yaml = r"
make: ninja -C $(projectroot) $(args)
indexingThreads: 0
compilationDatabase: true
tags: true
logLevel: warning
";
        let config: Config = serde_yaml::from_str(yaml).expect("should parse");
        assert_eq!(config.indexing_threads, 0);
        assert!(config.compilation_database);
        assert!(config.tags);
        assert_eq!(config.log_level, LogLevel::Warning);
        assert!(config.effective_indexing_threads() >= 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let yaml = "maek: gmake\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn make_template_expands_args_in_place() {
        let config: Config =
            serde_yaml::from_str("make: build.sh $(args) --root $(projectroot)").expect("parse");
        let cmd = config.make_command(&["-j8".to_string()], Path::new("/proj"));
        assert_eq!(cmd, "build.sh -j8 --root /proj");
    }

    #[test]
    fn make_template_appends_args_when_not_named() {
        let config = Config::default();
        let cmd = config.make_command(&["-j8".to_string(), "all".to_string()], Path::new("/proj"));
        assert_eq!(cmd, "make -j8 all");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let config = Config::load(dir.path()).expect("should load");
        assert_eq!(config.make, "make");
    }
}
