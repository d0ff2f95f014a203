//! Configuration file loading for flowcheck.
//!
//! Reads `flowcheck.json` (by default from `<module>/.flowcheck/`) and provides
//! typed access to all settings. Falls back to defaults when the file is
//! missing or incomplete.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Directory inside a module root that holds the config file.
pub const CONFIG_DIR: &str = ".flowcheck";
pub const CONFIG_FILE: &str = "flowcheck.json";

const SOURCE_EXTENSIONS: &str = "{js,mjs,cjs,jsx,ts,tsx}";

/// Top-level flowcheck configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub roles: RoleConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default = "default_true")]
    pub report_orphans: bool,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    /// Searched for the project-wide broker when the module has none.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
}

/// Glob patterns (relative to the module root) assigning files to roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default = "default_producer_globs")]
    pub producer_globs: Vec<String>,
    #[serde(default = "default_consumer_globs")]
    pub consumer_globs: Vec<String>,
    #[serde(default = "default_broker_globs")]
    pub broker_globs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Explicit broker file; relative paths resolve against the module root.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,
    #[serde(default = "default_prepare_functions")]
    pub prepare_functions: Vec<String>,
    /// Property names the broker synthesizes itself.
    #[serde(default = "default_generators")]
    pub generators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_handler_prefixes")]
    pub handler_prefixes: Vec<String>,
    #[serde(default = "default_registration_calls")]
    pub registration_calls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Property names too generic to boost confidence.
    #[serde(default = "default_generic_tokens")]
    pub generic_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,
    /// 0 = available parallelism, capped at [`MAX_WORKERS`].
    #[serde(default)]
    pub workers: usize,
}

pub const MAX_WORKERS: usize = 8;

fn default_true() -> bool {
    true
}
fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
fn default_producer_globs() -> Vec<String> {
    vec![
        format!("**/flows/**/*.{SOURCE_EXTENSIONS}"),
        format!("**/*.flow.{SOURCE_EXTENSIONS}"),
    ]
}
fn default_consumer_globs() -> Vec<String> {
    vec![
        format!("**/handlers/**/*.{SOURCE_EXTENSIONS}"),
        format!("**/*.handler.{SOURCE_EXTENSIONS}"),
    ]
}
fn default_broker_globs() -> Vec<String> {
    vec![
        format!("**/broker.{SOURCE_EXTENSIONS}"),
        format!("**/*.broker.{SOURCE_EXTENSIONS}"),
    ]
}
fn default_entry_points() -> Vec<String> {
    strings(&["dispatch", "emit", "publish", "send"])
}
fn default_prepare_functions() -> Vec<String> {
    strings(&["preparePayload", "transformPayload", "prepare"])
}
fn default_generators() -> Vec<String> {
    strings(&[
        "executionContext",
        "context",
        "timestamp",
        "dispatchedAt",
        "receivedAt",
        "sequenceId",
        "sequence",
        "seq",
        "traceId",
        "correlationId",
    ])
}
fn default_handler_prefixes() -> Vec<String> {
    strings(&["handle", "on"])
}
fn default_registration_calls() -> Vec<String> {
    strings(&["on", "subscribe", "register", "addHandler"])
}
fn default_generic_tokens() -> Vec<String> {
    strings(&[
        "data", "event", "payload", "args", "params", "props", "value", "item", "result",
        "options", "type", "info",
    ])
}
fn default_max_file_bytes() -> u64 {
    1024 * 1024
}
fn default_parse_timeout_ms() -> u64 {
    2000
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            producer_globs: default_producer_globs(),
            consumer_globs: default_consumer_globs(),
            broker_globs: default_broker_globs(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            path: None,
            entry_points: default_entry_points(),
            prepare_functions: default_prepare_functions(),
            generators: default_generators(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            handler_prefixes: default_handler_prefixes(),
            registration_calls: default_registration_calls(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            generic_tokens: default_generic_tokens(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            parse_timeout_ms: default_parse_timeout_ms(),
            workers: 0,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            roles: RoleConfig::default(),
            broker: BrokerConfig::default(),
            consumer: ConsumerConfig::default(),
            scoring: ScoringConfig::default(),
            limits: LimitsConfig::default(),
            report_orphans: true,
            ignore_patterns: vec![],
            project_root: None,
        }
    }
}

impl FlowConfig {
    /// Load configuration from `flowcheck.json` inside the given directory.
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load(config_dir: &Path) -> Self {
        let config_path = config_dir.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&config_path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "failed to parse flowcheck config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Load the config that lives alongside a module (`<module>/.flowcheck/`).
    pub fn for_module(module_path: &Path) -> Self {
        Self::load(&module_path.join(CONFIG_DIR))
    }

    /// Effective worker count for per-file extraction.
    pub fn worker_count(&self) -> usize {
        if self.limits.workers > 0 {
            return self.limits.workers.min(MAX_WORKERS);
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(MAX_WORKERS)
    }

    pub fn is_generic_token(&self, name: &str) -> bool {
        self.scoring
            .generic_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let cfg = FlowConfig::default();
        assert!(cfg.report_orphans);
        assert_eq!(cfg.limits.max_file_bytes, 1024 * 1024);
        assert_eq!(cfg.limits.parse_timeout_ms, 2000);
        assert!(cfg.broker.entry_points.contains(&"dispatch".to_string()));
        assert!(cfg.broker.generators.contains(&"sequenceId".to_string()));
        assert_eq!(cfg.roles.producer_globs.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let cfg = FlowConfig::load(Path::new("/nonexistent"));
        assert_eq!(cfg.limits.parse_timeout_ms, 2000);
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = serde_json::json!({
            "broker": { "entry_points": ["fire"] },
            "limits": { "workers": 2 },
            "report_orphans": false
        });
        fs::write(dir.path().join(CONFIG_FILE), config.to_string()).unwrap();
        let cfg = FlowConfig::load(dir.path());
        assert_eq!(cfg.broker.entry_points, vec!["fire"]);
        assert_eq!(cfg.broker.prepare_functions, default_prepare_functions()); // default
        assert_eq!(cfg.limits.workers, 2);
        assert_eq!(cfg.limits.max_file_bytes, 1024 * 1024); // default
        assert!(!cfg.report_orphans);
    }

    #[test]
    fn test_load_invalid_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        let cfg = FlowConfig::load(dir.path());
        assert!(cfg.report_orphans);
    }

    #[test]
    fn test_for_module_reads_dot_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        fs::write(
            dir.path().join(CONFIG_DIR).join(CONFIG_FILE),
            r#"{ "consumer": { "handler_prefixes": ["process"] } }"#,
        )
        .unwrap();
        let cfg = FlowConfig::for_module(dir.path());
        assert_eq!(cfg.consumer.handler_prefixes, vec!["process"]);
    }

    #[test]
    fn test_worker_count_is_bounded() {
        let mut cfg = FlowConfig::default();
        cfg.limits.workers = 64;
        assert_eq!(cfg.worker_count(), MAX_WORKERS);
        cfg.limits.workers = 0;
        assert!(cfg.worker_count() >= 1 && cfg.worker_count() <= MAX_WORKERS);
    }

    #[test]
    fn test_generic_token_lookup() {
        let cfg = FlowConfig::default();
        assert!(cfg.is_generic_token("Payload"));
        assert!(!cfg.is_generic_token("zoneId"));
    }
}
