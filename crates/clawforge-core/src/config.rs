//! Typed, validated `EngineConfig`: the on-disk/env form of §6's option table.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// What the Enforcer does once the control plane is judged offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineMode {
    /// Activate the kill switch.
    Block,
    /// Bypass all checks.
    Allow,
    /// Evaluate against the stale cached policy.
    Cached,
}

impl Default for OfflineMode {
    fn default() -> Self {
        Self::Block
    }
}

/// The full set of recognized configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the control plane. Empty disables Heartbeat/SessionKeeper.
    pub control_plane_url: String,
    /// Default organization when the session lacks one.
    pub org_id: String,
    /// Heartbeat period, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Consecutive heartbeat failures before offline behavior kicks in.
    pub heartbeat_failure_threshold: u32,
    /// Enforcement behavior once offline.
    pub offline_mode: OfflineMode,
    /// Audit flush trigger size.
    pub audit_batch_size: usize,
    /// Audit flush timer period, in milliseconds.
    pub audit_flush_interval_ms: u64,
    /// Audit in-memory buffer cap; oldest entries are dropped on overflow.
    pub max_audit_buffer_size: usize,
    /// Filesystem root for `audit-buffer.jsonl`, `session.json`, `config.toml`.
    pub config_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_plane_url: String::new(),
            org_id: String::new(),
            heartbeat_interval_ms: 30_000,
            heartbeat_failure_threshold: 10,
            offline_mode: OfflineMode::default(),
            audit_batch_size: 100,
            audit_flush_interval_ms: 30_000,
            max_audit_buffer_size: 10_000,
            config_root: default_config_root(),
        }
    }
}

fn default_config_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".openclaw").join("clawforge")
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits. Missing files are treated as "use defaults",
    /// not an error.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "loaded engine config from file");
                toml::from_str(&contents).map_err(CoreError::ConfigParse)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
            Err(e) => return Err(CoreError::Io(e)),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Apply `CLAWFORGE_<UPPER_SNAKE_NAME>` environment overrides on top of
    /// whatever was loaded from file/defaults.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CLAWFORGE_CONTROL_PLANE_URL") {
            tracing::debug!("CLAWFORGE_CONTROL_PLANE_URL override applied");
            self.control_plane_url = v;
        }
        if let Ok(v) = std::env::var("CLAWFORGE_ORG_ID") {
            tracing::debug!("CLAWFORGE_ORG_ID override applied");
            self.org_id = v;
        }
        if let Some(v) = env_u64("CLAWFORGE_HEARTBEAT_INTERVAL_MS") {
            tracing::debug!("CLAWFORGE_HEARTBEAT_INTERVAL_MS override applied");
            self.heartbeat_interval_ms = v;
        }
        if let Some(v) = env_u32("CLAWFORGE_HEARTBEAT_FAILURE_THRESHOLD") {
            tracing::debug!("CLAWFORGE_HEARTBEAT_FAILURE_THRESHOLD override applied");
            self.heartbeat_failure_threshold = v;
        }
        if let Ok(v) = std::env::var("CLAWFORGE_OFFLINE_MODE") {
            tracing::debug!("CLAWFORGE_OFFLINE_MODE override applied");
            self.offline_mode = match v.as_str() {
                "block" => OfflineMode::Block,
                "allow" => OfflineMode::Allow,
                "cached" => OfflineMode::Cached,
                _ => self.offline_mode,
            };
        }
        if let Some(v) = env_u64("CLAWFORGE_AUDIT_BATCH_SIZE") {
            tracing::debug!("CLAWFORGE_AUDIT_BATCH_SIZE override applied");
            self.audit_batch_size = v as usize;
        }
        if let Some(v) = env_u64("CLAWFORGE_AUDIT_FLUSH_INTERVAL_MS") {
            tracing::debug!("CLAWFORGE_AUDIT_FLUSH_INTERVAL_MS override applied");
            self.audit_flush_interval_ms = v;
        }
        if let Some(v) = env_u64("CLAWFORGE_MAX_AUDIT_BUFFER_SIZE") {
            tracing::debug!("CLAWFORGE_MAX_AUDIT_BUFFER_SIZE override applied");
            self.max_audit_buffer_size = v as usize;
        }
        if let Ok(v) = std::env::var("CLAWFORGE_CONFIG_ROOT") {
            tracing::debug!(path = %v, "CLAWFORGE_CONFIG_ROOT override applied");
            self.config_root = PathBuf::from(v);
        }
    }

    /// Path to the durable audit buffer file.
    #[must_use]
    pub fn audit_buffer_path(&self) -> PathBuf {
        self.config_root.join("audit-buffer.jsonl")
    }

    /// Path to the persisted session token file.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.config_root.join("session.json")
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = EngineConfig::load_from_file("/nonexistent/clawforge/config.toml").unwrap();
        assert_eq!(cfg.heartbeat_interval_ms, 30_000);
        assert_eq!(cfg.offline_mode, OfflineMode::Block);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "heartbeat_interval_ms = 5000\n").unwrap();
        let cfg = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.heartbeat_interval_ms, 5000);
        assert_eq!(cfg.audit_batch_size, 100);
    }

    #[test]
    fn derived_paths_join_config_root() {
        let mut cfg = EngineConfig::default();
        cfg.config_root = PathBuf::from("/tmp/cf");
        assert_eq!(cfg.audit_buffer_path(), PathBuf::from("/tmp/cf/audit-buffer.jsonl"));
        assert_eq!(cfg.session_path(), PathBuf::from("/tmp/cf/session.json"));
    }
}
