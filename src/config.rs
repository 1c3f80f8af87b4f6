//! Daemon configuration.
//!
//! Layers defaults, an optional TOML file (`STIGMER_CONFIG`, default
//! `~/.stigmer/config.toml`), and environment variables, in that order —
//! the same layering the teacher applies ad hoc in `src/bin/server.rs`
//! (`dotenv` then `env::var` reads), generalized here with the `config`
//! crate so later layers only need to override what they care about.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StigmerError};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Root directory for all persisted state; defaults to `~/.stigmer`.
    pub home_dir: PathBuf,

    /// gRPC listen address, e.g. `127.0.0.1:7233`.
    pub grpc_addr: String,

    /// Local HTTP log-tail endpoint address.
    pub log_http_addr: String,

    /// `MODE` env var: `local` selects local-sandbox defaults.
    pub mode: Mode,

    pub temporal: TemporalConfig,
    pub llm: LlmConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Local,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    pub target: String,
    pub namespace: String,
    pub task_queue_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// `OLLAMA_BASE_URL` or provider-specific URL, rewritten to
    /// `host.docker.internal` form before being handed to containerized
    /// runners on non-Linux hosts (spec §4.7).
    pub ollama_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub backend_host_port: String,
    pub workflow_runner_bin_override: Option<PathBuf>,
    pub agent_runner_container_name: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let home_dir = default_home_dir();
        DaemonConfig {
            grpc_addr: "127.0.0.1:7233".to_string(),
            log_http_addr: "127.0.0.1:7234".to_string(),
            mode: Mode::Local,
            temporal: TemporalConfig {
                target: "127.0.0.1:7233".to_string(),
                namespace: "default".to_string(),
                task_queue_prefix: "stigmer".to_string(),
            },
            llm: LlmConfig {
                ollama_base_url: None,
            },
            supervisor: SupervisorConfig {
                backend_host_port: "127.0.0.1:50051".to_string(),
                workflow_runner_bin_override: None,
                agent_runner_container_name: "stigmer-agent-runner".to_string(),
            },
            home_dir,
        }
    }
}

fn default_home_dir() -> PathBuf {
    dirs_home().join(".stigmer")
}

/// Minimal `$HOME` resolution; the teacher pulls in `dirs` for this in
/// `src-tauri` — here it is a single env lookup since the daemon only ever
/// needs `$HOME`, not per-platform config/cache/data splits.
fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// environment variables (spec §6 env var table).
    pub fn load() -> Result<Self> {
        let mut cfg = DaemonConfig::default();

        let config_path = std::env::var("STIGMER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| cfg.home_dir.join("config.toml"));
        if config_path.exists() {
            cfg.apply_toml_file(&config_path)?;
        }

        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_toml_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StigmerError::internal(format!("reading config file: {e}")))?;
        let overlay: PartialConfig = config::Config::builder()
            .add_source(config::File::from_str(&raw, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| StigmerError::invalid_argument(format!("config file: {e}")))?;
        overlay.apply_to(self);
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("MODE") {
            self.mode = if v.eq_ignore_ascii_case("local") {
                Mode::Local
            } else {
                Mode::Other
            };
        }
        if let Ok(v) = std::env::var("STIGMER_HOME") {
            self.home_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("STIGMER_GRPC_ADDR") {
            self.grpc_addr = v;
        }
        if let Ok(v) = std::env::var("STIGMER_BACKEND_ENDPOINT") {
            self.supervisor.backend_host_port = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.ollama_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("STIGMER_WORKFLOW_RUNNER_BIN") {
            self.supervisor.workflow_runner_bin_override = Some(PathBuf::from(v));
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.home_dir.join("data").join("stigmer.db")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.home_dir.join("storage").join("skills")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.home_dir.join("bin")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    pub fn temporal_lock_path(&self) -> PathBuf {
        self.home_dir.join("temporal.lock")
    }

    pub fn startup_config_path(&self) -> PathBuf {
        self.home_dir.join("startup-config.json")
    }

    /// Rewrite a base URL for container networking (spec §4.7): on Linux
    /// the container shares the host network namespace so `localhost` is
    /// correct; elsewhere it must be rewritten to `host.docker.internal`.
    pub fn host_resolved_url(&self, url: &str) -> String {
        if cfg!(target_os = "linux") {
            return url.to_string();
        }
        url.replace("localhost", "host.docker.internal")
            .replace("127.0.0.1", "host.docker.internal")
    }
}

/// Every field optional, so a config file only needs to mention what it
/// wants to override — the `config` crate (already in the teacher's
/// `Cargo.toml`) parses the TOML; applying the overlay onto the
/// in-memory default is plain field-by-field code, not macro magic.
#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    grpc_addr: Option<String>,
    log_http_addr: Option<String>,
    temporal_target: Option<String>,
    temporal_namespace: Option<String>,
    backend_host_port: Option<String>,
}

impl PartialConfig {
    fn apply_to(self, cfg: &mut DaemonConfig) {
        if let Some(v) = self.grpc_addr {
            cfg.grpc_addr = v;
        }
        if let Some(v) = self.log_http_addr {
            cfg.log_http_addr = v;
        }
        if let Some(v) = self.temporal_target {
            cfg.temporal.target = v;
        }
        if let Some(v) = self.temporal_namespace {
            cfg.temporal.namespace = v;
        }
        if let Some(v) = self.backend_host_port {
            cfg.supervisor.backend_host_port = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_under_home() {
        let cfg = DaemonConfig::default();
        assert!(cfg.data_dir().starts_with(&cfg.home_dir));
        assert!(cfg.skills_dir().ends_with("storage/skills"));
    }

    #[test]
    fn host_resolved_url_passes_through_on_linux_only() {
        let cfg = DaemonConfig::default();
        let resolved = cfg.host_resolved_url("http://localhost:11434");
        if cfg!(target_os = "linux") {
            assert_eq!(resolved, "http://localhost:11434");
        } else {
            assert_eq!(resolved, "http://host.docker.internal:11434");
        }
    }
}
