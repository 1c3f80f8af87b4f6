//! Subprocess / container supervisor (spec §4.7): owns the lifecycle of
//! the workflow-runner subprocess and the agent-runner sandboxed
//! container, from embedded-binary extraction through graceful shutdown.
//! `watchdog` layers health-monitored restart on top; `logs` layers the
//! tailing behavior `stigmer server logs` and the local HTTP log endpoint
//! both read from.
//!
//! No direct teacher analogue — the teacher never supervises
//! subprocesses. Structured on `groblegark-oddjobs`'s standalone
//! `Config`/`DaemonState`/lock-file lifecycle shape, built on this
//! module's own `process`/`container`/`lockfile` primitives.

pub mod container;
pub mod lockfile;
pub mod logs;
pub mod process;
pub mod watchdog;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::error::{Result, StigmerError};
use container::ContainerSupervisor;
use lockfile::Lockfile;
use process::SupervisedProcess;

/// The three subordinate components this daemon owns (spec §4.7
/// "Startup contract (per component)" enumerates the server itself, the
/// workflow-runner subprocess, and the agent-runner container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Server,
    WorkflowRunner,
    AgentRunner,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Server => "server",
            Component::WorkflowRunner => "workflow-runner",
            Component::AgentRunner => "agent-runner",
        }
    }
}

/// Embedded per-platform helper binaries (spec §4.7 step 1: "Binaries are
/// shipped per-platform (`<os>_<arch>/`) inside the daemon binary via a
/// compile-time embed directive"). `rust-embed` is the pack's precedent
/// for this exact role (`jdsingh122918-forge`'s embedded-UI factory
/// module).
#[derive(RustEmbed)]
#[folder = "assets/bin/"]
struct EmbeddedBinaries;

fn platform_dir() -> String {
    format!("{}_{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Persisted startup parameters so the watchdog can restart a component
/// with identical arguments (spec §4.7 step 4, `startup-config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupConfig {
    pub server_pid: Option<i32>,
    pub workflow_runner_pid: Option<i32>,
    pub agent_runner_container_id: Option<String>,
    pub agent_runner_image: Option<String>,
    pub environment: HashMap<String, String>,
}

impl StartupConfig {
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(StigmerError::from),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StartupConfig::default()),
            Err(err) => Err(StigmerError::internal(format!("reading startup config: {err}"))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StigmerError::internal(format!("creating startup config directory: {err}")))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)
            .map_err(|err| StigmerError::internal(format!("writing startup config: {err}")))
    }
}

/// Version suffix that marks a development build (spec §4.7 "or if in
/// development mode, a sentinel value forces re-extract every start"):
/// any `CARGO_PKG_VERSION` ending in this suffix never compares equal to
/// the on-disk marker, so extraction always re-runs.
const DEV_VERSION_SENTINEL: &str = "-dev";

/// Extracts the named embedded binary to `bin_dir/<name>` with mode
/// `0755`, skipping the write if `bin_dir/.version` already matches the
/// running build's version (spec §4.7 step 1), unless `force` is set or
/// the running build's version carries the development sentinel suffix.
pub fn extract_embedded_binaries(bin_dir: &Path, force: bool) -> Result<()> {
    std::fs::create_dir_all(bin_dir)
        .map_err(|err| StigmerError::internal(format!("creating bin directory: {err}")))?;

    let version_path = bin_dir.join(".version");
    let current_version = env!("CARGO_PKG_VERSION");
    let is_dev_build = current_version.ends_with(DEV_VERSION_SENTINEL);
    let up_to_date = !force
        && !is_dev_build
        && std::fs::read_to_string(&version_path)
            .map(|v| v.trim() == current_version)
            .unwrap_or(false);
    if up_to_date {
        return Ok(());
    }

    let prefix = format!("{}/", platform_dir());
    let mut extracted_any = false;
    for path in EmbeddedBinaries::iter() {
        let Some(name) = path.strip_prefix(&prefix) else {
            continue;
        };
        let Some(asset) = EmbeddedBinaries::get(&path) else {
            continue;
        };
        let dest = bin_dir.join(name);
        write_executable(&dest, &asset.data)?;
        extracted_any = true;
        info!(binary = name, dest = %dest.display(), "extracted embedded binary");
    }

    if !extracted_any {
        warn!(platform = %platform_dir(), "no embedded binaries found for this platform; expecting STIGMER_*_BIN overrides");
    }

    std::fs::write(&version_path, current_version)
        .map_err(|err| StigmerError::internal(format!("writing bin version marker: {err}")))?;
    Ok(())
}

#[cfg(unix)]
fn write_executable(dest: &Path, bytes: &[u8]) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o755)
        .open(dest)
        .map_err(|err| StigmerError::internal(format!("opening {}: {err}", dest.display())))?;
    use std::io::Write;
    file.write_all(bytes)
        .map_err(|err| StigmerError::internal(format!("writing {}: {err}", dest.display())))
}

#[cfg(not(unix))]
fn write_executable(dest: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(dest, bytes).map_err(|err| StigmerError::internal(format!("writing {}: {err}", dest.display())))
}

/// Resolves the workflow-runner binary path: a developer override
/// (`STIGMER_WORKFLOW_RUNNER_BIN`) takes precedence over the extracted
/// path under `bin_dir` (spec §6 env var table).
pub fn workflow_runner_bin_path(config: &DaemonConfig) -> PathBuf {
    config
        .supervisor
        .workflow_runner_bin_override
        .clone()
        .unwrap_or_else(|| config.bin_dir().join("workflow-runner"))
}

/// Owns the whole-daemon subprocess/container lifecycle: lock files, the
/// workflow-runner subprocess, the agent-runner container, and the
/// persisted startup configuration the watchdog restarts from.
pub struct Supervisor {
    config: DaemonConfig,
    temporal_lock: Option<Lockfile>,
    workflow_runner: std::sync::Mutex<Option<SupervisedProcess>>,
    agent_runner: ContainerSupervisor,
}

impl Supervisor {
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let agent_runner = ContainerSupervisor::connect(config.supervisor.agent_runner_container_name.clone())?;
        Ok(Supervisor {
            config,
            temporal_lock: None,
            workflow_runner: std::sync::Mutex::new(None),
            agent_runner,
        })
    }

    /// Acquires the Temporal singleton lock (spec §4.7 step 2). Must be
    /// called once at daemon start before anything dials Temporal.
    pub fn acquire_temporal_lock(&mut self) -> Result<()> {
        self.temporal_lock = Some(Lockfile::acquire(&self.config.temporal_lock_path())?);
        Ok(())
    }

    /// Starts the workflow-runner subprocess (spec §4.7 steps 1-5):
    /// extracts the embedded binary if needed, cleans up a stale PID file,
    /// spawns in its own process group, and persists startup config.
    pub fn start_workflow_runner(&self) -> Result<i32> {
        let bin_dir = self.config.bin_dir();
        extract_embedded_binaries(&bin_dir, false)?;

        let bin = workflow_runner_bin_path(&self.config);
        let pid_path = self.config.home_dir.join("workflow-runner.pid");
        process::cleanup_stale(&pid_path, |pid| {
            // A workflow-runner that's been alive less than its own
            // minimum-uptime window is assumed to still be the process we
            // expect; anything else is treated as stale by liveness probe
            // failures instead, so here we only check existence.
            process::process_exists(pid)
        })?;

        let log_path = self.config.logs_dir().join("workflow-runner.log");
        let proc = process::spawn_in_process_group(&bin, &[], &log_path)?;
        process::write_pid_file(&pid_path, proc.pid)?;

        let mut startup = StartupConfig::load(&self.config.startup_config_path())?;
        startup.workflow_runner_pid = Some(proc.pid);
        startup.save(&self.config.startup_config_path())?;

        *self.workflow_runner.lock().expect("workflow runner lock poisoned") = Some(proc);
        Ok(self.workflow_runner_pid().expect("just set"))
    }

    pub fn workflow_runner_pid(&self) -> Option<i32> {
        self.workflow_runner
            .lock()
            .expect("workflow runner lock poisoned")
            .as_ref()
            .map(|p| p.pid)
    }

    /// Starts the agent-runner sandboxed container with the environment
    /// spec §4.7 requires (`MODE`, `STIGMER_BACKEND_ENDPOINT`, LLM provider
    /// config rewritten for container networking).
    pub async fn start_agent_runner(&self, image: &str, backend_port: u16) -> Result<String> {
        let backend_endpoint = self.config.host_resolved_url(&format!(
            "http://{}",
            self.config.supervisor.backend_host_port
        ));
        let mut env = vec![
            ("MODE".to_string(), "local".to_string()),
            ("STIGMER_BACKEND_ENDPOINT".to_string(), strip_scheme(&backend_endpoint)),
        ];
        if let Some(ollama_url) = &self.config.llm.ollama_base_url {
            env.push(("OLLAMA_BASE_URL".to_string(), self.config.host_resolved_url(ollama_url)));
        }

        let container_id = self.agent_runner.run(image, &env, backend_port).await?;

        let mut startup = StartupConfig::load(&self.config.startup_config_path())?;
        startup.agent_runner_container_id = Some(container_id.clone());
        startup.agent_runner_image = Some(image.to_string());
        startup.environment = env.into_iter().collect();
        startup.save(&self.config.startup_config_path())?;

        Ok(container_id)
    }

    pub fn agent_runner(&self) -> &ContainerSupervisor {
        &self.agent_runner
    }

    /// Graceful shutdown (spec §4.7 "Graceful shutdown"): SIGTERM then
    /// SIGKILL the workflow-runner's process group, `docker stop` the
    /// agent-runner, and release every lock (the `Lockfile`'s `Drop`
    /// releases it; dropping `self` after this call is sufficient).
    pub async fn shutdown(&self, deadline: Duration) {
        if let Some(proc) = self.workflow_runner.lock().expect("workflow runner lock poisoned").take() {
            process::terminate_process_group(proc.pid, deadline);
        }
        if let Err(err) = self.agent_runner.stop(deadline.as_secs() as i64).await {
            warn!(error = %err, "failed to stop agent-runner container during shutdown");
        }
    }
}

/// `host_resolved_url` produces a scheme-qualified URL for LLM providers;
/// `STIGMER_BACKEND_ENDPOINT` is documented as a bare `host:port` (spec
/// §4.7 "case-correct variable name is critical").
fn strip_scheme(url: &str) -> String {
    url.trim_start_matches("http://").trim_start_matches("https://").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("startup-config.json");
        let mut cfg = StartupConfig::default();
        cfg.workflow_runner_pid = Some(4242);
        cfg.save(&path).unwrap();

        let loaded = StartupConfig::load(&path).unwrap();
        assert_eq!(loaded.workflow_runner_pid, Some(4242));
    }

    #[test]
    fn missing_startup_config_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let loaded = StartupConfig::load(&path).unwrap();
        assert!(loaded.workflow_runner_pid.is_none());
    }

    #[test]
    fn backend_endpoint_strips_scheme() {
        assert_eq!(strip_scheme("http://127.0.0.1:7233"), "127.0.0.1:7233");
        assert_eq!(strip_scheme("https://host.docker.internal:7233"), "host.docker.internal:7233");
    }
}
