//! Temporal connection manager (spec §4.3): owns the Temporal client
//! lifecycle for the whole daemon — dial, health probe, reconnect with
//! backoff, worker restart, and creator re-injection into controllers.
//!
//! No direct teacher analogue (the teacher coordinates distributed state
//! over NATS, not Temporal); structured in the teacher's manager style —
//! a registry with a background health-check loop, as in
//! `src/llm/router.rs`'s provider-registry-with-health-check shape —
//! against the real `temporalio-client`/`temporal-sdk-core` crates, the
//! dependency pair used for this exact role by `everruns-everruns` in the
//! pack.

pub mod creator;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

pub use creator::{CreatorHandle, WorkflowCreator, WorkflowCreatorProvider, WorkflowHandle, WorkflowStartRequest};
pub use transport::{TemporalTransport, WorkerSpec};

use crate::config::TemporalConfig;

/// Behind an atomic cell so request paths read it lock-free-ish (an
/// uncontended `RwLock::read` is effectively free; see SPEC_FULL §4.3 for
/// why a lock-free `arc-swap` wasn't pulled in). `None` is the valid
/// "Temporal unavailable" sentinel (§9 "Nil workflow creator" — never a
/// null-object creator that silently succeeds).
type CreatorCell = RwLock<Option<Arc<dyn WorkflowCreator>>>;

/// A component that needs a fresh creator re-injected after reconnect
/// (spec §4.3 step 4: "Re-inject new workflow creators into each
/// controller via their `SetWorkflowCreator` accessors").
pub trait CreatorSink: Send + Sync {
    fn set_workflow_creator(&self, creator: Option<Arc<dyn WorkflowCreator>>);
}

pub struct TemporalManager {
    config: TemporalConfig,
    transport: Arc<dyn TemporalTransport>,
    client_healthy: AtomicBool,
    creator: CreatorCell,
    /// Non-blocking try-lock so a health-probe-triggered reconnect and a
    /// manually-triggered one never run concurrently (spec §4.3
    /// "Reconnect: acquires the reconnection latch using a non-blocking
    /// try-lock; if already running, returns.").
    reconnect_latch: AsyncMutex<()>,
    sinks: RwLock<Vec<Arc<dyn CreatorSink>>>,
    workers: RwLock<Vec<WorkerSpec>>,
}

impl TemporalManager {
    pub fn new(config: TemporalConfig, transport: Arc<dyn TemporalTransport>) -> Arc<Self> {
        Arc::new(TemporalManager {
            config,
            transport,
            client_healthy: AtomicBool::new(false),
            creator: RwLock::new(None),
            reconnect_latch: AsyncMutex::new(()),
            sinks: RwLock::new(Vec::new()),
            workers: RwLock::new(Vec::new()),
        })
    }

    /// Registers a controller to receive creator updates after every
    /// successful reconnect, and immediately gives it whatever creator
    /// is live right now (possibly `None`).
    pub fn register_sink(&self, sink: Arc<dyn CreatorSink>) {
        sink.set_workflow_creator(self.current_creator());
        self.sinks.write().expect("sinks lock poisoned").push(sink);
    }

    pub fn register_worker(&self, spec: WorkerSpec) {
        self.workers.write().expect("workers lock poisoned").push(spec);
    }

    pub fn current_creator(&self) -> Option<Arc<dyn WorkflowCreator>> {
        self.creator.read().expect("creator lock poisoned").clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.client_healthy.load(Ordering::Acquire)
    }

    /// Initial connect at daemon startup (spec §4.3 "Initial connect:
    /// attempts to dial. On failure, logs and leaves the client reference
    /// nil; does not block daemon startup.").
    pub async fn connect_initial(self: &Arc<Self>) {
        match self.transport.dial(&self.config).await {
            Ok(creator) => self.adopt(creator).await,
            Err(err) => {
                warn!(error = %err, "initial Temporal dial failed; starting with no workflow creator");
            }
        }
    }

    /// Spawns the background health-probe loop (spec §4.3 "Health probe").
    /// Returns a handle the daemon holds so it can abort the task on
    /// shutdown.
    pub fn spawn_health_probe(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(15));
            loop {
                interval.tick().await;
                let deadline = Duration::from_secs(5);
                let healthy = manager.transport.describe_namespace(&manager.config, deadline).await.is_ok();
                let was_healthy = manager.client_healthy.swap(healthy, Ordering::AcqRel);
                if was_healthy && !healthy {
                    warn!("Temporal health probe failed; triggering reconnect");
                    manager.clone().reconnect().await;
                } else if !was_healthy && healthy {
                    info!("Temporal health probe recovered");
                }
            }
        })
    }

    /// Reconnect with exponential backoff (spec §4.3 "Reconnect").
    /// Returns immediately if another reconnect attempt is already in
    /// flight.
    pub async fn reconnect(self: Arc<Self>) {
        let Ok(_guard) = self.reconnect_latch.try_lock() else {
            return;
        };

        let mut backoff = Duration::from_secs(1);
        const MAX_BACKOFF: Duration = Duration::from_secs(30);
        loop {
            match self.transport.dial(&self.config).await {
                Ok(creator) => {
                    self.adopt(creator).await;
                    info!("Temporal reconnect succeeded");
                    return;
                }
                Err(err) => {
                    error!(error = %err, backoff_secs = backoff.as_secs(), "Temporal reconnect attempt failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    /// Stops existing workers, starts fresh ones against the new client,
    /// swaps the creator, and re-injects it into every registered sink
    /// (spec §4.3 steps 1-5).
    async fn adopt(self: &Arc<Self>, creator: Arc<dyn WorkflowCreator>) {
        let worker_specs = self.workers.read().expect("workers lock poisoned").clone();
        if let Err(err) = self.transport.restart_workers(&worker_specs).await {
            error!(error = %err, "failed to restart Temporal workers against new client; keeping new creator anyway");
        }

        *self.creator.write().expect("creator lock poisoned") = Some(Arc::clone(&creator));
        self.client_healthy.store(true, Ordering::Release);

        for sink in self.sinks.read().expect("sinks lock poisoned").iter() {
            sink.set_workflow_creator(Some(Arc::clone(&creator)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeCreator;

    #[async_trait]
    impl WorkflowCreator for FakeCreator {
        async fn start(&self, _req: WorkflowStartRequest) -> crate::error::Result<WorkflowHandle> {
            Ok(WorkflowHandle {
                workflow_id: "wf-1".to_string(),
                run_id: "run-1".to_string(),
            })
        }
    }

    struct FlakyTransport {
        dial_attempts: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl TemporalTransport for FlakyTransport {
        async fn dial(&self, _config: &TemporalConfig) -> crate::error::Result<Arc<dyn WorkflowCreator>> {
            let attempt = self.dial_attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first_n {
                return Err(crate::error::StigmerError::unavailable("dial failed"));
            }
            Ok(Arc::new(FakeCreator))
        }

        async fn describe_namespace(
            &self,
            _config: &TemporalConfig,
            _deadline: Duration,
        ) -> crate::error::Result<()> {
            Ok(())
        }

        async fn restart_workers(&self, _specs: &[WorkerSpec]) -> crate::error::Result<()> {
            Ok(())
        }
    }

    struct RecordingSink {
        last: std::sync::Mutex<Option<bool>>,
    }

    impl CreatorSink for RecordingSink {
        fn set_workflow_creator(&self, creator: Option<Arc<dyn WorkflowCreator>>) {
            *self.last.lock().unwrap() = Some(creator.is_some());
        }
    }

    fn test_config() -> TemporalConfig {
        TemporalConfig {
            target: "127.0.0.1:7233".to_string(),
            namespace: "default".to_string(),
            task_queue_prefix: "stigmer".to_string(),
        }
    }

    #[tokio::test]
    async fn failed_initial_connect_leaves_creator_nil() {
        let transport = Arc::new(FlakyTransport {
            dial_attempts: AtomicUsize::new(0),
            fail_first_n: 100,
        });
        let manager = TemporalManager::new(test_config(), transport);
        manager.connect_initial().await;
        assert!(manager.current_creator().is_none());
        assert!(!manager.is_healthy());
    }

    #[tokio::test]
    async fn reconnect_retries_until_dial_succeeds() {
        let transport = Arc::new(FlakyTransport {
            dial_attempts: AtomicUsize::new(0),
            fail_first_n: 2,
        });
        let manager = TemporalManager::new(test_config(), transport);
        manager.clone().reconnect().await;
        assert!(manager.current_creator().is_some());
        assert!(manager.is_healthy());
    }

    #[tokio::test]
    async fn reconnect_reinjects_creator_into_registered_sinks() {
        let transport = Arc::new(FlakyTransport {
            dial_attempts: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let manager = TemporalManager::new(test_config(), transport);
        let sink = Arc::new(RecordingSink {
            last: std::sync::Mutex::new(None),
        });
        manager.register_sink(sink.clone());
        assert_eq!(*sink.last.lock().unwrap(), Some(false));

        manager.clone().reconnect().await;
        assert_eq!(*sink.last.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn concurrent_reconnect_attempts_collapse_to_one_dial_round() {
        let transport = Arc::new(FlakyTransport {
            dial_attempts: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let manager = TemporalManager::new(test_config(), transport.clone());
        let (a, b) = tokio::join!(manager.clone().reconnect(), manager.clone().reconnect());
        let _ = (a, b);
        // One of the two calls returns immediately via the try-lock guard
        // (spec §4.3); at most a small, bounded number of dial attempts
        // happen, not an unbounded pile-up.
        assert!(transport.dial_attempts.load(Ordering::SeqCst) <= 2);
    }
}
