//! Watchdog (spec §4.7 "Watchdog (health monitoring)"): a 10-second probe
//! loop over every registered component, with a startup grace window,
//! liveness-triggered restarts backed by exponential backoff, a rolling
//! 10-minute restart-count ceiling, and a minimum-uptime rule so a
//! crash-loop can't reset its own counter.
//!
//! No teacher analogue; modeled directly on spec.md §4.7's state machine
//! (Starting → Running → Unhealthy → [restart] → Running, or → Failed
//! past the restart ceiling).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::Component;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Starting,
    Running,
    Unhealthy,
    Failed,
}

/// Component-specific probes (spec §4.7 "For each registered component it
/// invokes component-specific probes"). `startup` and `liveness` return
/// `true` for healthy; `readiness` is informational only and never
/// triggers a restart.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn startup(&self) -> bool;
    async fn liveness(&self) -> bool;
    async fn readiness(&self) -> bool {
        self.liveness().await
    }

    /// Re-executes this component's startup contract (spec §4.7 "issues a
    /// restart using the persisted startup configuration").
    async fn restart(&self) -> crate::error::Result<()>;
}

const STARTUP_WINDOW: Duration = Duration::from_secs(30);
const MIN_UPTIME: Duration = Duration::from_secs(10);
const RESTART_WINDOW: Duration = Duration::from_secs(10 * 60);
const MAX_RESTARTS_PER_WINDOW: usize = 10;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

struct Entry {
    probe: Arc<dyn Probe>,
    state: ComponentState,
    started_at: Instant,
    /// Timestamps of restarts within the rolling window (spec §4.7
    /// "Restart attempts are tracked within a rolling 10-minute window").
    restart_history: VecDeque<Instant>,
    backoff: Duration,
}

/// Runs the 10-second probe loop over every registered component (spec
/// §4.7 "The watchdog runs a loop every 10 seconds").
pub struct Watchdog {
    entries: Mutex<Vec<(Component, Entry)>>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Watchdog {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component in the `Starting` state (spec §4.7 step 5).
    pub fn register(&self, component: Component, probe: Arc<dyn Probe>) {
        let entry = Entry {
            probe,
            state: ComponentState::Starting,
            started_at: Instant::now(),
            restart_history: VecDeque::new(),
            backoff: INITIAL_BACKOFF,
        };
        self.entries.lock().expect("watchdog lock poisoned").push((component, entry));
    }

    pub fn state_of(&self, component: Component) -> Option<ComponentState> {
        self.entries
            .lock()
            .expect("watchdog lock poisoned")
            .iter()
            .find(|(c, _)| *c == component)
            .map(|(_, e)| e.state)
    }

    /// Spawns the background probe loop. Returns a handle the daemon holds
    /// so it can abort the task on shutdown.
    pub fn spawn(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                self.tick().await;
            }
        })
    }

    /// Runs one probe-and-restart pass over every registered component.
    /// Exposed separately from `spawn` so tests can drive it
    /// deterministically without waiting on a real 10-second timer.
    pub async fn tick(&self) {
        let components: Vec<Component> = self
            .entries
            .lock()
            .expect("watchdog lock poisoned")
            .iter()
            .map(|(c, _)| *c)
            .collect();

        for component in components {
            self.probe_one(component).await;
        }
    }

    async fn probe_one(&self, component: Component) {
        enum Action {
            None,
            Restart(Duration),
            MarkFailed,
        }

        let (probe, probe_starting, current_state) = {
            let entries = self.entries.lock().expect("watchdog lock poisoned");
            let (_, entry) = entries.iter().find(|(c, _)| *c == component).expect("registered");
            (
                Arc::clone(&entry.probe),
                entry.started_at.elapsed() < STARTUP_WINDOW,
                entry.state,
            )
        };

        if current_state == ComponentState::Failed {
            return;
        }

        let healthy = if probe_starting {
            probe.startup().await
        } else {
            probe.liveness().await
        };

        let action = {
            let mut entries = self.entries.lock().expect("watchdog lock poisoned");
            let (_, entry) = entries.iter_mut().find(|(c, _)| *c == component).expect("registered");

            if healthy {
                if entry.state == ComponentState::Unhealthy && entry.started_at.elapsed() >= MIN_UPTIME {
                    entry.backoff = INITIAL_BACKOFF;
                }
                entry.state = ComponentState::Running;
                Action::None
            } else if probe_starting {
                // Tolerate repeated startup-probe failure during the grace
                // window (spec §4.7 "tolerate repeated failure during this
                // window").
                Action::None
            } else {
                entry.state = ComponentState::Unhealthy;
                warn!(component = component.as_str(), "liveness probe failed");

                let now = Instant::now();
                while let Some(front) = entry.restart_history.front() {
                    if now.duration_since(*front) > RESTART_WINDOW {
                        entry.restart_history.pop_front();
                    } else {
                        break;
                    }
                }

                if entry.restart_history.len() >= MAX_RESTARTS_PER_WINDOW {
                    entry.state = ComponentState::Failed;
                    Action::MarkFailed
                } else {
                    entry.restart_history.push_back(now);
                    let backoff = entry.backoff;
                    entry.backoff = (entry.backoff * 2).min(MAX_BACKOFF);
                    Action::Restart(backoff)
                }
            }
        };

        match action {
            Action::None => {}
            Action::MarkFailed => {
                error!(
                    component = component.as_str(),
                    "more than {MAX_RESTARTS_PER_WINDOW} restarts in the last {RESTART_WINDOW:?}; marking component Failed — manual intervention required"
                );
            }
            Action::Restart(backoff) => {
                info!(component = component.as_str(), backoff_secs = backoff.as_secs(), "restarting component");
                tokio::time::sleep(backoff).await;

                let restart_result = probe.restart().await;

                let mut entries = self.entries.lock().expect("watchdog lock poisoned");
                let (_, entry) = entries.iter_mut().find(|(c, _)| *c == component).expect("registered");
                match restart_result {
                    Ok(()) => {
                        entry.started_at = Instant::now();
                        entry.state = ComponentState::Starting;
                    }
                    Err(err) => {
                        error!(component = component.as_str(), error = %err, "restart attempt failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyProbe {
        liveness_failures_remaining: AtomicUsize,
        restarts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn startup(&self) -> bool {
            true
        }

        async fn liveness(&self) -> bool {
            if self.liveness_failures_remaining.load(Ordering::SeqCst) > 0 {
                self.liveness_failures_remaining.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                true
            }
        }

        async fn restart(&self) -> crate::error::Result<()> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFailingProbe {
        restarts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Probe for AlwaysFailingProbe {
        async fn startup(&self) -> bool {
            true
        }
        async fn liveness(&self) -> bool {
            false
        }
        async fn restart(&self) -> crate::error::Result<()> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn startup_window_tolerates_failed_probes() {
        let watchdog = Watchdog::new();
        let restarts = Arc::new(AtomicUsize::new(0));
        watchdog.register(
            Component::WorkflowRunner,
            Arc::new(FlakyProbe {
                liveness_failures_remaining: AtomicUsize::new(100),
                restarts: restarts.clone(),
            }),
        );
        watchdog.tick().await;
        assert_eq!(watchdog.state_of(Component::WorkflowRunner), Some(ComponentState::Running));
        assert_eq!(restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exceeding_restart_ceiling_marks_component_failed() {
        let watchdog = Watchdog::new();
        let restarts = Arc::new(AtomicUsize::new(0));
        watchdog.register(
            Component::AgentRunner,
            Arc::new(AlwaysFailingProbe { restarts: restarts.clone() }),
        );
        {
            let mut entries = watchdog.entries.lock().unwrap();
            let (_, entry) = entries.iter_mut().find(|(c, _)| *c == Component::AgentRunner).unwrap();
            entry.started_at = Instant::now() - STARTUP_WINDOW - Duration::from_secs(1);
        }

        for _ in 0..(MAX_RESTARTS_PER_WINDOW + 1) {
            // Force each iteration to treat backoff as negligible by resetting it.
            {
                let mut entries = watchdog.entries.lock().unwrap();
                let (_, entry) = entries.iter_mut().find(|(c, _)| *c == Component::AgentRunner).unwrap();
                entry.backoff = Duration::from_millis(1);
            }
            watchdog.tick().await;
        }

        assert_eq!(watchdog.state_of(Component::AgentRunner), Some(ComponentState::Failed));
        assert!(restarts.load(Ordering::SeqCst) <= MAX_RESTARTS_PER_WINDOW as usize);
    }
}
