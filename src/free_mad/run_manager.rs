//! Background run management: launches a debate on a spawned task and
//! bridges its event stream into a queue consumers can drain without
//! blocking on the run itself.

use crate::free_mad::agent::Agent;
use crate::free_mad::config::Config;
use crate::free_mad::event::{RunEvent, RunEventKind, RunObserver};
use crate::free_mad::orchestrator::Orchestrator;
use crate::free_mad::transcript;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn is_terminal(kind: RunEventKind) -> bool {
    matches!(
        kind,
        RunEventKind::RunCompleted | RunEventKind::RunFailed | RunEventKind::RunBudgetExceeded
    )
}

struct RunState {
    completed: bool,
}

/// Forwards every event onto an unbounded queue and reports terminal
/// events back to the manager so it can flip the run's liveness bit.
struct QueueObserver {
    sender: UnboundedSender<RunEvent>,
    on_terminal: Arc<dyn Fn(&str) + Send + Sync>,
}

impl RunObserver for QueueObserver {
    fn on_event(&self, event: &RunEvent) -> Result<(), String> {
        let terminal = is_terminal(event.kind);
        self.sender
            .send(event.clone())
            .map_err(|_| "run event queue receiver dropped".to_string())?;
        if terminal {
            (self.on_terminal)(&event.run_id);
        }
        Ok(())
    }
}

/// In-process registry of live and completed runs. Each run executes on
/// its own spawned task; callers drain its queue (e.g. to bridge into a
/// WebSocket stream) without ever awaiting the run itself.
pub struct RunManager {
    runs: Mutex<HashMap<String, RunState>>,
    queues: Mutex<HashMap<String, UnboundedReceiver<RunEvent>>>,
}

impl RunManager {
    pub fn new() -> Self {
        RunManager {
            runs: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a new run in the background and returns its id immediately.
    /// `agents` is the fully constructed fleet for this run; this crate
    /// does not wire agent adapters from `cfg.agents` itself (§4.10).
    pub async fn start_run(
        self: &Arc<Self>,
        cfg: Config,
        agents: Vec<Arc<dyn Agent>>,
        requirement: String,
        max_rounds: usize,
    ) -> String {
        let run_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut runs = self.runs.lock().await;
            runs.insert(run_id.clone(), RunState { completed: false });
        }
        {
            let mut queues = self.queues.lock().await;
            queues.insert(run_id.clone(), rx);
        }

        let manager = self.clone();
        let run_id_for_task = run_id.clone();
        let tx_for_worker = tx.clone();

        tokio::spawn(async move {
            let on_terminal_manager = manager.clone();
            let observer = Arc::new(QueueObserver {
                sender: tx_for_worker.clone(),
                on_terminal: Arc::new(move |id: &str| {
                    let manager = on_terminal_manager.clone();
                    let id = id.to_string();
                    tokio::spawn(async move {
                        manager.mark_completed(&id).await;
                    });
                }),
            });

            let orch = match Orchestrator::new(cfg.clone(), agents) {
                Ok(orch) => orch.with_observer(observer),
                Err(err) => {
                    log::error!("run {} failed to construct orchestrator: {}", run_id_for_task, err);
                    let _ = tx_for_worker.send(RunEvent::run_failed(run_id_for_task.clone(), now_ms(), err.to_string()));
                    manager.mark_completed(&run_id_for_task).await;
                    return;
                }
            };

            match orch.run(&requirement, max_rounds, Some(run_id_for_task.clone())).await {
                Ok(result) => {
                    if cfg.output.save_transcript {
                        if let Err(err) = transcript::save_transcript(&result, &cfg.output.format, &cfg.output.transcript_dir) {
                            log::warn!("run {} completed but transcript write failed: {}", run_id_for_task, err);
                        }
                    }
                }
                Err(err) => {
                    log::error!("run {} failed: {}", run_id_for_task, err);
                    let _ = tx_for_worker.send(RunEvent::run_failed(run_id_for_task.clone(), now_ms(), err.to_string()));
                }
            }
            manager.mark_completed(&run_id_for_task).await;
        });

        run_id
    }

    async fn mark_completed(&self, run_id: &str) {
        let mut runs = self.runs.lock().await;
        if let Some(state) = runs.get_mut(run_id) {
            state.completed = true;
        }
    }

    /// Takes ownership of the run's event receiver so a caller can drain
    /// it. Returns `None` if the run is unknown or its queue was already
    /// taken by a previous call.
    pub async fn take_queue(&self, run_id: &str) -> Option<UnboundedReceiver<RunEvent>> {
        let mut queues = self.queues.lock().await;
        queues.remove(run_id)
    }

    pub async fn is_completed(&self, run_id: &str) -> bool {
        let runs = self.runs.lock().await;
        runs.get(run_id).map(|s| s.completed).unwrap_or(false)
    }
}

impl Default for RunManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::free_mad::agent::{MockAgent, MockStep};

    fn cfg_with_tempdir() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.output.transcript_dir = dir.path().to_string_lossy().to_string();
        std::mem::forget(dir);
        cfg
    }

    #[tokio::test]
    async fn start_run_completes_and_drains_events() {
        let manager = Arc::new(RunManager::new());
        let cfg = cfg_with_tempdir();
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(MockAgent::new("a1", vec![MockStep::generate("ANS")]))];
        let run_id = manager.start_run(cfg, agents, "req".to_string(), 0).await;

        let mut rx = manager.take_queue(&run_id).await.expect("queue present");
        let mut saw_completed = false;
        for _ in 0..20 {
            if let Some(event) = rx.recv().await {
                if event.kind == RunEventKind::RunCompleted {
                    saw_completed = true;
                    break;
                }
            } else {
                break;
            }
        }
        assert!(saw_completed);
        assert!(manager.is_completed(&run_id).await);
    }

    #[tokio::test]
    async fn unknown_run_id_reports_not_completed_and_no_queue() {
        let manager = RunManager::new();
        assert!(!manager.is_completed("nope").await);
        assert!(manager.take_queue("nope").await.is_none());
    }
}
