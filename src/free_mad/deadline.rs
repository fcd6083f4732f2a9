//! Soft/hard deadline collection with quorum semantics.
//!
//! This is the one genuinely tricky concurrency primitive in the crate:
//! wait for agents to finish up to a soft deadline *or* until a quorum of
//! them have answered, whichever comes first; then keep waiting on the
//! stragglers up to a hard deadline, after which anything still
//! outstanding is abandoned (not cancelled — just no longer awaited).

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;

/// The result of one [`collect`] call.
pub struct DeadlineOutcome<T> {
    /// Results keyed by agent id, for every agent whose work finished
    /// (successfully or with an error) before abandonment.
    pub completed: HashMap<String, Result<T, String>>,
    pub deadline_hit_soft: bool,
    pub deadline_hit_hard: bool,
    /// Agents whose work was still outstanding at the hard deadline (or
    /// whose completion we could not attribute after a task panic).
    pub still_running: Vec<String>,
}

/// Waits on `tasks` (a `JoinSet` whose tasks each resolve to
/// `Result<T, String>`, paired with the `agent_id` each task was spawned
/// for via `id_to_agent`) according to the soft/hard/quorum contract.
///
/// Measured from the moment this function is called, matching the
/// reference semantics of per-agent deadlines being measured from the
/// start of the collector's wait within a round, not from task submission.
pub async fn collect<T: Send + 'static>(
    mut tasks: JoinSet<Result<T, String>>,
    id_to_agent: HashMap<Id, String>,
    soft: Duration,
    hard: Duration,
    min_agents: usize,
) -> DeadlineOutcome<T> {
    let start = Instant::now();
    let mut completed: HashMap<String, Result<T, String>> = HashMap::new();
    let mut remaining: HashSet<String> = id_to_agent.values().cloned().collect();

    let mut deadline_hit_soft = false;
    loop {
        let elapsed = start.elapsed();
        if elapsed >= soft {
            break;
        }
        let budget = soft - elapsed;
        match tokio::time::timeout(budget, tasks.join_next_with_id()).await {
            Ok(Some(Ok((task_id, result)))) => {
                if let Some(agent_id) = id_to_agent.get(&task_id) {
                    remaining.remove(agent_id);
                    completed.insert(agent_id.clone(), result);
                }
            }
            Ok(Some(Err(join_err))) => {
                if let Some(agent_id) = id_to_agent.get(&join_err.id()) {
                    remaining.remove(agent_id);
                    completed.insert(agent_id.clone(), Err(join_err.to_string()));
                }
            }
            Ok(None) => break,
            Err(_elapsed) => break,
        }
        if completed.len() >= min_agents {
            break;
        }
    }
    if completed.len() < min_agents {
        deadline_hit_soft = true;
    }

    let mut deadline_hit_hard = false;
    while !remaining.is_empty() {
        let elapsed = start.elapsed();
        if elapsed >= hard {
            deadline_hit_hard = true;
            break;
        }
        let budget = hard - elapsed;
        match tokio::time::timeout(budget, tasks.join_next_with_id()).await {
            Ok(Some(Ok((task_id, result)))) => {
                if let Some(agent_id) = id_to_agent.get(&task_id) {
                    remaining.remove(agent_id);
                    completed.insert(agent_id.clone(), result);
                }
            }
            Ok(Some(Err(join_err))) => {
                if let Some(agent_id) = id_to_agent.get(&join_err.id()) {
                    remaining.remove(agent_id);
                    completed.insert(agent_id.clone(), Err(join_err.to_string()));
                }
            }
            Ok(None) => break,
            Err(_elapsed) => {
                deadline_hit_hard = true;
                break;
            }
        }
    }

    DeadlineOutcome {
        completed,
        deadline_hit_soft,
        deadline_hit_hard,
        still_running: remaining.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::JoinSet;

    async fn spawn_delay(set: &mut JoinSet<Result<u32, String>>, ms: u64, value: u32) -> Id {
        let handle = set.spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(value)
        });
        handle.id()
    }

    #[tokio::test]
    async fn quorum_met_before_soft_deadline_stops_waiting() {
        let mut set = JoinSet::new();
        let mut ids = HashMap::new();
        let id_a = spawn_delay(&mut set, 5, 1).await;
        let id_b = spawn_delay(&mut set, 5, 2).await;
        ids.insert(id_a, "a".to_string());
        ids.insert(id_b, "b".to_string());

        let outcome = collect(
            set,
            ids,
            Duration::from_millis(500),
            Duration::from_millis(1000),
            2,
        )
        .await;

        assert!(!outcome.deadline_hit_soft);
        assert!(!outcome.deadline_hit_hard);
        assert_eq!(outcome.completed.len(), 2);
    }

    #[tokio::test]
    async fn soft_deadline_hit_but_hard_not_hit() {
        let mut set = JoinSet::new();
        let mut ids = HashMap::new();
        let id_a = spawn_delay(&mut set, 20, 1).await;
        let id_b = spawn_delay(&mut set, 150, 2).await;
        ids.insert(id_a, "fast".to_string());
        ids.insert(id_b, "slow".to_string());

        let outcome = collect(
            set,
            ids,
            Duration::from_millis(100),
            Duration::from_millis(300),
            2,
        )
        .await;

        assert!(outcome.deadline_hit_soft);
        assert!(!outcome.deadline_hit_hard);
        assert_eq!(outcome.completed.len(), 2);
    }

    #[tokio::test]
    async fn hard_deadline_abandons_stragglers() {
        let mut set = JoinSet::new();
        let mut ids = HashMap::new();
        let id_a = spawn_delay(&mut set, 10, 1).await;
        let id_b = spawn_delay(&mut set, 5_000, 2).await;
        ids.insert(id_a, "fast".to_string());
        ids.insert(id_b, "slow".to_string());

        let outcome = collect(
            set,
            ids,
            Duration::from_millis(30),
            Duration::from_millis(60),
            2,
        )
        .await;

        assert!(outcome.deadline_hit_soft);
        assert!(outcome.deadline_hit_hard);
        assert_eq!(outcome.completed.len(), 1);
        assert_eq!(outcome.still_running, vec!["slow".to_string()]);
    }
}
