use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use task_orchestrator_core::agent::{Agent, AgentCapacity, AgentPool};
use task_orchestrator_core::config::{ExecutionConfig, LockManagerConfig};
use task_orchestrator_core::error::Result;
use task_orchestrator_core::external::{AgentChannel, AgentResponse};
use task_orchestrator_core::task::{Priority, TaskType};
use task_orchestrator_core::{AtomicTask, ExecutionCoordinator, LockManager};
use tokio::sync::RwLock;
use uuid::Uuid;

struct AlwaysSucceeds {
    sent: AtomicUsize,
}

#[async_trait]
impl AgentChannel for AlwaysSucceeds {
    async fn send_task(&self, _agent_id: Uuid, _task: &AtomicTask) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn receive_response(&self, _agent_id: Uuid, _task_id: Uuid) -> Result<Option<AgentResponse>> {
        Ok(Some(AgentResponse {
            success: true,
            message: "done".to_string(),
            output: None,
        }))
    }
}

fn one_idle_agent_pool() -> Arc<RwLock<AgentPool>> {
    let mut pool = AgentPool::new();
    pool.upsert(Agent::new(
        "agent-1",
        AgentCapacity { max_memory_mb: 4096, max_cpu_weight: 4.0, max_concurrent_tasks: 1 },
    ));
    Arc::new(RwLock::new(pool))
}

#[tokio::test]
async fn dispatch_batch_marks_a_task_completed_via_the_channel() {
    let config = ExecutionConfig {
        coordination_loop_interval_ms: 10,
        agent_response_poll_interval_secs: 0,
        ..Default::default()
    };
    let locks = Arc::new(LockManager::new(LockManagerConfig::default()));
    let channel = Arc::new(AlwaysSucceeds { sent: AtomicUsize::new(0) });
    let agents = one_idle_agent_pool();

    let coordinator = ExecutionCoordinator::new(config, channel.clone(), locks, agents).unwrap();

    let task = AtomicTask::new("t", TaskType::Development, Priority::Medium, 1.0, Uuid::new_v4());
    coordinator.dispatch_batch(vec![task]).await;

    let metrics = coordinator.metrics().await;
    assert_eq!(metrics.completed, 1);
    assert_eq!(channel.sent.load(Ordering::SeqCst), 1);
}

struct AlwaysFails;

#[async_trait]
impl AgentChannel for AlwaysFails {
    async fn send_task(&self, _agent_id: Uuid, _task: &AtomicTask) -> Result<()> {
        Ok(())
    }

    async fn receive_response(&self, _agent_id: Uuid, _task_id: Uuid) -> Result<Option<AgentResponse>> {
        Ok(Some(AgentResponse {
            success: false,
            message: "boom".to_string(),
            output: None,
        }))
    }
}

#[tokio::test]
async fn dispatch_batch_retries_up_to_the_configured_limit() {
    let config = ExecutionConfig {
        max_retry_attempts: 1,
        retry_delay_seconds: 0,
        agent_response_poll_interval_secs: 0,
        ..Default::default()
    };
    let locks = Arc::new(LockManager::new(LockManagerConfig::default()));
    let channel = Arc::new(AlwaysFails);
    let agents = one_idle_agent_pool();

    let coordinator = ExecutionCoordinator::new(config, channel, locks, agents).unwrap();
    let task = AtomicTask::new("t", TaskType::Development, Priority::Medium, 1.0, Uuid::new_v4());
    coordinator.dispatch_batch(vec![task]).await;

    let metrics = coordinator.metrics().await;
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.retried, 1);
}

#[tokio::test]
async fn no_eligible_agent_is_reported_as_resource_exhaustion() {
    let config = ExecutionConfig::default();
    let locks = Arc::new(LockManager::new(LockManagerConfig::default()));
    let channel = Arc::new(AlwaysSucceeds { sent: AtomicUsize::new(0) });
    let agents = Arc::new(RwLock::new(AgentPool::new()));

    let coordinator = ExecutionCoordinator::new(config, channel, locks, agents).unwrap();
    let task = AtomicTask::new("t", TaskType::Development, Priority::Medium, 1.0, Uuid::new_v4());

    // With zero agents, `feasible` returns false and the batch is deferred
    // rather than dispatched; metrics stay untouched.
    coordinator.dispatch_batch(vec![task]).await;
    let metrics = coordinator.metrics().await;
    assert_eq!(metrics.dispatched, 0);
}
