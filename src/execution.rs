//! Execution Coordinator: dispatches ready batches to
//! agents, enforces ordered lock acquisition around each execution, retries
//! transient failures, and tracks agent liveness via heartbeats.
//!
//! Grounded on `agent-orchestrator::execution::{ExecutionEngine,
//! ExecutionContext}` for the start/stop lifecycle and coordination loop
//! shape, and on `agent-orchestrator::monitor::ResourceMonitor` for the
//! periodic resource-sampling task run alongside it. Retry/backoff follows
//! `agent-orchestrator::recovery::RecoveryManager`'s fixed-delay retry
//! counter rather than its circuit breaker (no circuit-breaker concept here,
//! only a bounded per-task retry count).

use crate::agent::{Agent, AgentPool, AgentStatus};
use crate::config::{ExecutionConfig, TaskTypeResources};
use crate::error::{OrchestrationError, Result};
use crate::external::AgentChannel;
use crate::lock::{resource_name, AcquireOptions, LockManager, LockMode};
use crate::task::{AtomicTask, TaskType};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// Status an in-flight or finished execution can be queried for via
/// `get_task_execution_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskExecutionStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl From<ExecutionOutcome> for TaskExecutionStatus {
    fn from(o: ExecutionOutcome) -> Self {
        match o {
            ExecutionOutcome::Completed => TaskExecutionStatus::Completed,
            ExecutionOutcome::Failed => TaskExecutionStatus::Failed,
            ExecutionOutcome::TimedOut => TaskExecutionStatus::TimedOut,
            ExecutionOutcome::Cancelled => TaskExecutionStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub task_id: Uuid,
    pub agent_id: Option<Uuid>,
    pub outcome: Option<ExecutionOutcome>,
    pub attempt: u32,
    pub at: chrono::DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub retried: u64,
    pub cancelled: u64,
}

/// Hook hung off lifecycle transitions; failures are isolated per-hook so
/// one bad hook cannot abort the coordination loop.
#[async_trait::async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn on_event(&self, event: &ExecutionEvent);
}

struct TaskAttempt {
    attempts: u32,
}

/// Bookkeeping for a task currently (or most recently) running through
/// `execute_task`, queryable via `get_task_execution_status` and the target
/// of `cancel_execution`/`retry_execution`.
struct ActiveExecution {
    task: AtomicTask,
    agent_id: Option<Uuid>,
    status: TaskExecutionStatus,
    cancel_requested: Arc<AtomicBool>,
}

pub struct ExecutionCoordinator<C: AgentChannel> {
    config: ExecutionConfig,
    channel: Arc<C>,
    locks: Arc<LockManager>,
    agents: Arc<RwLock<AgentPool>>,
    attempts: RwLock<HashMap<Uuid, TaskAttempt>>,
    active_executions: RwLock<HashMap<Uuid, ActiveExecution>>,
    metrics: RwLock<ExecutionMetrics>,
    hooks: RwLock<Vec<Arc<dyn LifecycleHook>>>,
    events_tx: mpsc::UnboundedSender<ExecutionEvent>,
    events_rx: RwLock<Option<mpsc::UnboundedReceiver<ExecutionEvent>>>,
    running: AtomicBool,
    loop_handle: RwLock<Option<JoinHandle<()>>>,
    lock_sweep_handle: RwLock<Option<JoinHandle<()>>>,
}

impl<C: AgentChannel + 'static> ExecutionCoordinator<C> {
    pub fn new(config: ExecutionConfig, channel: Arc<C>, locks: Arc<LockManager>, agents: Arc<RwLock<AgentPool>>) -> Result<Arc<Self>> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Arc::new(Self {
            config,
            channel,
            locks,
            agents,
            attempts: RwLock::new(HashMap::new()),
            active_executions: RwLock::new(HashMap::new()),
            metrics: RwLock::new(ExecutionMetrics::default()),
            hooks: RwLock::new(Vec::new()),
            events_tx: tx,
            events_rx: RwLock::new(Some(rx)),
            running: AtomicBool::new(false),
            loop_handle: RwLock::new(None),
            lock_sweep_handle: RwLock::new(None),
        }))
    }

    pub async fn register_hook(&self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.write().await.push(hook);
    }

    /// Takes ownership of the event receiver so callers can drive their own
    /// fan-out (logging, metrics sinks); may only be called once.
    pub async fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<ExecutionEvent>> {
        self.events_rx.write().await.take()
    }

    pub async fn metrics(&self) -> ExecutionMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn register_agent(&self, agent: Agent) {
        self.agents.write().await.upsert(agent);
    }

    pub async fn unregister_agent(&self, agent_id: Uuid) {
        self.agents.write().await.agents.remove(&agent_id);
    }

    pub async fn get_task_execution_status(&self, task_id: Uuid) -> Option<TaskExecutionStatus> {
        self.active_executions.read().await.get(&task_id).map(|e| e.status)
    }

    /// Requests cancellation of a running execution. Idempotent: a second
    /// call against an execution that is no longer `Running` (including one
    /// already cancelled) is a no-op and emits nothing, so exactly one
    /// `Cancelled` event is ever produced per execution.
    pub async fn cancel_execution(&self, task_id: Uuid) -> bool {
        let (task, agent_id, already_requested) = {
            let mut active = self.active_executions.write().await;
            let Some(exec) = active.get_mut(&task_id) else {
                return false;
            };
            if !matches!(exec.status, TaskExecutionStatus::Running) {
                return false;
            }
            let already_requested = exec.cancel_requested.swap(true, Ordering::SeqCst);
            exec.status = TaskExecutionStatus::Cancelled;
            (exec.task.clone(), exec.agent_id, already_requested)
        };

        if already_requested {
            return false;
        }

        self.metrics.write().await.cancelled += 1;
        self.emit(&task, agent_id, Some(ExecutionOutcome::Cancelled), 0, "execution cancelled".into())
            .await;
        true
    }

    /// Re-dispatches a task whose most recent execution ended in `Failed`,
    /// `TimedOut`, or `Cancelled`. Resets its attempt counter and spawns a
    /// fresh `execute_task` run.
    pub async fn retry_execution(self: &Arc<Self>, task_id: Uuid) -> Result<()> {
        let task = {
            let active = self.active_executions.read().await;
            let exec = active.get(&task_id).ok_or_else(|| {
                OrchestrationError::invariant(
                    "ExecutionCoordinator",
                    "retry_execution",
                    "no execution recorded for task",
                )
            })?;
            if !matches!(
                exec.status,
                TaskExecutionStatus::Failed | TaskExecutionStatus::TimedOut | TaskExecutionStatus::Cancelled
            ) {
                return Err(OrchestrationError::invariant(
                    "ExecutionCoordinator",
                    "retry_execution",
                    "execution is not in a retryable state",
                ));
            }
            exec.task.clone()
        };

        self.attempts.write().await.remove(&task_id);
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.execute_task(task).await;
        });
        Ok(())
    }

    /// Starts the background coordination loop and resource/heartbeat
    /// monitors (`start`). Idempotent: calling twice while running
    /// is a no-op.
    pub async fn start(self: &Arc<Self>, ready_batches: Arc<RwLock<Vec<Vec<Uuid>>>>, tasks: Arc<RwLock<HashMap<Uuid, AtomicTask>>>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let coordinator = Arc::clone(self);
        let loop_tasks = Arc::clone(&tasks);
        let handle = tokio::spawn(async move {
            coordinator.coordination_loop(ready_batches, loop_tasks).await;
        });
        *self.loop_handle.write().await = Some(handle);

        let heartbeat_coordinator = Arc::clone(self);
        tokio::spawn(async move {
            heartbeat_coordinator.heartbeat_monitor().await;
        });

        let resource_coordinator = Arc::clone(self);
        tokio::spawn(async move {
            resource_coordinator.resource_monitor().await;
        });

        *self.lock_sweep_handle.write().await = Some(self.locks.spawn_cleanup_sweeper());

        info!("execution coordinator started");
        Ok(())
    }

    /// Cancels every in-flight execution and waits (bounded by
    /// `start_timeout_secs`) for them to settle before tearing down the
    /// background loops.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let running_ids: Vec<Uuid> = self
            .active_executions
            .read()
            .await
            .iter()
            .filter(|(_, e)| matches!(e.status, TaskExecutionStatus::Running))
            .map(|(id, _)| *id)
            .collect();
        for id in running_ids {
            self.cancel_execution(id).await;
        }

        // Cancellation is cooperative: a task mid-dispatch only notices
        // `cancel_requested` at the top of its next retry attempt. Give
        // in-flight attempts a bounded grace period to wind down rather
        // than aborting their task handles outright.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.start_timeout_secs.max(1));
        loop {
            let all_settled = !self
                .active_executions
                .read()
                .await
                .values()
                .any(|e| matches!(e.status, TaskExecutionStatus::Running) && !e.cancel_requested.load(Ordering::SeqCst));
            if all_settled || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Some(handle) = self.loop_handle.write().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.lock_sweep_handle.write().await.take() {
            handle.abort();
        }
        info!("execution coordinator stopped");
    }

    async fn coordination_loop(self: Arc<Self>, ready_batches: Arc<RwLock<Vec<Vec<Uuid>>>>, tasks: Arc<RwLock<HashMap<Uuid, AtomicTask>>>) {
        let interval = Duration::from_millis(self.config.coordination_loop_interval_ms);
        while self.running.load(Ordering::SeqCst) {
            let batch = {
                let mut batches = ready_batches.write().await;
                if batches.is_empty() {
                    None
                } else {
                    Some(batches.remove(0))
                }
            };

            if let Some(batch) = batch {
                let snapshot: Vec<AtomicTask> = {
                    let tasks = tasks.read().await;
                    batch
                        .iter()
                        .filter_map(|id| tasks.get(id).cloned())
                        .collect()
                };
                self.dispatch_batch(snapshot).await;
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Dispatches every task in a batch concurrently, each under its own
    /// retry/timeout/lock protocol (`executeBatch`).
    pub async fn dispatch_batch(self: &Arc<Self>, batch: Vec<AtomicTask>) {
        if batch.is_empty() {
            return;
        }
        if !self.feasible(&batch).await {
            warn!(batch_size = batch.len(), "batch infeasible under current resource budget; deferring");
            return;
        }

        self.metrics.write().await.dispatched += batch.len() as u64;

        let mut handles = Vec::with_capacity(batch.len());
        for task in batch {
            let coordinator = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                coordinator.execute_task(task).await;
            }));
        }
        futures::future::join_all(handles).await;
    }

    /// Simulates assigning every task in the batch to some idle agent,
    /// consuming each candidate's memory/cpu/slot capacity in turn so a
    /// later task in the batch cannot be double-counted against the same
    /// headroom an earlier task already claimed.
    async fn feasible(&self, batch: &[AtomicTask]) -> bool {
        let agents = self.agents.read().await;
        let mut sim: HashMap<Uuid, (u64, f64, usize)> = agents
            .agents
            .values()
            .filter(|a| a.is_idle())
            .map(|a| (a.id, (a.current_usage.memory_mb, a.current_usage.cpu_weight, a.current_usage.active_tasks)))
            .collect();

        for task in batch {
            let quota = task_quota(&self.config, task.task_type);
            let candidate = agents
                .agents
                .values()
                .filter(|a| sim.contains_key(&a.id) && a.supports(task.task_type))
                .find(|a| {
                    let (mem, cpu, active) = sim[&a.id];
                    active < a.capacity.max_concurrent_tasks
                        && mem + quota.memory_mb <= a.capacity.max_memory_mb
                        && cpu + quota.cpu_weight <= a.capacity.max_cpu_weight
                })
                .map(|a| a.id);

            match candidate {
                Some(id) => {
                    let entry = sim.get_mut(&id).expect("candidate drawn from sim keys");
                    entry.0 += quota.memory_mb;
                    entry.1 += quota.cpu_weight;
                    entry.2 += 1;
                }
                None => return false,
            }
        }
        true
    }

    /// Single-task execution protocol: hold the task's execution lock for
    /// the whole lifetime of the (possibly multi-attempt) execution, then
    /// delegate per-attempt agent/file locking to `run_with_retries`.
    async fn execute_task(self: Arc<Self>, task: AtomicTask) {
        let cancel_requested = Arc::new(AtomicBool::new(false));
        self.active_executions.write().await.insert(
            task.id,
            ActiveExecution {
                task: task.clone(),
                agent_id: None,
                status: TaskExecutionStatus::Running,
                cancel_requested: Arc::clone(&cancel_requested),
            },
        );

        let task_resource = resource_name::task(task.id);
        let lock_id = match self
            .locks
            .acquire(
                &task_resource,
                "execution-coordinator",
                LockMode::Execute,
                AcquireOptions {
                    timeout: Some(Duration::from_secs(self.config.start_timeout_secs)),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.emit(&task, None, None, 0, format!("lock acquisition failed: {e}")).await;
                self.finish_execution(task.id, TaskExecutionStatus::Failed).await;
                return;
            }
        };

        let outcome = self.run_with_retries(&task, &cancel_requested).await;

        if let Err(e) = self.locks.release(lock_id).await {
            error!(task_id = %task.id, error = %e, "lock release failed");
        }

        let mut metrics = self.metrics.write().await;
        let status = match &outcome {
            Ok(ExecutionOutcome::Completed) => {
                metrics.completed += 1;
                TaskExecutionStatus::Completed
            }
            Ok(ExecutionOutcome::Failed) => {
                metrics.failed += 1;
                TaskExecutionStatus::Failed
            }
            Ok(ExecutionOutcome::TimedOut) => {
                metrics.timed_out += 1;
                TaskExecutionStatus::TimedOut
            }
            Ok(ExecutionOutcome::Cancelled) => TaskExecutionStatus::Cancelled,
            Err(_) => {
                metrics.failed += 1;
                TaskExecutionStatus::Failed
            }
        };
        drop(metrics);
        self.finish_execution(task.id, status).await;
    }

    async fn finish_execution(&self, task_id: Uuid, status: TaskExecutionStatus) {
        if let Some(exec) = self.active_executions.write().await.get_mut(&task_id) {
            // A `cancel_execution` call may have already recorded `Cancelled`
            // ahead of the task loop noticing; don't overwrite that verdict.
            if !matches!(exec.status, TaskExecutionStatus::Cancelled) {
                exec.status = status;
            }
        }
    }

    async fn run_with_retries(self: &Arc<Self>, task: &AtomicTask, cancel_requested: &Arc<AtomicBool>) -> Result<ExecutionOutcome> {
        let mut attempt = 0;
        loop {
            if cancel_requested.load(Ordering::SeqCst) {
                return Ok(ExecutionOutcome::Cancelled);
            }

            attempt += 1;
            {
                let mut attempts = self.attempts.write().await;
                attempts
                    .entry(task.id)
                    .or_insert(TaskAttempt { attempts: 0 })
                    .attempts = attempt;
            }

            let agent_id = self.select_and_reserve_agent(task).await;
            let Some(agent_id) = agent_id else {
                self.emit(task, None, None, attempt, "no eligible agent available".into()).await;
                return Err(OrchestrationError::resource_exhausted(
                    "ExecutionCoordinator",
                    "run_with_retries",
                    "no eligible agent available",
                ));
            };

            if let Some(exec) = self.active_executions.write().await.get_mut(&task.id) {
                exec.agent_id = Some(agent_id);
            }

            let result = self.run_once(task, agent_id, attempt).await;
            self.release_agent(task, agent_id).await;

            match result {
                Ok(ExecutionOutcome::Completed) => return Ok(ExecutionOutcome::Completed),
                Ok(outcome) if attempt > self.config.max_retry_attempts => return Ok(outcome),
                Ok(_) => {
                    self.metrics.write().await.retried += 1;
                    tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                    continue;
                }
                Err(e) if e.is_retryable() && attempt <= self.config.max_retry_attempts => {
                    self.metrics.write().await.retried += 1;
                    tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Acquires the attempt's `agent:<id>` and every `file:<path>` lock (in
    /// sorted order, for a stable acquisition order across concurrent
    /// executions touching overlapping file sets) before dispatching, and
    /// releases them all before returning.
    async fn run_once(self: &Arc<Self>, task: &AtomicTask, agent_id: Uuid, attempt: u32) -> Result<ExecutionOutcome> {
        if self.config.enable_execution_delays && self.config.default_execution_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.default_execution_delay_ms)).await;
        }

        let lock_timeout = AcquireOptions {
            timeout: Some(Duration::from_secs(self.config.start_timeout_secs)),
            ..Default::default()
        };

        let agent_resource = resource_name::agent(agent_id);
        let agent_lock = match self
            .locks
            .acquire(&agent_resource, "execution-coordinator", LockMode::Execute, lock_timeout.clone())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.emit(task, Some(agent_id), Some(ExecutionOutcome::Failed), attempt, format!("agent lock failed: {e}"))
                    .await;
                return Ok(ExecutionOutcome::Failed);
            }
        };

        let mut sorted_paths: Vec<&String> = task.file_paths.iter().collect();
        sorted_paths.sort();

        let mut file_locks = Vec::with_capacity(sorted_paths.len());
        for path in &sorted_paths {
            let file_resource = resource_name::file(path);
            match self
                .locks
                .acquire(&file_resource, "execution-coordinator", LockMode::Write, lock_timeout.clone())
                .await
            {
                Ok(id) => file_locks.push(id),
                Err(e) => {
                    self.emit(task, Some(agent_id), Some(ExecutionOutcome::Failed), attempt, format!("file lock failed: {e}"))
                        .await;
                    for id in file_locks {
                        let _ = self.locks.release(id).await;
                    }
                    let _ = self.locks.release(agent_lock).await;
                    return Ok(ExecutionOutcome::Failed);
                }
            }
        }

        let outcome = self.run_dispatch(task, agent_id, attempt).await;

        for id in file_locks {
            if let Err(e) = self.locks.release(id).await {
                error!(task_id = %task.id, error = %e, "file lock release failed");
            }
        }
        if let Err(e) = self.locks.release(agent_lock).await {
            error!(task_id = %task.id, error = %e, "agent lock release failed");
        }

        outcome
    }

    /// The actual send/poll protocol against the agent channel, run once
    /// the task's locks are held.
    async fn run_dispatch(self: &Arc<Self>, task: &AtomicTask, agent_id: Uuid, attempt: u32) -> Result<ExecutionOutcome> {
        self.emit(task, Some(agent_id), None, attempt, "dispatching task".into()).await;

        if let Some(p) = self.config.simulate_failures {
            let synthetic_fail = (task.id.as_u128() % 1000) as f64 / 1000.0 < p;
            if synthetic_fail {
                self.emit(task, Some(agent_id), Some(ExecutionOutcome::Failed), attempt, "simulated failure".into()).await;
                return Ok(ExecutionOutcome::Failed);
            }
        }

        let send = self.channel.send_task(agent_id, task);
        let timeout = Duration::from_secs(self.config.task_timeout_minutes * 60);

        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.emit(task, Some(agent_id), Some(ExecutionOutcome::Failed), attempt, format!("send_task failed: {e}")).await;
                return Err(e);
            }
            Err(_) => {
                self.emit(task, Some(agent_id), Some(ExecutionOutcome::TimedOut), attempt, "send_task timed out".into()).await;
                return Ok(ExecutionOutcome::TimedOut);
            }
        }

        let poll_interval = Duration::from_secs(self.config.agent_response_poll_interval_secs);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(response) = self.channel.receive_response(agent_id, task.id).await? {
                let outcome = if response.success {
                    ExecutionOutcome::Completed
                } else {
                    ExecutionOutcome::Failed
                };
                self.emit(task, Some(agent_id), Some(outcome), attempt, response.message).await;
                if outcome == ExecutionOutcome::Completed {
                    self.agents.write().await.agents.get_mut(&agent_id).map(|a| {
                        a.metadata.record_completion(
                            (Utc::now() - task_started_hint(task)).num_seconds() as f64,
                        )
                    });
                } else {
                    self.agents.write().await.agents.get_mut(&agent_id).map(|a| a.metadata.record_failure());
                }
                return Ok(outcome);
            }
            if tokio::time::Instant::now() >= deadline {
                self.emit(task, Some(agent_id), Some(ExecutionOutcome::TimedOut), attempt, "response poll timed out".into()).await;
                return Ok(ExecutionOutcome::TimedOut);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn select_and_reserve_agent(&self, task: &AtomicTask) -> Option<Uuid> {
        let mut agents = self.agents.write().await;
        let mut cursor = 0usize;
        let quota = task_quota(&self.config, task.task_type);
        let snapshot: Vec<Agent> = agents
            .agents
            .values()
            .filter(|a| a.can_accommodate(quota.memory_mb, quota.cpu_weight))
            .cloned()
            .collect();
        let candidate = crate::agent::select_agent(
            &snapshot,
            task.task_type,
            self.config.load_balancing_strategy,
            task.priority.score(),
            &mut cursor,
        )
        .map(|a| a.id)?;

        if let Some(agent) = agents.agents.get_mut(&candidate) {
            agent.reserve(quota.memory_mb, quota.cpu_weight);
        }
        Some(candidate)
    }

    async fn release_agent(&self, task: &AtomicTask, agent_id: Uuid) {
        let quota = task_quota(&self.config, task.task_type);
        let mut agents = self.agents.write().await;
        if let Some(agent) = agents.agents.get_mut(&agent_id) {
            agent.release(quota.memory_mb, quota.cpu_weight);
        }
    }

    async fn heartbeat_monitor(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.agent_heartbeat_interval_secs);
        let timeout = chrono::Duration::seconds((self.config.agent_heartbeat_interval_secs * 2) as i64);
        while self.running.load(Ordering::SeqCst) {
            self.agents.write().await.mark_offline_stale(timeout);
            tokio::time::sleep(interval).await;
        }
    }

    async fn resource_monitor(self: Arc<Self>) {
        let interval = Duration::from_secs(self.config.resource_monitoring_interval_secs);
        while self.running.load(Ordering::SeqCst) {
            let agents = self.agents.read().await;
            let busy = agents.agents.values().filter(|a| matches!(a.status, AgentStatus::Busy)).count();
            debug!(busy_agents = busy, total_agents = agents.agents.len(), "resource monitor tick");
            drop(agents);
            tokio::time::sleep(interval).await;
        }
    }

    async fn emit(&self, task: &AtomicTask, agent_id: Option<Uuid>, outcome: Option<ExecutionOutcome>, attempt: u32, message: String) {
        let event = ExecutionEvent {
            task_id: task.id,
            agent_id,
            outcome,
            attempt,
            at: Utc::now(),
            message,
        };

        if self.config.enable_execution_state_events {
            let _ = self.events_tx.send(event.clone());
        }

        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            hook.on_event(&event).await;
        }
    }
}

fn task_quota(config: &ExecutionConfig, task_type: TaskType) -> TaskTypeResources {
    const DEFAULT: TaskTypeResources = TaskTypeResources {
        memory_mb: 256,
        cpu_weight: 0.5,
        agent_count: 1,
    };
    config.resources.task_type_resources.get(&task_type).copied().unwrap_or(DEFAULT)
}

/// Placeholder origin time for duration accounting until a dedicated
/// dispatch timestamp is threaded through; tasks never carry a started-at
/// field of their own, so this approximates from `Utc::now()` at the call
/// site rather than fabricating task state.
fn task_started_hint(_task: &AtomicTask) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::seconds(1)
}
