//! Task Scheduler: turns a task set and dependency graph
//! into an `ExecutionSchedule`, keeps it current as tasks complete, and
//! persists snapshots to disk.
//!
//! Grounded on `agent-orchestrator::workflow::WorkflowOrchestrator`
//! (`generate_execution_plan`, `calculate_execution_order`,
//! `recalculate_schedule`) for the overall shape: build a plan once, then
//! incrementally patch it as state changes rather than always
//! recomputing from scratch. Snapshot persistence follows
//! `bmad-workflow::workflow::BMADWorkflow`'s JSON-to-disk pattern.

use crate::agent::AgentSnapshot;
use crate::config::{RescheduleSensitivity, SchedulerConfig, SchedulingAlgorithm};
use crate::error::{OrchestrationError, Result};
use crate::graph::DependencyGraph;
use crate::scoring::{self, ScoreInputs, SystemLoadSnapshot, TaskScores};
use crate::task::{AtomicTask, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: Uuid,
    pub batch_index: usize,
    pub scores: ScoresRecord,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    /// Only populated under `SchedulingAlgorithm::ResourceBalanced`: the
    /// task's memory quota scaled down proportionally when its batch's
    /// summed quota memory would exceed `resources.max_memory_mb`. `None`
    /// under every other algorithm.
    pub allocated_memory_mb: Option<u64>,
}

/// Plain-data mirror of `TaskScores` for serialization (the scoring type
/// itself stays `Copy`/internal; this is the on-the-wire shape).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoresRecord {
    pub priority: f64,
    pub deadline: f64,
    pub dependency: f64,
    pub resource: f64,
    pub duration: f64,
    pub system_load: f64,
    pub complexity: f64,
    pub business_impact: f64,
    pub agent_availability: f64,
    pub total: f64,
}

impl From<TaskScores> for ScoresRecord {
    fn from(s: TaskScores) -> Self {
        Self {
            priority: s.priority,
            deadline: s.deadline,
            dependency: s.dependency,
            resource: s.resource,
            duration: s.duration,
            system_load: s.system_load,
            complexity: s.complexity,
            business_impact: s.business_impact,
            agent_availability: s.agent_availability,
            total: s.total,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleTimeline {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_duration_hours: f64,
    /// `sum(estimatedHours) / totalDuration`; fixed at `1.0` when
    /// `totalDuration == 0` (explicit resolution for the empty- or
    /// instantaneous-schedule case).
    pub parallelism_factor: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub peak_memory_mb: u64,
    pub avg_cpu: f64,
    pub agent_utilization: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSchedule {
    pub id: Uuid,
    pub project_id: Uuid,
    pub algorithm: SchedulingAlgorithm,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<ScheduledTask>,
    pub critical_path: Vec<Uuid>,
    pub timeline: ScheduleTimeline,
    pub resource_utilization: ResourceUtilization,
    pub version: u32,
    pub is_optimal: bool,
}

impl ExecutionSchedule {
    /// Ready tasks are those in the earliest not-yet-consumed batch.
    pub fn ready_tasks(&self) -> Vec<Uuid> {
        let Some(min_batch) = self.tasks.iter().map(|t| t.batch_index).min() else {
            return Vec::new();
        };
        self.tasks
            .iter()
            .filter(|t| t.batch_index == min_batch)
            .map(|t| t.task_id)
            .collect()
    }

    pub fn next_execution_batch(&self) -> Vec<Uuid> {
        self.ready_tasks()
    }

    pub fn batch(&self, index: usize) -> Vec<Uuid> {
        self.tasks
            .iter()
            .filter(|t| t.batch_index == index)
            .map(|t| t.task_id)
            .collect()
    }
}

pub struct SchedulingContext<'a> {
    pub tasks: &'a HashMap<Uuid, AtomicTask>,
    pub graph: &'a DependencyGraph,
    pub agents: &'a [AgentSnapshot],
    pub load: SystemLoadSnapshot,
    pub now: DateTime<Utc>,
}

pub struct TaskScheduler {
    config: RwLock<SchedulerConfig>,
    current: RwLock<Option<ExecutionSchedule>>,
    optimizing: AtomicBool,
    optimization_handle: RwLock<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            current: RwLock::new(None),
            optimizing: AtomicBool::new(false),
            optimization_handle: RwLock::new(None),
        })
    }

    pub async fn config(&self) -> SchedulerConfig {
        self.config.read().await.clone()
    }

    /// Builds a fresh `ExecutionSchedule` from scratch.
    pub async fn generate_schedule(
        &self,
        project_id: Uuid,
        ctx: SchedulingContext<'_>,
    ) -> Result<ExecutionSchedule> {
        let config = self.config.read().await.clone();
        let batches = ctx.graph.topological_batches();
        let critical_path = ctx.graph.critical_path();

        if batches.iter().flatten().count() != ctx.tasks.len() {
            warn!(
                graph_nodes = batches.iter().flatten().count(),
                task_count = ctx.tasks.len(),
                "graph node count does not match task set; scheduling only graph-known tasks"
            );
        }

        let mut scored: Vec<(usize, Uuid, TaskScores)> = Vec::new();
        for (batch_index, batch) in batches.iter().enumerate() {
            for &task_id in batch {
                let Some(task) = ctx.tasks.get(&task_id) else {
                    continue;
                };
                let scores = scoring::compute_scores(
                    ScoreInputs {
                        task,
                        graph: ctx.graph,
                        critical_path: &critical_path,
                        resources: &config.resources,
                        load: ctx.load,
                        agents: ctx.agents,
                        now: ctx.now,
                    },
                    &config.weights,
                );
                scored.push((batch_index, task_id, scores));
            }
        }

        order_within_batches(&mut scored, config.algorithm, &critical_path);

        let mut scheduled_tasks = materialize_timeline(&scored, ctx.tasks, ctx.now);
        apply_resource_balancing(&mut scheduled_tasks, ctx.tasks, &config);
        let timeline = compute_timeline(&scheduled_tasks, ctx.tasks, ctx.now);
        let resource_utilization = compute_resource_utilization(ctx.tasks, &config, ctx.agents);

        let schedule = ExecutionSchedule {
            id: Uuid::new_v4(),
            project_id,
            algorithm: config.algorithm,
            generated_at: ctx.now,
            tasks: scheduled_tasks,
            critical_path,
            timeline,
            resource_utilization,
            version: 1,
            is_optimal: matches!(config.algorithm, SchedulingAlgorithm::HybridOptimal),
        };

        info!(
            project_id = %project_id,
            task_count = schedule.tasks.len(),
            algorithm = ?schedule.algorithm,
            "generated execution schedule"
        );

        *self.current.write().await = Some(schedule.clone());
        Ok(schedule)
    }

    /// Recomputes the schedule if enough has changed to justify it, per
    /// `reschedule_sensitivity`. Returns the existing schedule unchanged
    /// when the delta is below threshold.
    pub async fn update_schedule(
        &self,
        project_id: Uuid,
        ctx: SchedulingContext<'_>,
    ) -> Result<ExecutionSchedule> {
        let config = self.config.read().await.clone();
        let previous = self.current.read().await.clone();

        let Some(previous) = previous else {
            return self.generate_schedule(project_id, ctx).await;
        };

        let delta = schedule_delta(&previous, ctx.tasks, ctx.graph);
        if delta < config.reschedule_sensitivity.threshold() {
            debug!(delta, "schedule delta below reschedule threshold; keeping current schedule");
            return Ok(previous);
        }

        let mut regenerated = self.generate_schedule(project_id, ctx).await?;
        regenerated.version = previous.version + 1;
        *self.current.write().await = Some(regenerated.clone());
        Ok(regenerated)
    }

    pub async fn current_schedule(&self) -> Option<ExecutionSchedule> {
        self.current.read().await.clone()
    }

    pub async fn ready_tasks(&self) -> Vec<Uuid> {
        self.current
            .read()
            .await
            .as_ref()
            .map(ExecutionSchedule::ready_tasks)
            .unwrap_or_default()
    }

    pub async fn next_execution_batch(&self) -> Vec<Uuid> {
        self.ready_tasks().await
    }

    /// Removes a completed task from the current schedule's pending view;
    /// callers are responsible for calling `DependencyGraph::mark_completed`
    /// separately and invoking `update_schedule` to rebatch.
    pub async fn mark_task_completed(&self, task_id: Uuid) {
        if let Some(schedule) = self.current.write().await.as_mut() {
            schedule.tasks.retain(|t| t.task_id != task_id);
        }
    }

    /// Writes the current schedule as JSON under `snapshot_dir`; no-op if
    /// unconfigured.
    pub async fn save_schedule(&self) -> Result<Option<PathBuf>> {
        let config = self.config.read().await.clone();
        let Some(dir) = config.snapshot_dir.as_ref() else {
            return Ok(None);
        };
        let Some(schedule) = self.current.read().await.clone() else {
            return Ok(None);
        };

        let path = snapshot_path(Path::new(dir), schedule.id);
        let json = serde_json::to_string_pretty(&schedule).map_err(|e| {
            OrchestrationError::invariant("TaskScheduler", "save_schedule", "serialization failed")
                .with_cause(e)
        })?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            OrchestrationError::transient("TaskScheduler", "save_schedule", "failed to create snapshot dir")
                .with_cause(e)
        })?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            OrchestrationError::transient("TaskScheduler", "save_schedule", "failed to write snapshot")
                .with_cause(e)
        })?;
        Ok(Some(path))
    }

    pub async fn load_schedule(&self, path: &Path) -> Result<ExecutionSchedule> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            OrchestrationError::transient("TaskScheduler", "load_schedule", "failed to read snapshot")
                .with_cause(e)
        })?;
        let schedule: ExecutionSchedule = serde_json::from_slice(&bytes).map_err(|e| {
            OrchestrationError::validation("TaskScheduler", "load_schedule", "malformed snapshot json")
                .with_cause(e)
        })?;
        *self.current.write().await = Some(schedule.clone());
        Ok(schedule)
    }

    /// Deletes snapshots older than `snapshot_retention_days`.
    pub async fn cleanup_old_snapshots(&self) -> Result<usize> {
        let config = self.config.read().await.clone();
        let Some(dir) = config.snapshot_dir.as_ref() else {
            return Ok(0);
        };
        let cutoff = Utc::now() - chrono::Duration::days(config.snapshot_retention_days as i64);

        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => return Ok(0),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let modified: DateTime<Utc> = modified.into();
            if modified < cutoff {
                if tokio::fs::remove_file(entry.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Regenerates the schedule if the current one's `resource_utilization
    /// .efficiency` has dropped below `0.7`; returns `None` when the
    /// current schedule is already efficient enough, or when there is no
    /// current schedule to optimize.
    pub async fn optimize_schedule(
        &self,
        project_id: Uuid,
        ctx: SchedulingContext<'_>,
    ) -> Result<Option<ExecutionSchedule>> {
        const EFFICIENCY_THRESHOLD: f64 = 0.7;

        let Some(current) = self.current.read().await.clone() else {
            return Ok(None);
        };
        if current.resource_utilization.efficiency >= EFFICIENCY_THRESHOLD {
            return Ok(None);
        }

        let mut regenerated = self.generate_schedule(project_id, ctx).await?;
        regenerated.version = current.version + 1;
        *self.current.write().await = Some(regenerated.clone());
        Ok(Some(regenerated))
    }

    /// Starts a background timer that calls `optimize_schedule` every
    /// `optimization_interval_secs`, gated by `enable_dynamic_optimization`.
    /// Idempotent and a no-op when optimization is disabled or already
    /// running.
    pub async fn start_optimization_loop(
        self: &Arc<Self>,
        project_id: Uuid,
        tasks: Arc<RwLock<HashMap<Uuid, AtomicTask>>>,
        graph: Arc<RwLock<DependencyGraph>>,
        agents: Arc<RwLock<Vec<AgentSnapshot>>>,
    ) {
        let config = self.config.read().await.clone();
        if !config.enable_dynamic_optimization {
            return;
        }
        if self.optimizing.swap(true, Ordering::SeqCst) {
            return;
        }

        let scheduler = Arc::clone(self);
        let interval = Duration::from_secs(config.optimization_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !scheduler.optimizing.load(Ordering::SeqCst) {
                    break;
                }

                let tasks_guard = tasks.read().await;
                let graph_guard = graph.read().await;
                let agents_guard = agents.read().await;
                let ctx = SchedulingContext {
                    tasks: &tasks_guard,
                    graph: &graph_guard,
                    agents: &agents_guard,
                    load: SystemLoadSnapshot {
                        current_memory_fraction: 0.0,
                        current_cpu_fraction: 0.0,
                        free_agent_slots: agents_guard.iter().filter(|a| a.is_idle()).count(),
                        max_concurrent: agents_guard.len(),
                    },
                    now: Utc::now(),
                };

                match scheduler.optimize_schedule(project_id, ctx).await {
                    Ok(Some(schedule)) => {
                        info!(version = schedule.version, "dynamic optimization regenerated schedule");
                    }
                    Ok(None) => debug!("dynamic optimization: schedule efficiency above threshold"),
                    Err(e) => warn!(error = %e, "dynamic optimization failed"),
                }
            }
        });
        *self.optimization_handle.write().await = Some(handle);
    }

    pub async fn stop_optimization_loop(&self) {
        self.optimizing.store(false, Ordering::SeqCst);
        if let Some(handle) = self.optimization_handle.write().await.take() {
            handle.abort();
        }
    }
}

fn snapshot_path(dir: &Path, schedule_id: Uuid) -> PathBuf {
    dir.join(format!("schedule-{schedule_id}.json"))
}

/// Reorders tasks within each batch according to the active algorithm
/// (all six share the same batching, differing only in
/// within-batch order and the weighting of `total`).
fn order_within_batches(
    scored: &mut [(usize, Uuid, TaskScores)],
    algorithm: SchedulingAlgorithm,
    critical_path: &[Uuid],
) {
    let cp_index: HashMap<Uuid, usize> = critical_path
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();

    scored.sort_by(|(ba, ida, sa), (bb, idb, sb)| {
        ba.cmp(bb).then_with(|| match algorithm {
            SchedulingAlgorithm::PriorityFirst => sb
                .priority
                .partial_cmp(&sa.priority)
                .unwrap()
                .then_with(|| ida.cmp(idb)),
            SchedulingAlgorithm::EarliestDeadline => sb
                .deadline
                .partial_cmp(&sa.deadline)
                .unwrap()
                .then_with(|| ida.cmp(idb)),
            SchedulingAlgorithm::CriticalPath => {
                let ca = cp_index.get(ida);
                let cb = cp_index.get(idb);
                match (ca, cb) {
                    (Some(a), Some(b)) => a.cmp(b),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => sb.total.partial_cmp(&sa.total).unwrap().then_with(|| ida.cmp(idb)),
                }
            }
            SchedulingAlgorithm::ResourceBalanced => sb
                .resource
                .partial_cmp(&sa.resource)
                .unwrap()
                .then_with(|| ida.cmp(idb)),
            SchedulingAlgorithm::ShortestJob => sb
                .duration
                .partial_cmp(&sa.duration)
                .unwrap()
                .then_with(|| ida.cmp(idb)),
            SchedulingAlgorithm::HybridOptimal => sb
                .total
                .partial_cmp(&sa.total)
                .unwrap()
                .then_with(|| ida.cmp(idb)),
        })
    });
}

/// Walks scored tasks batch-by-batch assigning a start/end timeline: each
/// batch starts when the previous one ends, batch duration is
/// `max(estimatedHours in batch) * 1.10` (explicit formula).
fn materialize_timeline(
    scored: &[(usize, Uuid, TaskScores)],
    tasks: &HashMap<Uuid, AtomicTask>,
    now: DateTime<Utc>,
) -> Vec<ScheduledTask> {
    let mut out = Vec::with_capacity(scored.len());
    let mut cursor = now;
    let mut current_batch = None;
    let mut batch_items: Vec<(Uuid, TaskScores)> = Vec::new();

    let mut flush = |batch_items: &mut Vec<(Uuid, TaskScores)>, cursor: &mut DateTime<Utc>, out: &mut Vec<ScheduledTask>, batch_index: usize| {
        if batch_items.is_empty() {
            return;
        }
        let max_hours = batch_items
            .iter()
            .map(|(id, _)| tasks.get(id).map(|t| t.estimated_hours).unwrap_or(0.0))
            .fold(0.0_f64, f64::max);
        let duration_hours = max_hours * 1.10;
        let end = *cursor + chrono::Duration::minutes((duration_hours * 60.0) as i64);

        for (id, scores) in batch_items.drain(..) {
            out.push(ScheduledTask {
                task_id: id,
                batch_index,
                scores: scores.into(),
                scheduled_start: *cursor,
                scheduled_end: end,
                allocated_memory_mb: None,
            });
        }
        *cursor = end;
    };

    for &(batch_index, task_id, scores) in scored {
        if current_batch != Some(batch_index) {
            if let Some(prev) = current_batch {
                flush(&mut batch_items, &mut cursor, &mut out, prev);
            }
            current_batch = Some(batch_index);
        }
        batch_items.push((task_id, scores));
    }
    if let Some(prev) = current_batch {
        flush(&mut batch_items, &mut cursor, &mut out, prev);
    }

    out
}

/// Under `SchedulingAlgorithm::ResourceBalanced`, scales each task's memory
/// quota down proportionally whenever its batch's summed quota memory
/// exceeds `resources.max_memory_mb`; every other algorithm leaves
/// `allocated_memory_mb` at `None`.
fn apply_resource_balancing(
    scheduled: &mut [ScheduledTask],
    tasks: &HashMap<Uuid, AtomicTask>,
    config: &SchedulerConfig,
) {
    if !matches!(config.algorithm, SchedulingAlgorithm::ResourceBalanced) {
        return;
    }

    let default = crate::config::TaskTypeResources {
        memory_mb: 256,
        cpu_weight: 0.5,
        agent_count: 1,
    };
    let memory_of = |id: &Uuid| -> u64 {
        tasks
            .get(id)
            .map(|t| {
                config
                    .resources
                    .task_type_resources
                    .get(&t.task_type)
                    .copied()
                    .unwrap_or(default)
                    .memory_mb
            })
            .unwrap_or(default.memory_mb)
    };

    let max_batch_index = scheduled.iter().map(|t| t.batch_index).max().unwrap_or(0);
    for batch_index in 0..=max_batch_index {
        let batch_total: u64 = scheduled
            .iter()
            .filter(|t| t.batch_index == batch_index)
            .map(|t| memory_of(&t.task_id))
            .sum();
        let scale = if batch_total > config.resources.max_memory_mb && batch_total > 0 {
            config.resources.max_memory_mb as f64 / batch_total as f64
        } else {
            1.0
        };
        for t in scheduled.iter_mut().filter(|t| t.batch_index == batch_index) {
            let mem = memory_of(&t.task_id);
            t.allocated_memory_mb = Some(((mem as f64) * scale).round() as u64);
        }
    }
}

/// `parallelismFactor = sum(estimatedHours) / totalDuration`, pinned to
/// `1.0` when `totalDuration == 0` (explicit resolution).
fn compute_timeline(
    scheduled_tasks: &[ScheduledTask],
    tasks: &HashMap<Uuid, AtomicTask>,
    now: DateTime<Utc>,
) -> ScheduleTimeline {
    let start = scheduled_tasks.iter().map(|t| t.scheduled_start).min().unwrap_or(now);
    let end = scheduled_tasks.iter().map(|t| t.scheduled_end).max().unwrap_or(now);
    let total_duration_hours = (end - start).num_seconds() as f64 / 3600.0;

    let total_task_hours: f64 = scheduled_tasks
        .iter()
        .map(|t| tasks.get(&t.task_id).map(|task| task.estimated_hours).unwrap_or(0.0))
        .sum();

    let parallelism_factor = if total_duration_hours <= 0.0 {
        1.0
    } else {
        total_task_hours / total_duration_hours
    };

    ScheduleTimeline {
        start,
        end,
        total_duration_hours,
        parallelism_factor,
    }
}

fn compute_resource_utilization(
    tasks: &HashMap<Uuid, AtomicTask>,
    config: &SchedulerConfig,
    agents: &[AgentSnapshot],
) -> ResourceUtilization {
    let default = crate::config::TaskTypeResources {
        memory_mb: 256,
        cpu_weight: 0.5,
        agent_count: 1,
    };
    let mut peak_memory_mb = 0u64;
    let mut total_cpu = 0.0;
    for task in tasks.values() {
        let quota = config
            .resources
            .task_type_resources
            .get(&task.task_type)
            .copied()
            .unwrap_or(default);
        peak_memory_mb += quota.memory_mb;
        total_cpu += quota.cpu_weight;
    }
    let avg_cpu = if tasks.is_empty() {
        0.0
    } else {
        total_cpu / tasks.len() as f64
    };

    let agent_utilization = if agents.is_empty() {
        0.0
    } else {
        agents
            .iter()
            .map(|a| a.current_usage.active_tasks as f64 / a.capacity.max_concurrent_tasks.max(1) as f64)
            .sum::<f64>()
            / agents.len() as f64
    };

    let efficiency = (1.0 - avg_cpu.min(1.0) * 0.5) * (1.0 - agent_utilization.min(1.0) * 0.3);

    ResourceUtilization {
        peak_memory_mb,
        avg_cpu,
        agent_utilization,
        efficiency: efficiency.clamp(0.0, 1.0),
    }
}

/// Fraction of previously-scheduled tasks whose status or dependency set
/// changed since the last schedule was generated, used to gate
/// `update_schedule`'s full-rebuild decision.
fn schedule_delta(
    previous: &ExecutionSchedule,
    tasks: &HashMap<Uuid, AtomicTask>,
    graph: &DependencyGraph,
) -> f64 {
    if previous.tasks.is_empty() {
        return 1.0;
    }

    let mut changed = 0usize;
    for scheduled in &previous.tasks {
        let Some(task) = tasks.get(&scheduled.task_id) else {
            changed += 1;
            continue;
        };
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Cancelled) {
            changed += 1;
            continue;
        }
        if graph.is_completed(scheduled.task_id) {
            changed += 1;
        }
    }
    changed as f64 / previous.tasks.len() as f64
}
