//! Multi-factor task scoring (`TaskScores`): nine orthogonal
//! factors in `[0,1]` plus a weighted `total`.
//!
//! Grounded on `agent-orchestrator::workflow::WorkflowOrchestrator::
//! calculate_assignment_score`, which sums weighted sub-scores from agent
//! performance snapshots into one ranking number; the same additive,
//! independently-computed-factor shape is used here across nine task-level
//! factors instead of agent-level ones.

use crate::agent::AgentSnapshot;
use crate::config::{ResourceBudget, ScoreWeights};
use crate::graph::DependencyGraph;
use crate::task::{AtomicTask, TaskType};
use chrono::{DateTime, Duration as ChronoDuration, Utc};

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskScores {
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

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// `now` is threaded through explicitly so callers can make this
/// deterministic in tests.
pub fn priority_score(task: &AtomicTask) -> f64 {
    task.priority.score()
}

/// Implied deadline = now + estimatedHours * priority multiplier; score
/// decays linearly over a 7-day window, critical tasks get a 1.5x boost
/// capped at 1.0.
pub fn deadline_score(task: &AtomicTask, now: DateTime<Utc>) -> f64 {
    let implied_deadline = now
        + ChronoDuration::minutes(
            (task.estimated_hours * task.priority.deadline_multiplier() * 60.0) as i64,
        );
    let time_to_deadline = (implied_deadline - now).num_seconds() as f64;
    let seven_days = (7 * 24 * 3600) as f64;
    let mut score = (1.0 - time_to_deadline / seven_days).max(0.0);
    if matches!(task.priority, crate::task::Priority::Critical) {
        score = (score * 1.5).min(1.0);
    }
    clamp01(score)
}

/// 0.5 base; +0.3 if on the critical path; + min(0.2, 0.1 * fanout).
pub fn dependency_score(task: &AtomicTask, graph: &DependencyGraph, critical_path: &[uuid::Uuid]) -> f64 {
    let mut score = 0.5;
    if critical_path.contains(&task.id) {
        score += 0.3;
    }
    let fanout = graph.fanout(task.id);
    score += (0.1 * fanout as f64).min(0.2);
    clamp01(score)
}

/// `1 - min(0.5, ((mem/maxMem) + (cpu/maxCpu)) / 2)` using per-task-type
/// quotas.
pub fn resource_score(task: &AtomicTask, resources: &ResourceBudget) -> f64 {
    let default = crate::config::TaskTypeResources {
        memory_mb: 256,
        cpu_weight: 0.5,
        agent_count: 1,
    };
    let quota = resources
        .task_type_resources
        .get(&task.task_type)
        .copied()
        .unwrap_or(default);

    let mem_ratio = quota.memory_mb as f64 / resources.max_memory_mb.max(1) as f64;
    let cpu_ratio = quota.cpu_weight / resources.max_cpu_utilization.max(0.0001);
    clamp01(1.0 - ((mem_ratio + cpu_ratio) / 2.0).min(0.5))
}

/// `1 - min(0.8, estimatedHours/8)`.
pub fn duration_score(task: &AtomicTask) -> f64 {
    clamp01(1.0 - (task.estimated_hours / 8.0).min(0.8))
}

#[derive(Debug, Clone, Copy)]
pub struct SystemLoadSnapshot {
    pub current_memory_fraction: f64,
    pub current_cpu_fraction: f64,
    pub free_agent_slots: usize,
    pub max_concurrent: usize,
}

/// Availability = `(1 - currentMem - taskMem) * 0.4 + (1 - currentCpu -
/// taskCpu) * 0.4 + (freeSlots/maxConcurrent) * 0.2`.
pub fn system_load_score(
    task: &AtomicTask,
    resources: &ResourceBudget,
    load: SystemLoadSnapshot,
) -> f64 {
    let default = crate::config::TaskTypeResources {
        memory_mb: 256,
        cpu_weight: 0.5,
        agent_count: 1,
    };
    let quota = resources
        .task_type_resources
        .get(&task.task_type)
        .copied()
        .unwrap_or(default);
    let task_mem = quota.memory_mb as f64 / resources.max_memory_mb.max(1) as f64;
    let task_cpu = quota.cpu_weight / resources.max_cpu_utilization.max(0.0001);

    let mem_term = (1.0 - load.current_memory_fraction - task_mem) * 0.4;
    let cpu_term = (1.0 - load.current_cpu_fraction - task_cpu) * 0.4;
    let slot_term = if load.max_concurrent > 0 {
        (load.free_agent_slots as f64 / load.max_concurrent as f64) * 0.2
    } else {
        0.0
    };
    clamp01(mem_term + cpu_term + slot_term)
}

fn type_complexity_base(task_type: TaskType) -> f64 {
    match task_type {
        TaskType::Development => 0.3,
        TaskType::Testing => 0.15,
        TaskType::Documentation => 0.05,
        TaskType::Research => 0.2,
        TaskType::Deployment => 0.25,
        TaskType::Review => 0.1,
    }
}

/// `1 - min(1, sum(filePathWeight, testReqsWeight, acceptanceWeight,
/// depWeight, typeBase))`.
pub fn complexity_score(task: &AtomicTask, graph: &DependencyGraph) -> f64 {
    let file_path_weight = (task.file_paths.len() as f64 * 0.03).min(0.3);
    let test_reqs_weight = (task.testing_requirements.len() as f64 * 0.02).min(0.2);
    let acceptance_weight = (task.acceptance_criteria.len() as f64 * 0.02).min(0.2);
    let dep_weight = (graph.direct_dependencies(task.id).len() as f64 * 0.05).min(0.2);
    let type_base = type_complexity_base(task.task_type);

    let sum = file_path_weight + test_reqs_weight + acceptance_weight + dep_weight + type_base;
    clamp01(1.0 - sum.min(1.0))
}

/// Priority base + type bonus + 0.2 if any tag matches the business-critical
/// set.
pub fn business_impact_score(task: &AtomicTask) -> f64 {
    let base = task.priority.score();
    let type_bonus = match task.task_type {
        TaskType::Deployment => 0.1,
        TaskType::Development => 0.05,
        _ => 0.0,
    };
    let tag_bonus = if task.matches_business_critical_tag() {
        0.2
    } else {
        0.0
    };
    clamp01(base + type_bonus + tag_bonus)
}

/// `idleAgents/totalAgents` + 0.2 bonus if enough idle agents for the
/// task-type's `agentCount`, else the bonus is halved.
pub fn agent_availability_score(
    task: &AtomicTask,
    agents: &[AgentSnapshot],
    resources: &ResourceBudget,
) -> f64 {
    if agents.is_empty() {
        return 0.0;
    }
    let idle = agents.iter().filter(|a| a.is_idle()).count();
    let base = idle as f64 / agents.len() as f64;

    let required = resources
        .task_type_resources
        .get(&task.task_type)
        .map(|t| t.agent_count)
        .unwrap_or(1);

    let bonus = if idle >= required { 0.2 } else { 0.1 };
    clamp01(base + bonus)
}

pub struct ScoreInputs<'a> {
    pub task: &'a AtomicTask,
    pub graph: &'a DependencyGraph,
    pub critical_path: &'a [uuid::Uuid],
    pub resources: &'a ResourceBudget,
    pub load: SystemLoadSnapshot,
    pub agents: &'a [AgentSnapshot],
    pub now: DateTime<Utc>,
}

pub fn compute_scores(inputs: ScoreInputs<'_>, weights: &ScoreWeights) -> TaskScores {
    let priority = priority_score(inputs.task);
    let deadline = deadline_score(inputs.task, inputs.now);
    let dependency = dependency_score(inputs.task, inputs.graph, inputs.critical_path);
    let resource = resource_score(inputs.task, inputs.resources);
    let duration = duration_score(inputs.task);
    let system_load = system_load_score(inputs.task, inputs.resources, inputs.load);
    let complexity = complexity_score(inputs.task, inputs.graph);
    let business_impact = business_impact_score(inputs.task);
    let agent_availability = agent_availability_score(inputs.task, inputs.agents, inputs.resources);

    let total = priority * weights.priority
        + deadline * weights.deadline
        + dependency * weights.dependency
        + resource * weights.resource
        + duration * weights.duration
        + system_load * weights.system_load
        + complexity * weights.complexity
        + business_impact * weights.business_impact
        + agent_availability * weights.agent_availability;

    TaskScores {
        priority,
        deadline,
        dependency,
        resource,
        duration,
        system_load,
        complexity,
        business_impact,
        agent_availability,
        total: clamp01(total),
    }
}
