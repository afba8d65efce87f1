//! Agent records and selection strategies shared by the scheduler and the
//! execution coordinator.
//!
//! Grounded on `agent-orchestrator::agent::{Agent, AgentStatus,
//! PerformanceTracker}`: a status enum, a capacity/usage pair, and a
//! running-average metadata block. The source crate's agents carry
//! MCTS/model routing fields; those are dropped here in favor of the plain
//! capacity-accounting the scheduler actually needs.

use crate::config::LoadBalancingStrategy;
use crate::task::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Busy,
    Offline,
}

/// Running totals for an agent, updated after each execution completes
/// (supplemented feature: execution metrics / `PerformanceTracker`
/// idiom — average recomputed incrementally rather than replayed).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_duration_secs: f64,
    pub last_active: Option<DateTime<Utc>>,
}

impl AgentMetadata {
    pub fn record_completion(&mut self, duration_secs: f64) {
        let n = self.tasks_completed as f64;
        self.average_duration_secs = (self.average_duration_secs * n + duration_secs) / (n + 1.0);
        self.tasks_completed += 1;
        self.last_active = Some(Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
        self.last_active = Some(Utc::now());
    }

    /// `tasksCompleted / (tasksCompleted + tasksFailed)`; an agent with no
    /// history yet is treated as fully trusted (`1.0`) rather than
    /// penalized for having never run.
    pub fn success_rate(&self) -> f64 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            1.0
        } else {
            self.tasks_completed as f64 / total as f64
        }
    }
}

/// The three independent resource axes an agent offers.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentCapacity {
    pub max_memory_mb: u64,
    pub max_cpu_weight: f64,
    pub max_concurrent_tasks: usize,
}

/// The three independent resource axes currently reserved against an
/// agent's capacity. `memoryMb <= capacity.maxMemoryMb` and similarly for
/// cpu/active_tasks must always hold (invariant).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AgentUsage {
    pub memory_mb: u64,
    pub cpu_weight: f64,
    pub active_tasks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub status: AgentStatus,
    pub capacity: AgentCapacity,
    pub current_usage: AgentUsage,
    pub supported_task_types: Vec<TaskType>,
    pub metadata: AgentMetadata,
    pub last_heartbeat: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, capacity: AgentCapacity) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: AgentStatus::Idle,
            capacity,
            current_usage: AgentUsage::default(),
            supported_task_types: Vec::new(),
            metadata: AgentMetadata::default(),
            last_heartbeat: Utc::now(),
        }
    }

    /// `activeTasks < maxConcurrentTasks`; the slot axis alone, cheap to
    /// check without a candidate task's memory/cpu quota in hand.
    pub fn has_free_capacity(&self) -> bool {
        self.current_usage.active_tasks < self.capacity.max_concurrent_tasks
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.status, AgentStatus::Idle) && self.has_free_capacity()
    }

    pub fn load_fraction(&self) -> f64 {
        if self.capacity.max_concurrent_tasks == 0 {
            1.0
        } else {
            self.current_usage.active_tasks as f64 / self.capacity.max_concurrent_tasks as f64
        }
    }

    pub fn supports(&self, task_type: TaskType) -> bool {
        self.supported_task_types.is_empty() || self.supported_task_types.contains(&task_type)
    }

    /// Whether reserving `memory_mb`/`cpu_weight` for one more task would
    /// keep every capacity axis within bounds.
    pub fn can_accommodate(&self, memory_mb: u64, cpu_weight: f64) -> bool {
        self.has_free_capacity()
            && self.current_usage.memory_mb + memory_mb <= self.capacity.max_memory_mb
            && self.current_usage.cpu_weight + cpu_weight <= self.capacity.max_cpu_weight
    }

    /// Reserves one task's worth of memory/cpu/concurrent-slot usage.
    /// Callers are expected to have checked `can_accommodate` first.
    pub fn reserve(&mut self, memory_mb: u64, cpu_weight: f64) {
        self.current_usage.memory_mb += memory_mb;
        self.current_usage.cpu_weight += cpu_weight;
        self.current_usage.active_tasks += 1;
        if !self.has_free_capacity() {
            self.status = AgentStatus::Busy;
        }
    }

    pub fn release(&mut self, memory_mb: u64, cpu_weight: f64) {
        self.current_usage.memory_mb = self.current_usage.memory_mb.saturating_sub(memory_mb);
        self.current_usage.cpu_weight = (self.current_usage.cpu_weight - cpu_weight).max(0.0);
        self.current_usage.active_tasks = self.current_usage.active_tasks.saturating_sub(1);
        if self.has_free_capacity() && matches!(self.status, AgentStatus::Busy) {
            self.status = AgentStatus::Idle;
        }
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            status: self.status,
            capacity: self.capacity,
            current_usage: self.current_usage,
        }
    }
}

/// Lightweight view passed into scoring so callers don't need a live
/// reference to the full agent pool (`agentAvailability` factor).
#[derive(Debug, Clone, Copy)]
pub struct AgentSnapshot {
    pub id: Uuid,
    pub status: AgentStatus,
    pub capacity: AgentCapacity,
    pub current_usage: AgentUsage,
}

impl AgentSnapshot {
    pub fn is_idle(&self) -> bool {
        matches!(self.status, AgentStatus::Idle)
            && self.current_usage.active_tasks < self.capacity.max_concurrent_tasks
    }
}

/// Picks an agent for a task under `strategy`, restricted to agents that
/// support `task_type` and have free capacity. `priority_score` is the
/// requesting task's `Priority::score()`, consulted only by
/// `PriorityBased`.
pub fn select_agent<'a>(
    agents: &'a [Agent],
    task_type: TaskType,
    strategy: LoadBalancingStrategy,
    priority_score: f64,
    round_robin_cursor: &mut usize,
) -> Option<&'a Agent> {
    let eligible: Vec<&Agent> = agents
        .iter()
        .filter(|a| a.is_idle() && a.supports(task_type))
        .collect();

    if eligible.is_empty() {
        return None;
    }

    match strategy {
        LoadBalancingStrategy::RoundRobin => {
            let idx = *round_robin_cursor % eligible.len();
            *round_robin_cursor = round_robin_cursor.wrapping_add(1);
            Some(eligible[idx])
        }
        LoadBalancingStrategy::LeastLoaded => eligible
            .into_iter()
            .min_by(|a, b| a.load_fraction().partial_cmp(&b.load_fraction()).unwrap()),
        LoadBalancingStrategy::ResourceAware => eligible
            .into_iter()
            .max_by_key(|a| a.capacity.max_concurrent_tasks.saturating_sub(a.current_usage.active_tasks)),
        LoadBalancingStrategy::PriorityBased => {
            if priority_score > 0.8 {
                let mut ranked = eligible;
                ranked.sort_by(|a, b| {
                    b.metadata
                        .success_rate()
                        .partial_cmp(&a.metadata.success_rate())
                        .unwrap()
                        .then_with(|| a.id.cmp(&b.id))
                });
                ranked.into_iter().next()
            } else {
                eligible
                    .into_iter()
                    .min_by_key(|a| (a.current_usage.active_tasks, a.id))
            }
        }
    }
}

/// Agent pool keyed by id, convenient for the execution coordinator's
/// capacity bookkeeping.
#[derive(Debug, Default)]
pub struct AgentPool {
    pub agents: HashMap<Uuid, Agent>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, agent: Agent) {
        self.agents.insert(agent.id, agent);
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.agents.values().map(Agent::snapshot).collect()
    }

    pub fn mark_offline_stale(&mut self, heartbeat_timeout: chrono::Duration) {
        let now = Utc::now();
        for agent in self.agents.values_mut() {
            if now - agent.last_heartbeat > heartbeat_timeout {
                agent.status = AgentStatus::Offline;
            }
        }
    }
}
