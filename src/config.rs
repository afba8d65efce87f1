//! Typed configuration surface. Every knob has a default;
//! construction-time validation lives on each struct's `validate`.
//!
//! Grounded on `agent-orchestrator::{OrchestrationConfig, OrchestratorConfig}`:
//! one struct per subsystem, rolled up into a single `CoreConfig`.

use crate::error::{OrchestrationError, Result};
use crate::task::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub scheduler: SchedulerConfig,
    pub execution: ExecutionConfig,
    pub lock_manager: LockManagerConfig,
    pub workflow_state: WorkflowStateConfig,
    pub epic_graph: EpicGraphConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            execution: ExecutionConfig::default(),
            lock_manager: LockManagerConfig::default(),
            workflow_state: WorkflowStateConfig::default(),
            epic_graph: EpicGraphConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.execution.validate()?;
        self.lock_manager.validate()?;
        Ok(())
    }
}

/// Scheduling algorithms, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingAlgorithm {
    PriorityFirst,
    EarliestDeadline,
    CriticalPath,
    ResourceBalanced,
    ShortestJob,
    HybridOptimal,
}

impl Default for SchedulingAlgorithm {
    fn default() -> Self {
        SchedulingAlgorithm::HybridOptimal
    }
}

/// Sensitivity thresholds for `updateSchedule`'s full-vs-incremental choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RescheduleSensitivity {
    Low,
    Medium,
    High,
}

impl RescheduleSensitivity {
    pub fn threshold(self) -> f64 {
        match self {
            RescheduleSensitivity::Low => 0.3,
            RescheduleSensitivity::Medium => 0.2,
            RescheduleSensitivity::High => 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub priority: f64,
    pub deadline: f64,
    pub dependency: f64,
    pub resource: f64,
    pub duration: f64,
    pub system_load: f64,
    pub complexity: f64,
    pub business_impact: f64,
    pub agent_availability: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            priority: 0.0,
            deadline: 0.25,
            dependency: 0.35,
            resource: 0.0,
            duration: 0.0,
            system_load: 0.20,
            complexity: 0.10,
            business_impact: 0.05,
            agent_availability: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskTypeResources {
    pub memory_mb: u64,
    pub cpu_weight: f64,
    pub agent_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub max_concurrent_tasks: usize,
    pub max_memory_mb: u64,
    pub max_cpu_utilization: f64,
    pub available_agents: usize,
    pub task_type_resources: HashMap<TaskType, TaskTypeResources>,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        let mut task_type_resources = HashMap::new();
        for (t, mem, cpu, agents) in [
            (TaskType::Development, 512, 1.0, 1usize),
            (TaskType::Testing, 256, 0.5, 1),
            (TaskType::Documentation, 128, 0.25, 1),
            (TaskType::Research, 256, 0.5, 1),
            (TaskType::Deployment, 512, 1.0, 2),
            (TaskType::Review, 128, 0.25, 1),
        ] {
            task_type_resources.insert(
                t,
                TaskTypeResources {
                    memory_mb: mem,
                    cpu_weight: cpu,
                    agent_count: agents,
                },
            );
        }

        Self {
            max_concurrent_tasks: 10,
            max_memory_mb: 8192,
            max_cpu_utilization: 0.85,
            available_agents: 5,
            task_type_resources,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub algorithm: SchedulingAlgorithm,
    pub weights: ScoreWeights,
    pub resources: ResourceBudget,
    pub deadline_buffer_hours: f64,
    pub reschedule_sensitivity: RescheduleSensitivity,
    pub enable_dynamic_optimization: bool,
    pub optimization_interval_secs: u64,
    pub snapshot_dir: Option<String>,
    pub snapshot_retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            algorithm: SchedulingAlgorithm::default(),
            weights: ScoreWeights::default(),
            resources: ResourceBudget::default(),
            deadline_buffer_hours: 0.0,
            reschedule_sensitivity: RescheduleSensitivity::Medium,
            enable_dynamic_optimization: true,
            optimization_interval_secs: 60,
            snapshot_dir: None,
            snapshot_retention_days: 7,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.weights.priority,
            self.weights.deadline,
            self.weights.dependency,
            self.weights.resource,
            self.weights.duration,
            self.weights.system_load,
            self.weights.complexity,
            self.weights.business_impact,
            self.weights.agent_availability,
        ];
        for w in weights {
            if !(0.0..=1.0).contains(&w) {
                return Err(OrchestrationError::configuration(
                    "TaskScheduler",
                    "validate",
                    format!("weight {w} outside [0,1]"),
                ));
            }
        }
        if self.resources.max_concurrent_tasks == 0 {
            return Err(OrchestrationError::configuration(
                "TaskScheduler",
                "validate",
                "resources.max_concurrent_tasks must be > 0",
            ));
        }
        Ok(())
    }
}

/// Strategies for picking an agent at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancingStrategy {
    RoundRobin,
    LeastLoaded,
    ResourceAware,
    PriorityBased,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        LoadBalancingStrategy::LeastLoaded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub max_concurrent_batches: usize,
    pub task_timeout_minutes: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub agent_heartbeat_interval_secs: u64,
    pub resource_monitoring_interval_secs: u64,
    pub enable_auto_recovery: bool,
    pub load_balancing_strategy: LoadBalancingStrategy,
    pub enable_execution_state_events: bool,
    pub execution_retention_minutes: u64,
    pub enable_execution_delays: bool,
    pub default_execution_delay_ms: u64,
    pub coordination_loop_interval_ms: u64,
    pub agent_response_poll_interval_secs: u64,
    pub start_timeout_secs: u64,
    /// Per-task-type memory/cpu quotas consulted by `feasible()` and agent
    /// reservation; shares its shape with the scheduler's own resource
    /// budget rather than duplicating a second quota table.
    pub resources: ResourceBudget,
    /// Test-only: when `Some(p)`, a fraction `p` of executions fail
    /// synthetically instead of depending on the agent channel's response.
    /// Always `None` in production wiring (open question).
    pub simulate_failures: Option<f64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 4,
            task_timeout_minutes: 30,
            max_retry_attempts: 2,
            retry_delay_seconds: 30,
            agent_heartbeat_interval_secs: 30,
            resource_monitoring_interval_secs: 15,
            enable_auto_recovery: true,
            load_balancing_strategy: LoadBalancingStrategy::default(),
            enable_execution_state_events: true,
            execution_retention_minutes: 60,
            enable_execution_delays: false,
            default_execution_delay_ms: 0,
            coordination_loop_interval_ms: 1000,
            agent_response_poll_interval_secs: 5,
            start_timeout_secs: 30,
            resources: ResourceBudget::default(),
            simulate_failures: None,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.task_timeout_minutes == 0 {
            return Err(OrchestrationError::configuration(
                "ExecutionCoordinator",
                "validate",
                "task_timeout_minutes must be > 0",
            ));
        }
        if let Some(p) = self.simulate_failures {
            if !(0.0..=1.0).contains(&p) {
                return Err(OrchestrationError::configuration(
                    "ExecutionCoordinator",
                    "validate",
                    "simulate_failures must be within [0,1]",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockManagerConfig {
    pub enable_lock_audit_trail: bool,
    pub enable_deadlock_detection: bool,
    pub default_lock_timeout_secs: u64,
    pub max_lock_timeout_secs: u64,
    pub lock_cleanup_interval_secs: u64,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            enable_lock_audit_trail: true,
            enable_deadlock_detection: true,
            default_lock_timeout_secs: 30,
            max_lock_timeout_secs: 300,
            lock_cleanup_interval_secs: 10,
        }
    }
}

impl LockManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_lock_timeout_secs > self.max_lock_timeout_secs {
            return Err(OrchestrationError::configuration(
                "LockManager",
                "validate",
                "default_lock_timeout_secs exceeds max_lock_timeout_secs",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStateConfig {
    pub snapshot_dir: Option<String>,
    pub snapshot_retention_days: u32,
}

impl Default for WorkflowStateConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            snapshot_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicGraphConfig {
    pub min_dependency_strength: f64,
    pub enable_llm_relationship_discovery: bool,
    pub llm_confidence_threshold: f64,
    pub llm_strength_threshold: f64,
}

impl Default for EpicGraphConfig {
    fn default() -> Self {
        Self {
            min_dependency_strength: 0.3,
            enable_llm_relationship_discovery: false,
            llm_confidence_threshold: 0.7,
            llm_strength_threshold: 0.6,
        }
    }
}
