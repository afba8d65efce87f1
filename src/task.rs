//! Core data model: `AtomicTask` and `Epic`.
//!
//! Grounded on `agent-orchestrator::agent::{AgentConfig, ResourceLimits}`
//! for the shape of typed enums/records, adapted from that crate's
//! agent-shaped types to the task/epic domain these describe.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    Development,
    Testing,
    Documentation,
    Research,
    Deployment,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Fixed priority factor table used by the scoring model.
    pub fn score(self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 0.8,
            Priority::Medium => 0.6,
            Priority::Low => 0.4,
        }
    }

    /// Multiplier applied to `estimatedHours` to derive an implied deadline.
    pub fn deadline_multiplier(self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 2.0,
            Priority::Medium => 4.0,
            Priority::Low => 8.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicTask {
    pub id: Uuid,
    pub title: String,
    pub task_type: TaskType,
    pub priority: Priority,
    pub estimated_hours: f64,
    pub status: TaskStatus,
    pub dependencies: HashSet<Uuid>,
    pub file_paths: HashSet<String>,
    pub epic_id: Option<Uuid>,
    pub project_id: Uuid,
    pub tags: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub testing_requirements: Vec<String>,
}

impl AtomicTask {
    pub fn new(
        title: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
        estimated_hours: f64,
        project_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            task_type,
            priority,
            estimated_hours,
            status: TaskStatus::Pending,
            dependencies: HashSet::new(),
            file_paths: HashSet::new(),
            epic_id: None,
            project_id,
            tags: Vec::new(),
            acceptance_criteria: Vec::new(),
            testing_requirements: Vec::new(),
        }
    }

    /// `dependents` is derived, never stored — computed by the caller from
    /// the `DependencyGraph`, not carried on the task record.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Business-impact tag set used by the scoring model.
    pub fn matches_business_critical_tag(&self) -> bool {
        const CRITICAL_TAGS: [&str; 4] = [
            "critical-path",
            "customer-facing",
            "revenue-impact",
            "security",
        ];
        self.tags
            .iter()
            .any(|t| CRITICAL_TAGS.contains(&t.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpicStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: Uuid,
    pub title: String,
    pub status: EpicStatus,
    pub priority: Priority,
    pub project_id: Uuid,
    /// Ordered, unique. Must stay mutually consistent with each task's
    /// `epic_id` — callers update both sides together (invariant).
    pub task_ids: Vec<Uuid>,
    pub dependencies: HashSet<Uuid>,
    pub estimated_hours: f64,
    pub tags: Vec<String>,
}

impl Epic {
    pub fn new(title: impl Into<String>, priority: Priority, project_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: EpicStatus::Pending,
            priority,
            project_id,
            task_ids: Vec::new(),
            dependencies: HashSet::new(),
            estimated_hours: 0.0,
            tags: Vec::new(),
        }
    }

    /// Adds a task id if not already present, preserving order.
    pub fn add_task(&mut self, task_id: Uuid) {
        if !self.task_ids.contains(&task_id) {
            self.task_ids.push(task_id);
        }
    }

    pub fn remove_task(&mut self, task_id: Uuid) {
        self.task_ids.retain(|id| *id != task_id);
    }
}
