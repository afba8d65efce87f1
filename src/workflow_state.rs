//! Workflow State Manager: tracks a workflow's phase and sub-phase
//! progress, validates transitions, and persists snapshots.
//!
//! Grounded on `bmad-workflow::workflow::BMADWorkflow` (`current_phase` +
//! `workflow_history` of steps, `status` enum, JSON-serializable snapshot)
//! adapted from BMAD's five fixed phases to this crate's seven-phase
//! workflow lifecycle.

use crate::error::{OrchestrationError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowPhase {
    Initialization,
    Decomposition,
    Orchestration,
    Execution,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowPhase {
    fn is_terminal(self) -> bool {
        matches!(self, WorkflowPhase::Completed | WorkflowPhase::Failed | WorkflowPhase::Cancelled)
    }

    /// Valid forward transitions: the happy path runs
    /// Initialization -> Decomposition -> Orchestration -> Execution ->
    /// Completed; Failed/Cancelled are reachable from any non-terminal
    /// phase.
    fn can_transition_to(self, next: WorkflowPhase) -> bool {
        use WorkflowPhase::*;
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Initialization, Decomposition)
                | (Decomposition, Orchestration)
                | (Orchestration, Execution)
                | (Execution, Completed)
        )
    }
}

/// Per-phase execution state, orthogonal to `WorkflowPhase`: a phase is
/// entered in `Pending` and must reach `Completed` (or a terminal
/// `Failed`/`Cancelled`) before the workflow moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Blocked,
    Retrying,
}

/// Whether `phase` can ever carry `state` — the terminal phases only ever
/// carry their matching terminal state.
fn valid_state_for_phase(phase: WorkflowPhase, state: WorkflowState) -> bool {
    match phase {
        WorkflowPhase::Completed => state == WorkflowState::Completed,
        WorkflowPhase::Failed => state == WorkflowState::Failed,
        WorkflowPhase::Cancelled => state == WorkflowState::Cancelled,
        WorkflowPhase::Initialization
        | WorkflowPhase::Decomposition
        | WorkflowPhase::Orchestration
        | WorkflowPhase::Execution => true,
    }
}

/// State adjacency, independent of phase: which `phase:state` pair a
/// `phase:state` pair may move to within the same phase.
fn state_transition_allowed(from: WorkflowState, to: WorkflowState) -> bool {
    use WorkflowState::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (InProgress, Completed)
            | (InProgress, Failed)
            | (InProgress, Blocked)
            | (InProgress, Cancelled)
            | (Blocked, InProgress)
            | (Blocked, Cancelled)
            | (Failed, Retrying)
            | (Retrying, InProgress)
            | (Retrying, Failed)
            | (Retrying, Cancelled)
    )
}

/// Cross-phase weights used by `overall_progress`; `Failed`/`Cancelled`
/// carry no weight of their own since they never contribute additional
/// completed work on top of whatever phase they interrupted.
fn phase_weight(phase: WorkflowPhase) -> f64 {
    match phase {
        WorkflowPhase::Initialization => 5.0,
        WorkflowPhase::Decomposition => 30.0,
        WorkflowPhase::Orchestration => 15.0,
        WorkflowPhase::Execution => 45.0,
        WorkflowPhase::Completed => 5.0,
        WorkflowPhase::Failed | WorkflowPhase::Cancelled => 0.0,
    }
}

const PHASE_ORDER: [WorkflowPhase; 5] = [
    WorkflowPhase::Initialization,
    WorkflowPhase::Decomposition,
    WorkflowPhase::Orchestration,
    WorkflowPhase::Execution,
    WorkflowPhase::Completed,
];

const TOTAL_PHASE_WEIGHT: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPhase {
    pub name: String,
    pub weight: f64,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: Uuid,
    pub phase: WorkflowPhase,
    pub state: WorkflowState,
    pub sub_phases: Vec<SubPhase>,
    pub history: Vec<(WorkflowPhase, DateTime<Utc>)>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    fn new(workflow_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            phase: WorkflowPhase::Initialization,
            state: WorkflowState::Pending,
            sub_phases: Vec::new(),
            history: vec![(WorkflowPhase::Initialization, now)],
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of `weight * progress` over the current phase's sub-phases,
    /// normalized by total weight.
    fn sub_phase_progress(&self) -> f64 {
        let total_weight: f64 = self.sub_phases.iter().map(|s| s.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = self.sub_phases.iter().map(|s| s.weight * s.progress).sum();
        (weighted / total_weight).clamp(0.0, 1.0)
    }

    /// Weighted across phases (`initialization 5, decomposition 30,
    /// orchestration 15, execution 45, completed 5`, normalized):
    /// every phase before the current one counts in full, the current
    /// phase counts by its own sub-phase fraction. A workflow that failed
    /// or was cancelled is credited for whatever phase it was in at the
    /// time, read back off its transition history.
    pub fn overall_progress(&self) -> f64 {
        if self.phase == WorkflowPhase::Completed {
            return 1.0;
        }

        if matches!(self.phase, WorkflowPhase::Failed | WorkflowPhase::Cancelled) {
            let interrupted = self
                .history
                .iter()
                .rev()
                .skip(1)
                .find_map(|(p, _)| PHASE_ORDER.iter().position(|x| *x == *p));
            let Some(index) = interrupted else {
                return 0.0;
            };
            let completed_weight: f64 = PHASE_ORDER[..index].iter().map(|&p| phase_weight(p)).sum();
            let current_weight = phase_weight(PHASE_ORDER[index]);
            return ((completed_weight + current_weight * self.sub_phase_progress()) / TOTAL_PHASE_WEIGHT)
                .clamp(0.0, 1.0);
        }

        let current_index = PHASE_ORDER.iter().position(|&p| p == self.phase).unwrap_or(0);
        let completed_weight: f64 = PHASE_ORDER[..current_index].iter().map(|&p| phase_weight(p)).sum();
        let current_weight = phase_weight(self.phase);
        ((completed_weight + current_weight * self.sub_phase_progress()) / TOTAL_PHASE_WEIGHT).clamp(0.0, 1.0)
    }
}

pub struct WorkflowStateManager {
    config: crate::config::WorkflowStateConfig,
    workflows: RwLock<HashMap<Uuid, WorkflowSnapshot>>,
}

impl WorkflowStateManager {
    pub fn new(config: crate::config::WorkflowStateConfig) -> Self {
        Self {
            config,
            workflows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn start_workflow(&self, workflow_id: Uuid) -> WorkflowSnapshot {
        let snapshot = WorkflowSnapshot::new(workflow_id);
        self.workflows.write().await.insert(workflow_id, snapshot.clone());
        info!(workflow_id = %workflow_id, "workflow started");
        snapshot
    }

    pub async fn transition(&self, workflow_id: Uuid, next: WorkflowPhase) -> Result<WorkflowSnapshot> {
        let mut workflows = self.workflows.write().await;
        let Some(snapshot) = workflows.get_mut(&workflow_id) else {
            return Err(OrchestrationError::validation(
                "WorkflowStateManager",
                "transition",
                "unknown workflow id",
            )
            .with_meta("workflow_id", workflow_id.to_string()));
        };

        if !snapshot.phase.can_transition_to(next) {
            return Err(OrchestrationError::invariant(
                "WorkflowStateManager",
                "transition",
                "invalid phase transition",
            )
            .with_meta("from", format!("{:?}", snapshot.phase))
            .with_meta("to", format!("{next:?}")));
        }

        snapshot.phase = next;
        snapshot.state = match next {
            WorkflowPhase::Completed => WorkflowState::Completed,
            WorkflowPhase::Failed => WorkflowState::Failed,
            WorkflowPhase::Cancelled => WorkflowState::Cancelled,
            _ => WorkflowState::Pending,
        };
        snapshot.sub_phases.clear();
        snapshot.updated_at = Utc::now();
        snapshot.history.push((next, snapshot.updated_at));
        Ok(snapshot.clone())
    }

    /// Moves the current phase's sub-state, validated against the
    /// `phase:state` transition table (`valid_state_for_phase` +
    /// `state_transition_allowed`). Does not change `phase` — use
    /// `transition` once the state reaches `Completed`.
    pub async fn transition_state(&self, workflow_id: Uuid, next: WorkflowState) -> Result<WorkflowSnapshot> {
        let mut workflows = self.workflows.write().await;
        let Some(snapshot) = workflows.get_mut(&workflow_id) else {
            return Err(OrchestrationError::validation(
                "WorkflowStateManager",
                "transition_state",
                "unknown workflow id",
            )
            .with_meta("workflow_id", workflow_id.to_string()));
        };

        if !valid_state_for_phase(snapshot.phase, next) || !state_transition_allowed(snapshot.state, next) {
            return Err(OrchestrationError::invariant(
                "WorkflowStateManager",
                "transition_state",
                "invalid phase:state transition",
            )
            .with_meta("phase", format!("{:?}", snapshot.phase))
            .with_meta("from_state", format!("{:?}", snapshot.state))
            .with_meta("to_state", format!("{next:?}")));
        }

        snapshot.state = next;
        snapshot.updated_at = Utc::now();
        Ok(snapshot.clone())
    }

    pub async fn set_sub_phases(&self, workflow_id: Uuid, sub_phases: Vec<SubPhase>) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let snapshot = workflows.get_mut(&workflow_id).ok_or_else(|| {
            OrchestrationError::validation("WorkflowStateManager", "set_sub_phases", "unknown workflow id")
        })?;
        snapshot.sub_phases = sub_phases;
        snapshot.updated_at = Utc::now();
        Ok(())
    }

    pub async fn update_sub_phase_progress(&self, workflow_id: Uuid, name: &str, progress: f64) -> Result<()> {
        let mut workflows = self.workflows.write().await;
        let snapshot = workflows.get_mut(&workflow_id).ok_or_else(|| {
            OrchestrationError::validation("WorkflowStateManager", "update_sub_phase_progress", "unknown workflow id")
        })?;
        let sub_phase = snapshot
            .sub_phases
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                OrchestrationError::validation(
                    "WorkflowStateManager",
                    "update_sub_phase_progress",
                    "unknown sub-phase name",
                )
                .with_meta("name", name.to_string())
            })?;
        sub_phase.progress = progress.clamp(0.0, 1.0);
        snapshot.updated_at = Utc::now();
        Ok(())
    }

    pub async fn get(&self, workflow_id: Uuid) -> Option<WorkflowSnapshot> {
        self.workflows.read().await.get(&workflow_id).cloned()
    }

    /// Resolves the owning workflow id for an incoming task/event using the
    /// priority order `metadata.jobId -> metadata.sessionId ->
    /// metadata.taskKey` (parsed as a subtask-of-parent pattern). Returns a
    /// typed `Validation` error rather than silently falling back to
    /// `task_id` when nothing resolves.
    pub fn resolve_workflow_id(metadata: &HashMap<String, String>, task_id: Uuid) -> Result<Uuid> {
        if let Some(job_id) = metadata.get("jobId").and_then(|s| Uuid::parse_str(s).ok()) {
            return Ok(job_id);
        }
        if let Some(session_id) = metadata.get("sessionId").and_then(|s| Uuid::parse_str(s).ok()) {
            return Ok(session_id);
        }

        if let Some(task_key) = metadata.get("taskKey") {
            for re in [named_subtask_pattern(), generic_subtask_pattern()] {
                if let Some(parent_id) = re
                    .captures(task_key)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| Uuid::parse_str(m.as_str()).ok())
                {
                    return Ok(parent_id);
                }
            }
        }

        Err(OrchestrationError::validation(
            "WorkflowStateManager",
            "resolve_workflow_id",
            "could not resolve a workflow id from jobId, sessionId, or taskKey",
        )
        .with_meta("task_id", task_id.to_string()))
    }

    pub async fn save_snapshot(&self, workflow_id: Uuid) -> Result<Option<PathBuf>> {
        let Some(dir) = self.config.snapshot_dir.as_ref() else {
            return Ok(None);
        };
        let Some(snapshot) = self.get(workflow_id).await else {
            return Ok(None);
        };

        let path = Path::new(dir).join(format!("workflow-{workflow_id}.json"));
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| {
            OrchestrationError::invariant("WorkflowStateManager", "save_snapshot", "serialization failed")
                .with_cause(e)
        })?;
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            OrchestrationError::transient("WorkflowStateManager", "save_snapshot", "failed to create snapshot dir")
                .with_cause(e)
        })?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            OrchestrationError::transient("WorkflowStateManager", "save_snapshot", "failed to write snapshot")
                .with_cause(e)
        })?;
        Ok(Some(path))
    }

    pub async fn load_snapshot(&self, path: &Path) -> Result<WorkflowSnapshot> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            OrchestrationError::transient("WorkflowStateManager", "load_snapshot", "failed to read snapshot")
                .with_cause(e)
        })?;
        let snapshot: WorkflowSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            OrchestrationError::validation("WorkflowStateManager", "load_snapshot", "malformed snapshot json")
                .with_cause(e)
        })?;
        self.workflows.write().await.insert(snapshot.workflow_id, snapshot.clone());
        Ok(snapshot)
    }

    pub async fn cleanup_old_snapshots(&self) -> Result<usize> {
        let Some(dir) = self.config.snapshot_dir.as_ref() else {
            return Ok(0);
        };
        let cutoff = Utc::now() - chrono::Duration::days(self.config.snapshot_retention_days as i64);

        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => return Ok(0),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            let modified: DateTime<Utc> = modified.into();
            if modified < cutoff && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Matches `<parent>-atomic-3`, `<parent>-plan-1`, `<parent>-impl-12`: the
/// subtask-kind suffixes this crate actually generates.
fn named_subtask_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+)-(?:atomic|plan|impl)-\d+$").unwrap())
}

/// Looser fallback for any `<parent>-<word>-<n>` shaped key from a caller
/// using a subtask-kind this crate doesn't name explicitly.
fn generic_subtask_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+)-[A-Za-z]+-\d+$").unwrap())
}
