//! Epic Dependency Manager: derives epic-level dependencies
//! from the task-level graph, orders epics, groups them into phases, and
//! detects structural conflicts.
//!
//! Grounded on `agent-orchestrator::workflow::DependencyResolver`'s
//! task-graph traversal, generalized one level up: where the task graph
//! looks at direct task edges, this module looks at edges between the
//! tasks each pair of epics owns and folds them into one strength score.

use crate::config::EpicGraphConfig;
use crate::error::{OrchestrationError, Result};
use crate::external::LlmRelationshipHelper;
use crate::graph::DependencyGraph;
use crate::task::Epic;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpicDependencyClass {
    Blocks,
    Requires,
    Suggests,
    /// LLM-discovered relationship weaker than a hard block: the target
    /// epic becomes easier or safer to start once the source completes,
    /// but does not strictly require it first.
    Enables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicDependency {
    pub from_epic: Uuid,
    pub to_epic: Uuid,
    pub strength: f64,
    pub class: EpicDependencyClass,
    pub supporting_task_edges: usize,
    /// `true` only for `Blocks`-class edges; surfaced separately from
    /// `class` so callers that only care about hard blocking don't need to
    /// match on the full enum.
    pub critical: bool,
}

/// `strength > 0.7` -> `Blocks`, `0.5..=0.7` -> `Requires`,
/// `0.3..0.5` -> `Suggests` (values below `0.3` are filtered out by
/// `min_dependency_strength` before classification is ever reached).
fn classify_strength(strength: f64) -> EpicDependencyClass {
    if strength > 0.7 {
        EpicDependencyClass::Blocks
    } else if strength >= 0.5 {
        EpicDependencyClass::Requires
    } else {
        EpicDependencyClass::Suggests
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicConflict {
    pub epics: Vec<Uuid>,
    pub reason: String,
}

pub struct EpicDependencyManager {
    config: EpicGraphConfig,
}

impl EpicDependencyManager {
    pub fn new(config: EpicGraphConfig) -> Self {
        Self { config }
    }

    /// Folds task-level edges between each pair of epics into one
    /// dependency strength, keeping only pairs at or above
    /// `min_dependency_strength`.
    pub fn derive_epic_dependencies(
        &self,
        epics: &[Epic],
        task_graph: &DependencyGraph,
    ) -> Vec<EpicDependency> {
        let mut task_to_epic: HashMap<Uuid, Uuid> = HashMap::new();
        for epic in epics {
            for &task_id in &epic.task_ids {
                task_to_epic.insert(task_id, epic.id);
            }
        }

        let mut edge_counts: HashMap<(Uuid, Uuid), usize> = HashMap::new();
        for epic in epics {
            for &task_id in &epic.task_ids {
                for dep_task in task_graph.direct_dependencies(task_id) {
                    let Some(&dep_epic) = task_to_epic.get(&dep_task) else {
                        continue;
                    };
                    if dep_epic == epic.id {
                        continue;
                    }
                    *edge_counts.entry((dep_epic, epic.id)).or_insert(0) += 1;
                }
            }
        }

        let mut out = Vec::new();
        for ((from_epic, to_epic), count) in edge_counts {
            let from_tasks = epics
                .iter()
                .find(|e| e.id == from_epic)
                .map(|e| e.task_ids.len())
                .unwrap_or(1)
                .max(1);
            let to_tasks = epics
                .iter()
                .find(|e| e.id == to_epic)
                .map(|e| e.task_ids.len())
                .unwrap_or(1)
                .max(1);

            let strength = 0.4 * (count as f64 / (from_tasks as f64 * to_tasks as f64))
                + 0.6 * (count as f64 / from_tasks.max(to_tasks) as f64).min(1.0);
            let strength = strength.clamp(0.0, 1.0);
            if strength < self.config.min_dependency_strength {
                continue;
            }

            let class = classify_strength(strength);
            let critical = matches!(class, EpicDependencyClass::Blocks);

            out.push(EpicDependency {
                from_epic,
                to_epic,
                strength,
                class,
                supporting_task_edges: count,
                critical,
            });
        }

        out
    }

    /// Kahn's algorithm over the derived epic dependency edges, ties broken
    /// by ascending epic id, mirroring the task scheduler's batch-ordering
    /// rule.
    pub fn epic_execution_order(&self, epics: &[Epic], deps: &[EpicDependency]) -> Result<Vec<Uuid>> {
        let ids: HashSet<Uuid> = epics.iter().map(|e| e.id).collect();
        let mut in_degree: HashMap<Uuid, usize> = ids.iter().map(|&id| (id, 0)).collect();
        let mut forward: HashMap<Uuid, Vec<Uuid>> = ids.iter().map(|&id| (id, Vec::new())).collect();

        for dep in deps {
            if !ids.contains(&dep.from_epic) || !ids.contains(&dep.to_epic) {
                continue;
            }
            forward.get_mut(&dep.from_epic).unwrap().push(dep.to_epic);
            *in_degree.get_mut(&dep.to_epic).unwrap() += 1;
        }

        let mut order = Vec::with_capacity(ids.len());
        let mut done: HashSet<Uuid> = HashSet::new();
        loop {
            let mut ready: Vec<Uuid> = in_degree
                .iter()
                .filter(|(id, &deg)| deg == 0 && !done.contains(*id))
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort();
            for id in ready {
                done.insert(id);
                order.push(id);
                for &succ in &forward[&id] {
                    if !done.contains(&succ) {
                        *in_degree.get_mut(&succ).unwrap() -= 1;
                    }
                }
            }
        }

        if order.len() != ids.len() {
            return Err(OrchestrationError::invariant(
                "EpicDependencyManager",
                "epic_execution_order",
                "epic dependency graph contains a cycle",
            ));
        }
        Ok(order)
    }

    /// Groups epics into phases via BFS over the dependency edges: phase 0
    /// holds epics with no incoming dependency, phase N holds epics whose
    /// dependencies all resolve by phase N-1 (`generatePhases`).
    pub fn generate_phases(&self, epics: &[Epic], deps: &[EpicDependency]) -> Vec<Vec<Uuid>> {
        let ids: HashSet<Uuid> = epics.iter().map(|e| e.id).collect();
        let mut reverse: HashMap<Uuid, Vec<Uuid>> = ids.iter().map(|&id| (id, Vec::new())).collect();
        for dep in deps {
            if ids.contains(&dep.from_epic) && ids.contains(&dep.to_epic) {
                reverse.get_mut(&dep.to_epic).unwrap().push(dep.from_epic);
            }
        }

        let mut phase_of: HashMap<Uuid, usize> = HashMap::new();
        let mut queue: VecDeque<Uuid> = ids
            .iter()
            .copied()
            .filter(|id| reverse[id].is_empty())
            .collect();
        for &id in &queue {
            phase_of.insert(id, 0);
        }

        while let Some(id) = queue.pop_front() {
            let current_phase = phase_of[&id];
            for dep in deps.iter().filter(|d| d.from_epic == id) {
                let candidate_phase = current_phase + 1;
                let entry = phase_of.entry(dep.to_epic).or_insert(0);
                if candidate_phase > *entry {
                    *entry = candidate_phase;
                    queue.push_back(dep.to_epic);
                }
            }
        }

        let max_phase = phase_of.values().copied().max().unwrap_or(0);
        let mut phases = vec![Vec::new(); max_phase + 1];
        for (&id, &phase) in &phase_of {
            phases[phase].push(id);
        }
        for phase in &mut phases {
            phase.sort();
        }
        phases
    }

    /// Cycles, priority mismatches (a low-priority epic blocking a critical
    /// one), and resource conflicts (two epics sharing more than half their
    /// tasks) are surfaced, never silently dropped.
    pub fn detect_conflicts(&self, epics: &[Epic], deps: &[EpicDependency]) -> Vec<EpicConflict> {
        let mut conflicts = Vec::new();

        if self.epic_execution_order(epics, deps).is_err() {
            conflicts.push(EpicConflict {
                epics: epics.iter().map(|e| e.id).collect(),
                reason: "epic dependency graph contains a cycle".to_string(),
            });
        }

        let by_id: HashMap<Uuid, &Epic> = epics.iter().map(|e| (e.id, e)).collect();
        for dep in deps {
            let (Some(from), Some(to)) = (by_id.get(&dep.from_epic), by_id.get(&dep.to_epic)) else {
                continue;
            };
            if matches!(dep.class, EpicDependencyClass::Blocks)
                && from.priority < to.priority
            {
                conflicts.push(EpicConflict {
                    epics: vec![from.id, to.id],
                    reason: format!(
                        "lower-priority epic {:?} blocks higher-priority epic {:?}",
                        from.priority, to.priority
                    ),
                });
            }
        }

        for i in 0..epics.len() {
            for j in (i + 1)..epics.len() {
                let a: HashSet<Uuid> = epics[i].task_ids.iter().copied().collect();
                let b: HashSet<Uuid> = epics[j].task_ids.iter().copied().collect();
                if a.is_empty() || b.is_empty() {
                    continue;
                }
                let shared = a.intersection(&b).count();
                let smaller = a.len().min(b.len());
                if smaller > 0 && shared as f64 / smaller as f64 > 0.5 {
                    conflicts.push(EpicConflict {
                        epics: vec![epics[i].id, epics[j].id],
                        reason: "epics share more than half of a task set; likely duplicated scope".to_string(),
                    });
                }
            }
        }

        conflicts
    }

    /// Optional: asks an external LLM helper to propose additional
    /// relationships beyond what the task graph implies, keeping only
    /// proposals at or above both configured thresholds and that don't
    /// introduce a cycle into `existing` (checked incrementally, so a
    /// later accepted proposal sees the earlier ones from this same call).
    pub async fn discover_intelligent_relationships(
        &self,
        epics: &[Epic],
        helper: &dyn LlmRelationshipHelper,
        existing: &[EpicDependency],
    ) -> Result<Vec<EpicDependency>> {
        if !self.config.enable_llm_relationship_discovery {
            return Ok(Vec::new());
        }

        let summary = epics
            .iter()
            .map(|e| format!("{}: {}", e.id, e.title))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given these epics, propose additional dependency relationships as a JSON array \
             of {{from_epic, to_epic, confidence, strength}} objects:\n{summary}"
        );

        let items = crate::external::call_with_validation(helper, &prompt).await?;
        let mut accepted: Vec<EpicDependency> = Vec::new();
        for item in items {
            let confidence = item.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let strength = item.get("strength").and_then(|v| v.as_f64()).unwrap_or(0.0);
            if confidence < self.config.llm_confidence_threshold
                || strength < self.config.llm_strength_threshold
            {
                continue;
            }
            let (Some(from_epic), Some(to_epic)) = (
                item.get("from_epic").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok()),
                item.get("to_epic").and_then(|v| v.as_str()).and_then(|s| Uuid::parse_str(s).ok()),
            ) else {
                continue;
            };

            let class = if strength > 0.7 {
                EpicDependencyClass::Blocks
            } else {
                EpicDependencyClass::Enables
            };
            let candidate = EpicDependency {
                from_epic,
                to_epic,
                strength,
                class,
                supporting_task_edges: 0,
                critical: matches!(class, EpicDependencyClass::Blocks),
            };

            let trial: Vec<EpicDependency> = existing
                .iter()
                .cloned()
                .chain(accepted.iter().cloned())
                .chain(std::iter::once(candidate.clone()))
                .collect();
            if self.epic_execution_order(epics, &trial).is_err() {
                continue;
            }
            accepted.push(candidate);
        }
        Ok(accepted)
    }
}
