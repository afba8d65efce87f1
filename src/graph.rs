//! Dependency Graph: a task-id DAG with topological batching and
//! critical-path derivation.
//!
//! Grounded on `agent-orchestrator::workflow::{DependencyResolver,
//! WorkflowOrchestrator::has_cycles/calculate_execution_order}`, which pairs
//! a `petgraph::Graph` with a node-index map and uses
//! `petgraph::algo::is_cyclic_directed` for cycle checks. Two parallel
//! structures (id->node map, adjacency) carry the hot paths rather than
//! relying on `petgraph` alone, so batching and critical-path walk the
//! adjacency maps directly; `petgraph` backs only the cycle check, the same
//! split the source crate uses.

use crate::error::{OrchestrationError, Result};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Task-id DAG. Edges mean "to depends on from".
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    nodes: HashSet<Uuid>,
    /// from -> {to}: "to" depends on "from", i.e. "from" must run first.
    forward: HashMap<Uuid, BTreeSet<Uuid>>,
    /// to -> {from}
    reverse: HashMap<Uuid, BTreeSet<Uuid>>,
    estimated_hours: HashMap<Uuid, f64>,
    completed: HashSet<Uuid>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, task_id: Uuid, estimated_hours: f64) {
        self.nodes.insert(task_id);
        self.forward.entry(task_id).or_default();
        self.reverse.entry(task_id).or_default();
        self.estimated_hours.insert(task_id, estimated_hours);
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.nodes.contains(&task_id)
    }

    /// Adds an edge `from -> to` ("to" depends on "from"). Fails with
    /// `Invariant` if either endpoint is unknown, or if the edge would
    /// introduce a cycle; the graph is left unchanged on failure.
    pub fn add_edge(&mut self, from: Uuid, to: Uuid) -> Result<()> {
        if !self.nodes.contains(&from) || !self.nodes.contains(&to) {
            return Err(OrchestrationError::validation(
                "DependencyGraph",
                "add_edge",
                "unknown task id referenced by edge",
            )
            .with_meta("from", from.to_string())
            .with_meta("to", to.to_string()));
        }

        self.forward.get_mut(&from).unwrap().insert(to);
        self.reverse.get_mut(&to).unwrap().insert(from);

        if self.would_cycle() {
            self.forward.get_mut(&from).unwrap().remove(&to);
            self.reverse.get_mut(&to).unwrap().remove(&from);
            return Err(OrchestrationError::invariant(
                "DependencyGraph",
                "add_edge",
                "edge would introduce a cycle",
            )
            .with_meta("from", from.to_string())
            .with_meta("to", to.to_string()));
        }

        Ok(())
    }

    fn would_cycle(&self) -> bool {
        let mut graph = DiGraph::<Uuid, ()>::new();
        let mut idx: HashMap<Uuid, NodeIndex> = HashMap::new();
        for &n in &self.nodes {
            idx.insert(n, graph.add_node(n));
        }
        for (from, tos) in &self.forward {
            for to in tos {
                graph.add_edge(idx[from], idx[to], ());
            }
        }
        is_cyclic_directed(&graph)
    }

    /// Removes a node from future batch enumeration, retaining it for
    /// transitive-closure queries (`markCompleted`).
    pub fn mark_completed(&mut self, task_id: Uuid) {
        self.completed.insert(task_id);
    }

    pub fn is_completed(&self, task_id: Uuid) -> bool {
        self.completed.contains(&task_id)
    }

    /// Ordered levels of mutually independent, not-yet-completed nodes;
    /// each batch's prerequisites all lie in earlier batches. Deterministic:
    /// ties within a batch broken by ascending task id.
    pub fn topological_batches(&self) -> Vec<Vec<Uuid>> {
        let remaining: HashSet<Uuid> = self
            .nodes
            .iter()
            .copied()
            .filter(|n| !self.completed.contains(n))
            .collect();

        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        for &n in &remaining {
            let deg = self.reverse[&n]
                .iter()
                .filter(|p| remaining.contains(*p))
                .count();
            in_degree.insert(n, deg);
        }

        let mut batches = Vec::new();
        let mut done: HashSet<Uuid> = HashSet::new();

        loop {
            let mut ready: Vec<Uuid> = in_degree
                .iter()
                .filter(|(n, &deg)| deg == 0 && !done.contains(*n))
                .map(|(n, _)| *n)
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort();

            for &n in &ready {
                done.insert(n);
                for succ in &self.forward[&n] {
                    if remaining.contains(succ) && !done.contains(succ) {
                        *in_degree.get_mut(succ).unwrap() -= 1;
                    }
                }
            }
            batches.push(ready);
        }

        batches
    }

    /// Longest chain by summed `estimatedHours` among remaining nodes,
    /// tie-broken by ascending first-node id (resolution).
    pub fn critical_path(&self) -> Vec<Uuid> {
        let remaining: Vec<Uuid> = {
            let mut v: Vec<Uuid> = self
                .nodes
                .iter()
                .copied()
                .filter(|n| !self.completed.contains(n))
                .collect();
            v.sort();
            v
        };

        // Longest path to each node ending there, via memoized DFS over a DAG.
        let mut best_len: HashMap<Uuid, f64> = HashMap::new();
        let mut best_pred: HashMap<Uuid, Option<Uuid>> = HashMap::new();
        let mut order: Vec<Uuid> = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::new();

        fn visit(
            n: Uuid,
            forward: &HashMap<Uuid, BTreeSet<Uuid>>,
            remaining: &HashSet<Uuid>,
            visited: &mut HashSet<Uuid>,
            order: &mut Vec<Uuid>,
        ) {
            if visited.contains(&n) {
                return;
            }
            visited.insert(n);
            if let Some(succs) = forward.get(&n) {
                for &s in succs {
                    if remaining.contains(&s) {
                        visit(s, forward, remaining, visited, order);
                    }
                }
            }
            order.push(n);
        }

        let remaining_set: HashSet<Uuid> = remaining.iter().copied().collect();
        for &n in &remaining {
            visit(n, &self.forward, &remaining_set, &mut visited, &mut order);
        }
        order.reverse(); // topological order: predecessors before successors

        for &n in &order {
            let self_hours = *self.estimated_hours.get(&n).unwrap_or(&0.0);
            let preds: Vec<Uuid> = self.reverse[&n]
                .iter()
                .copied()
                .filter(|p| remaining_set.contains(p))
                .collect();

            if preds.is_empty() {
                best_len.insert(n, self_hours);
                best_pred.insert(n, None);
            } else {
                let mut best: Option<(Uuid, f64)> = None;
                let mut sorted_preds = preds.clone();
                sorted_preds.sort();
                for p in sorted_preds {
                    let candidate = best_len.get(&p).copied().unwrap_or(0.0);
                    match &best {
                        None => best = Some((p, candidate)),
                        Some((_, b)) if candidate > *b => best = Some((p, candidate)),
                        _ => {}
                    }
                }
                let (bp, blen) = best.unwrap();
                best_len.insert(n, blen + self_hours);
                best_pred.insert(n, Some(bp));
            }
        }

        let mut tail_candidates: Vec<Uuid> = remaining.clone();
        tail_candidates.sort_by(|a, b| {
            let la = best_len.get(a).copied().unwrap_or(0.0);
            let lb = best_len.get(b).copied().unwrap_or(0.0);
            lb.partial_cmp(&la)
                .unwrap()
                .then_with(|| a.cmp(b))
        });

        let Some(&tail) = tail_candidates.first() else {
            return Vec::new();
        };

        let mut path = VecDeque::new();
        let mut cur = Some(tail);
        while let Some(n) = cur {
            path.push_front(n);
            cur = best_pred.get(&n).copied().flatten();
        }
        path.into_iter().collect()
    }

    /// Transitive closure: every node reachable (forward) from `task_id`,
    /// including completed ones — used for epic dependent counting.
    pub fn descendants(&self, task_id: Uuid) -> HashSet<Uuid> {
        let mut out = HashSet::new();
        let mut stack = vec![task_id];
        while let Some(n) = stack.pop() {
            if let Some(succs) = self.forward.get(&n) {
                for &s in succs {
                    if out.insert(s) {
                        stack.push(s);
                    }
                }
            }
        }
        out
    }

    pub fn direct_dependencies(&self, task_id: Uuid) -> BTreeSet<Uuid> {
        self.reverse.get(&task_id).cloned().unwrap_or_default()
    }

    pub fn fanout(&self, task_id: Uuid) -> usize {
        self.forward.get(&task_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.nodes.iter().copied()
    }
}
