use task_orchestrator_core::config::EpicGraphConfig;
use task_orchestrator_core::epic_graph::EpicDependencyManager;
use task_orchestrator_core::{DependencyGraph, Epic, Priority};
use uuid::Uuid;

fn epic(title: &str, priority: Priority, project: Uuid) -> Epic {
    Epic::new(title, priority, project)
}

#[test]
fn derives_a_dependency_when_tasks_cross_epic_boundaries() {
    let project = Uuid::new_v4();
    let mut upstream = epic("upstream", Priority::Medium, project);
    let mut downstream = epic("downstream", Priority::Medium, project);

    let t1 = Uuid::new_v4();
    let t2 = Uuid::new_v4();
    upstream.add_task(t1);
    downstream.add_task(t2);

    let mut graph = DependencyGraph::new();
    graph.add_node(t1, 1.0);
    graph.add_node(t2, 1.0);
    graph.add_edge(t1, t2).unwrap();

    let manager = EpicDependencyManager::new(EpicGraphConfig::default());
    let deps = manager.derive_epic_dependencies(&[upstream.clone(), downstream.clone()], &graph);

    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].from_epic, upstream.id);
    assert_eq!(deps[0].to_epic, downstream.id);
}

#[test]
fn epic_execution_order_respects_dependencies() {
    let project = Uuid::new_v4();
    let mut upstream = epic("upstream", Priority::Medium, project);
    let mut downstream = epic("downstream", Priority::Medium, project);
    let t1 = Uuid::new_v4();
    let t2 = Uuid::new_v4();
    upstream.add_task(t1);
    downstream.add_task(t2);

    let mut graph = DependencyGraph::new();
    graph.add_node(t1, 1.0);
    graph.add_node(t2, 1.0);
    graph.add_edge(t1, t2).unwrap();

    let manager = EpicDependencyManager::new(EpicGraphConfig::default());
    let epics = vec![upstream.clone(), downstream.clone()];
    let deps = manager.derive_epic_dependencies(&epics, &graph);
    let order = manager.epic_execution_order(&epics, &deps).unwrap();

    let upstream_pos = order.iter().position(|id| *id == upstream.id).unwrap();
    let downstream_pos = order.iter().position(|id| *id == downstream.id).unwrap();
    assert!(upstream_pos < downstream_pos);
}

#[test]
fn detect_conflicts_flags_resource_overlap() {
    let project = Uuid::new_v4();
    let shared_task = Uuid::new_v4();
    let mut epic_a = epic("a", Priority::Medium, project);
    let mut epic_b = epic("b", Priority::Medium, project);
    epic_a.add_task(shared_task);
    epic_b.add_task(shared_task);

    let manager = EpicDependencyManager::new(EpicGraphConfig::default());
    let conflicts = manager.detect_conflicts(&[epic_a, epic_b], &[]);
    assert!(!conflicts.is_empty());
}

#[test]
fn generate_phases_groups_independent_epics_together() {
    let project = Uuid::new_v4();
    let epic_a = epic("a", Priority::Medium, project);
    let epic_b = epic("b", Priority::Medium, project);

    let manager = EpicDependencyManager::new(EpicGraphConfig::default());
    let phases = manager.generate_phases(&[epic_a.clone(), epic_b.clone()], &[]);

    assert_eq!(phases.len(), 1);
    assert_eq!(phases[0].len(), 2);
}
