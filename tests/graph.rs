use task_orchestrator_core::DependencyGraph;
use uuid::Uuid;

#[test]
fn add_edge_rejects_cycles() {
    let mut graph = DependencyGraph::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    graph.add_node(a, 1.0);
    graph.add_node(b, 1.0);
    graph.add_node(c, 1.0);

    graph.add_edge(a, b).unwrap();
    graph.add_edge(b, c).unwrap();

    let err = graph.add_edge(c, a).unwrap_err();
    assert_eq!(err.kind, task_orchestrator_core::ErrorKind::Invariant);

    // graph must be left unchanged: c -> a never took effect
    assert!(graph.direct_dependencies(a).is_empty());
}

#[test]
fn add_edge_rejects_unknown_nodes() {
    let mut graph = DependencyGraph::new();
    let a = Uuid::new_v4();
    graph.add_node(a, 1.0);
    let unknown = Uuid::new_v4();

    let err = graph.add_edge(a, unknown).unwrap_err();
    assert_eq!(err.kind, task_orchestrator_core::ErrorKind::Validation);
}

#[test]
fn topological_batches_respect_dependencies_and_are_deterministic() {
    let mut graph = DependencyGraph::new();
    let mut ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    ids.sort();
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

    for id in [a, b, c, d] {
        graph.add_node(id, 1.0);
    }
    graph.add_edge(a, c).unwrap();
    graph.add_edge(b, c).unwrap();
    graph.add_edge(c, d).unwrap();

    let batches = graph.topological_batches();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0], vec![a, b]);
    assert_eq!(batches[1], vec![c]);
    assert_eq!(batches[2], vec![d]);
}

#[test]
fn topological_batches_skip_completed_nodes() {
    let mut graph = DependencyGraph::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    graph.add_node(a, 1.0);
    graph.add_node(b, 1.0);
    graph.add_edge(a, b).unwrap();

    graph.mark_completed(a);
    let batches = graph.topological_batches();
    assert_eq!(batches, vec![vec![b]]);
}

#[test]
fn critical_path_picks_longest_chain_by_hours() {
    let mut graph = DependencyGraph::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let d = Uuid::new_v4();

    graph.add_node(a, 1.0);
    graph.add_node(b, 5.0);
    graph.add_node(c, 1.0);
    graph.add_node(d, 1.0);

    // a -> b -> d (1 + 5 + 1 = 7) is longer than a -> c -> d (1 + 1 + 1 = 3)
    graph.add_edge(a, b).unwrap();
    graph.add_edge(a, c).unwrap();
    graph.add_edge(b, d).unwrap();
    graph.add_edge(c, d).unwrap();

    let path = graph.critical_path();
    assert_eq!(path, vec![a, b, d]);
}

#[test]
fn critical_path_breaks_ties_by_ascending_first_node_id() {
    let mut graph = DependencyGraph::new();
    let mut ids: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
    ids.sort();
    let (low, high) = (ids[0], ids[1]);

    graph.add_node(low, 3.0);
    graph.add_node(high, 3.0);

    let path = graph.critical_path();
    assert_eq!(path.first(), Some(&low));
}
