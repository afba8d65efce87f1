use chrono::Utc;
use std::collections::HashMap;
use task_orchestrator_core::config::{SchedulerConfig, SchedulingAlgorithm};
use task_orchestrator_core::scheduler::{SchedulingContext, TaskScheduler};
use task_orchestrator_core::scoring::SystemLoadSnapshot;
use task_orchestrator_core::{AtomicTask, DependencyGraph, Priority, TaskType};
use uuid::Uuid;

fn make_task(project: Uuid, priority: Priority, hours: f64) -> AtomicTask {
    AtomicTask::new("task", TaskType::Development, priority, hours, project)
}

fn default_load() -> SystemLoadSnapshot {
    SystemLoadSnapshot {
        current_memory_fraction: 0.1,
        current_cpu_fraction: 0.1,
        free_agent_slots: 3,
        max_concurrent: 5,
    }
}

#[tokio::test]
async fn generate_schedule_batches_match_graph_topology() {
    let project = Uuid::new_v4();
    let t1 = make_task(project, Priority::Medium, 2.0);
    let t2 = make_task(project, Priority::High, 1.0);

    let mut graph = DependencyGraph::new();
    graph.add_node(t1.id, t1.estimated_hours);
    graph.add_node(t2.id, t2.estimated_hours);
    graph.add_edge(t1.id, t2.id).unwrap();

    let mut tasks = HashMap::new();
    tasks.insert(t1.id, t1.clone());
    tasks.insert(t2.id, t2.clone());

    let scheduler = TaskScheduler::new(SchedulerConfig::default()).unwrap();
    let schedule = scheduler
        .generate_schedule(
            project,
            SchedulingContext {
                tasks: &tasks,
                graph: &graph,
                agents: &[],
                load: default_load(),
                now: Utc::now(),
            },
        )
        .await
        .unwrap();

    assert_eq!(schedule.tasks.len(), 2);
    assert_eq!(schedule.ready_tasks(), vec![t1.id]);
    assert_eq!(schedule.batch(1), vec![t2.id]);
}

#[tokio::test]
async fn priority_first_orders_critical_before_low_within_a_batch() {
    let project = Uuid::new_v4();
    let low = make_task(project, Priority::Low, 1.0);
    let critical = make_task(project, Priority::Critical, 1.0);

    let mut graph = DependencyGraph::new();
    graph.add_node(low.id, low.estimated_hours);
    graph.add_node(critical.id, critical.estimated_hours);

    let mut tasks = HashMap::new();
    tasks.insert(low.id, low.clone());
    tasks.insert(critical.id, critical.clone());

    let mut config = SchedulerConfig::default();
    config.algorithm = SchedulingAlgorithm::PriorityFirst;
    let scheduler = TaskScheduler::new(config).unwrap();

    let schedule = scheduler
        .generate_schedule(
            project,
            SchedulingContext {
                tasks: &tasks,
                graph: &graph,
                agents: &[],
                load: default_load(),
                now: Utc::now(),
            },
        )
        .await
        .unwrap();

    let order: Vec<Uuid> = schedule.tasks.iter().map(|t| t.task_id).collect();
    assert_eq!(order, vec![critical.id, low.id]);
}

#[tokio::test]
async fn mark_task_completed_removes_it_from_the_schedule() {
    let project = Uuid::new_v4();
    let t1 = make_task(project, Priority::Medium, 1.0);

    let mut graph = DependencyGraph::new();
    graph.add_node(t1.id, t1.estimated_hours);

    let mut tasks = HashMap::new();
    tasks.insert(t1.id, t1.clone());

    let scheduler = TaskScheduler::new(SchedulerConfig::default()).unwrap();
    scheduler
        .generate_schedule(
            project,
            SchedulingContext {
                tasks: &tasks,
                graph: &graph,
                agents: &[],
                load: default_load(),
                now: Utc::now(),
            },
        )
        .await
        .unwrap();

    scheduler.mark_task_completed(t1.id).await;
    let current = scheduler.current_schedule().await.unwrap();
    assert!(current.tasks.is_empty());
}

#[test]
fn invalid_weight_fails_construction() {
    let mut config = SchedulerConfig::default();
    config.weights.dependency = 1.5;
    let err = TaskScheduler::new(config).unwrap_err();
    assert_eq!(err.kind, task_orchestrator_core::ErrorKind::Configuration);
}
