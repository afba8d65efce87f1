use task_orchestrator_core::config::WorkflowStateConfig;
use task_orchestrator_core::workflow_state::{SubPhase, WorkflowPhase, WorkflowStateManager};
use uuid::Uuid;

fn manager() -> WorkflowStateManager {
    WorkflowStateManager::new(WorkflowStateConfig::default())
}

#[tokio::test]
async fn new_workflow_starts_in_initialization() {
    let manager = manager();
    let id = Uuid::new_v4();
    let snapshot = manager.start_workflow(id).await;
    assert_eq!(snapshot.phase, WorkflowPhase::Initialization);
}

#[tokio::test]
async fn happy_path_transitions_are_accepted_in_order() {
    let manager = manager();
    let id = Uuid::new_v4();
    manager.start_workflow(id).await;

    manager.transition(id, WorkflowPhase::Decomposition).await.unwrap();
    manager.transition(id, WorkflowPhase::Orchestration).await.unwrap();
    manager.transition(id, WorkflowPhase::Execution).await.unwrap();
    let snapshot = manager.transition(id, WorkflowPhase::Completed).await.unwrap();

    assert_eq!(snapshot.phase, WorkflowPhase::Completed);
    assert_eq!(snapshot.history.len(), 5);
}

#[tokio::test]
async fn skipping_a_phase_is_rejected() {
    let manager = manager();
    let id = Uuid::new_v4();
    manager.start_workflow(id).await;

    let err = manager.transition(id, WorkflowPhase::Execution).await.unwrap_err();
    assert_eq!(err.kind, task_orchestrator_core::ErrorKind::Invariant);
}

#[tokio::test]
async fn terminal_phases_accept_no_further_transitions() {
    let manager = manager();
    let id = Uuid::new_v4();
    manager.start_workflow(id).await;
    manager.transition(id, WorkflowPhase::Cancelled).await.unwrap();

    let err = manager.transition(id, WorkflowPhase::Decomposition).await.unwrap_err();
    assert_eq!(err.kind, task_orchestrator_core::ErrorKind::Invariant);
}

#[tokio::test]
async fn overall_progress_credits_earlier_phases_in_full() {
    let manager = manager();
    let id = Uuid::new_v4();
    manager.start_workflow(id).await;

    manager.transition(id, WorkflowPhase::Decomposition).await.unwrap();
    manager.transition(id, WorkflowPhase::Orchestration).await.unwrap();
    manager.transition(id, WorkflowPhase::Execution).await.unwrap();

    // initialization(5) + decomposition(30) + orchestration(15) = 50 of 100
    // already banked before execution's own sub-phases contribute anything.
    manager
        .set_sub_phases(
            id,
            vec![
                SubPhase { name: "parse".into(), weight: 0.25, progress: 1.0 },
                SubPhase { name: "plan".into(), weight: 0.75, progress: 0.0 },
            ],
        )
        .await
        .unwrap();

    let snapshot = manager.get(id).await.unwrap();
    assert!((snapshot.overall_progress() - 0.6125).abs() < 1e-9);

    manager.update_sub_phase_progress(id, "plan", 1.0).await.unwrap();
    let snapshot = manager.get(id).await.unwrap();
    assert!((snapshot.overall_progress() - 0.95).abs() < 1e-9);

    let snapshot = manager.transition(id, WorkflowPhase::Completed).await.unwrap();
    assert!((snapshot.overall_progress() - 1.0).abs() < 1e-9);
}

#[test]
fn resolve_workflow_id_prefers_job_id_over_session_and_task_key() {
    use std::collections::HashMap;
    let job_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let task_id = Uuid::new_v4();

    let mut metadata = HashMap::new();
    metadata.insert("jobId".to_string(), job_id.to_string());
    metadata.insert("sessionId".to_string(), session_id.to_string());
    assert_eq!(WorkflowStateManager::resolve_workflow_id(&metadata, task_id).unwrap(), job_id);

    metadata.remove("jobId");
    assert_eq!(WorkflowStateManager::resolve_workflow_id(&metadata, task_id).unwrap(), session_id);

    metadata.remove("sessionId");
    metadata.insert("taskKey".to_string(), format!("{session_id}-atomic-3"));
    assert_eq!(WorkflowStateManager::resolve_workflow_id(&metadata, task_id).unwrap(), session_id);

    metadata.remove("taskKey");
    assert!(WorkflowStateManager::resolve_workflow_id(&metadata, task_id).is_err());
}
