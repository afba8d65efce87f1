use task_orchestrator_core::config::ResourceBudget;
use task_orchestrator_core::scoring::{self, SystemLoadSnapshot};
use task_orchestrator_core::{AtomicTask, Priority, TaskType};
use uuid::Uuid;

fn task(priority: Priority, hours: f64) -> AtomicTask {
    AtomicTask::new("t", TaskType::Development, priority, hours, Uuid::new_v4())
}

#[test]
fn priority_score_matches_the_fixed_table() {
    assert_eq!(scoring::priority_score(&task(Priority::Critical, 1.0)), 1.0);
    assert_eq!(scoring::priority_score(&task(Priority::High, 1.0)), 0.8);
    assert_eq!(scoring::priority_score(&task(Priority::Medium, 1.0)), 0.6);
    assert_eq!(scoring::priority_score(&task(Priority::Low, 1.0)), 0.4);
}

#[test]
fn duration_score_penalizes_long_tasks_but_is_capped() {
    let short = scoring::duration_score(&task(Priority::Medium, 1.0));
    let long = scoring::duration_score(&task(Priority::Medium, 40.0));
    assert!(short > long);
    assert!(long >= 0.2 - 1e-9); // capped at 1 - 0.8
}

#[test]
fn resource_score_is_within_unit_interval() {
    let resources = ResourceBudget::default();
    let score = scoring::resource_score(&task(Priority::Medium, 4.0), &resources);
    assert!((0.0..=1.0).contains(&score));
}

#[test]
fn agent_availability_is_zero_with_no_agents() {
    let resources = ResourceBudget::default();
    let score = scoring::agent_availability_score(&task(Priority::Medium, 1.0), &[], &resources);
    assert_eq!(score, 0.0);
}

#[test]
fn business_impact_rewards_critical_tags() {
    let mut plain = task(Priority::Medium, 1.0);
    let mut tagged = task(Priority::Medium, 1.0);
    tagged.tags.push("security".to_string());

    let plain_score = scoring::business_impact_score(&plain);
    let tagged_score = scoring::business_impact_score(&tagged);
    assert!(tagged_score > plain_score);

    plain.tags.push("unrelated".to_string());
    assert_eq!(scoring::business_impact_score(&plain), plain_score);
}

#[test]
fn system_load_score_drops_as_load_rises() {
    let resources = ResourceBudget::default();
    let t = task(Priority::Medium, 1.0);

    let low_load = SystemLoadSnapshot {
        current_memory_fraction: 0.1,
        current_cpu_fraction: 0.1,
        free_agent_slots: 4,
        max_concurrent: 5,
    };
    let high_load = SystemLoadSnapshot {
        current_memory_fraction: 0.8,
        current_cpu_fraction: 0.8,
        free_agent_slots: 0,
        max_concurrent: 5,
    };

    let low = scoring::system_load_score(&t, &resources, low_load);
    let high = scoring::system_load_score(&t, &resources, high_load);
    assert!(low > high);
}
