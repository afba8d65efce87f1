use std::time::Duration;
use task_orchestrator_core::config::LockManagerConfig;
use task_orchestrator_core::lock::{resource_name, AcquireOptions, LockManager, LockMode};
use uuid::Uuid;

fn manager() -> LockManager {
    LockManager::new(LockManagerConfig::default())
}

#[tokio::test]
async fn acquire_and_release_is_idempotent() {
    let locks = manager();
    let resource = resource_name::task(Uuid::new_v4());

    let id = locks
        .acquire(&resource, "holder-a", LockMode::Execute, AcquireOptions::default())
        .await
        .unwrap();

    locks.release(id).await.unwrap();
    // releasing twice must not error (idempotent release)
    locks.release(id).await.unwrap();
}

#[tokio::test]
async fn exclusive_lock_blocks_a_second_exclusive_holder() {
    let locks = manager();
    let resource = resource_name::task(Uuid::new_v4());

    let _id = locks
        .acquire(&resource, "holder-a", LockMode::Write, AcquireOptions::default())
        .await
        .unwrap();

    let opts = AcquireOptions {
        timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let err = locks
        .acquire(&resource, "holder-b", LockMode::Write, opts)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
}

#[tokio::test]
async fn releasing_unblocks_a_waiting_acquirer() {
    let locks = std::sync::Arc::new(manager());
    let resource = resource_name::task(Uuid::new_v4());

    let id = locks
        .acquire(&resource, "holder-a", LockMode::Write, AcquireOptions::default())
        .await
        .unwrap();

    let waiter_locks = locks.clone();
    let waiter_resource = resource.clone();
    let waiter = tokio::spawn(async move {
        waiter_locks
            .acquire(
                &waiter_resource,
                "holder-b",
                LockMode::Write,
                AcquireOptions {
                    timeout: Some(Duration::from_secs(2)),
                    ..Default::default()
                },
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    locks.release(id).await.unwrap();

    let result = waiter.await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn zero_timeout_fails_fast_when_contended() {
    let locks = manager();
    let resource = resource_name::task(Uuid::new_v4());

    let _id = locks
        .acquire(&resource, "holder-a", LockMode::Execute, AcquireOptions::default())
        .await
        .unwrap();

    let opts = AcquireOptions {
        timeout: Some(Duration::from_secs(0)),
        ..Default::default()
    };
    let err = locks
        .acquire(&resource, "holder-b", LockMode::Execute, opts)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn shared_read_locks_do_not_conflict_with_each_other() {
    let locks = manager();
    let resource = resource_name::file("src/main.rs");

    let a = locks
        .acquire(&resource, "holder-a", LockMode::Read, AcquireOptions::default())
        .await
        .unwrap();
    let b = locks
        .acquire(&resource, "holder-b", LockMode::Read, AcquireOptions::default())
        .await
        .unwrap();

    assert_ne!(a, b);
    let holders = locks.holder_of(&resource).await;
    assert_eq!(holders.len(), 2);
}
