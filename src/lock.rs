//! Lock Manager: named-resource locks with timeouts and
//! deadlock detection.
//!
//! Grounded on `agent-orchestrator::recovery::{CircuitBreaker,
//! RecoveryManager}` for the shape of a small state-tracking manager behind
//! a `RwLock`-guarded map, and on
//! `other_examples/.../forge_agent-src-workflow-deadlock.rs` for expressing
//! cycle detection over a dependency-style graph with `petgraph`. Deadlock
//! detection here runs over the *wait-for* graph (who is blocked on whom),
//! not the task graph that file analyzes, but reuses the same
//! cycle-via-SCC technique.

use crate::error::{OrchestrationError, Result};
use chrono::{DateTime, Utc};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Execute,
    Write,
    Read,
}

impl LockMode {
    fn exclusive(self) -> bool {
        matches!(self, LockMode::Execute | LockMode::Write)
    }
}

#[derive(Debug, Clone)]
pub struct Lock {
    pub id: Uuid,
    pub resource: String,
    pub holder_id: String,
    pub mode: LockMode,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    pub timeout: Option<Duration>,
    pub session_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

struct Waiter {
    holder_id: String,
    notify: Arc<Notify>,
    arrived_at: DateTime<Utc>,
}

#[derive(Default)]
struct ResourceState {
    holders: Vec<Lock>,
    waiters: Vec<Waiter>,
}

pub struct LockManager {
    config: crate::config::LockManagerConfig,
    resources: RwLock<HashMap<String, ResourceState>>,
    locks_by_id: RwLock<HashMap<Uuid, String>>,
}

impl LockManager {
    pub fn new(config: crate::config::LockManagerConfig) -> Self {
        Self {
            config,
            resources: RwLock::new(HashMap::new()),
            locks_by_id: RwLock::new(HashMap::new()),
        }
    }

    /// Acquires `resource` for `holder_id` in `mode`, blocking up to
    /// `opts.timeout`. A zero timeout fails immediately with a `Transient`
    /// "lock timeout" error.
    pub async fn acquire(
        &self,
        resource: &str,
        holder_id: &str,
        mode: LockMode,
        opts: AcquireOptions,
    ) -> Result<Uuid> {
        let timeout = opts
            .timeout
            .unwrap_or_else(|| Duration::from_secs(self.config.default_lock_timeout_secs))
            .min(Duration::from_secs(self.config.max_lock_timeout_secs));

        self.expire_stale(resource).await;

        if self.try_grant(resource, holder_id, mode, &opts).await? {
            return self.lock_id_for(resource, holder_id).await;
        }

        if timeout.is_zero() {
            return Err(OrchestrationError::transient(
                "LockManager",
                "acquire",
                "lock timeout (timeout=0)",
            )
            .with_meta("resource", resource.to_string()));
        }

        let notify = Arc::new(Notify::new());
        {
            let mut resources = self.resources.write().await;
            let state = resources.entry(resource.to_string()).or_default();
            state.waiters.push(Waiter {
                holder_id: holder_id.to_string(),
                notify: Arc::clone(&notify),
                arrived_at: Utc::now(),
            });
        }

        if self.config.enable_deadlock_detection {
            if let Some(victim) = self.detect_deadlock(resource, holder_id).await {
                self.remove_waiter(resource, &victim).await;
                return Err(OrchestrationError::invariant(
                    "LockManager",
                    "acquire",
                    "deadlock detected; waiter aborted",
                )
                .with_meta("resource", resource.to_string())
                .with_meta("aborted_holder", victim));
            }
        }

        let wait = tokio::time::timeout(timeout, notify.notified()).await;
        self.remove_waiter(resource, holder_id).await;

        if wait.is_err() {
            return Err(OrchestrationError::transient(
                "LockManager",
                "acquire",
                "lock timeout",
            )
            .with_meta("resource", resource.to_string())
            .with_meta("holder_id", holder_id.to_string()));
        }

        if self.try_grant(resource, holder_id, mode, &opts).await? {
            self.lock_id_for(resource, holder_id).await
        } else {
            Err(OrchestrationError::transient(
                "LockManager",
                "acquire",
                "lock timeout",
            )
            .with_meta("resource", resource.to_string()))
        }
    }

    async fn lock_id_for(&self, resource: &str, holder_id: &str) -> Result<Uuid> {
        let resources = self.resources.read().await;
        resources
            .get(resource)
            .and_then(|s| s.holders.iter().find(|l| l.holder_id == holder_id))
            .map(|l| l.id)
            .ok_or_else(|| {
                OrchestrationError::transient("LockManager", "acquire", "lock timeout")
                    .with_meta("resource", resource.to_string())
            })
    }

    async fn try_grant(
        &self,
        resource: &str,
        holder_id: &str,
        mode: LockMode,
        opts: &AcquireOptions,
    ) -> Result<bool> {
        let mut resources = self.resources.write().await;
        let state = resources.entry(resource.to_string()).or_default();

        let conflicts = state.holders.iter().any(|l| {
            if mode.exclusive() || l.mode.exclusive() {
                true
            } else {
                false
            }
        });
        if conflicts {
            return Ok(false);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(Duration::from_secs(
                self.config.default_lock_timeout_secs,
            ))
            .unwrap_or_default();

        state.holders.push(Lock {
            id,
            resource: resource.to_string(),
            holder_id: holder_id.to_string(),
            mode,
            acquired_at: now,
            expires_at,
            session_id: opts.session_id.clone(),
        });
        drop(resources);

        self.locks_by_id
            .write()
            .await
            .insert(id, resource.to_string());
        Ok(true)
    }

    /// Idempotent: releasing a non-existent lock is not an error.
    pub async fn release(&self, lock_id: Uuid) -> Result<()> {
        let resource = self.locks_by_id.write().await.remove(&lock_id);
        let Some(resource) = resource else {
            return Ok(());
        };

        let mut resources = self.resources.write().await;
        let Some(state) = resources.get_mut(&resource) else {
            return Ok(());
        };
        state.holders.retain(|l| l.id != lock_id);

        for waiter in &state.waiters {
            waiter.notify.notify_one();
        }
        Ok(())
    }

    async fn remove_waiter(&self, resource: &str, holder_id: &str) {
        let mut resources = self.resources.write().await;
        if let Some(state) = resources.get_mut(resource) {
            state.waiters.retain(|w| w.holder_id != holder_id);
        }
    }

    /// Background sweep: expires locks whose `expiresAt` has passed.
    /// Holders otherwise observe expiration lazily on next use.
    pub async fn expire_stale(&self, resource: &str) {
        let now = Utc::now();
        let mut resources = self.resources.write().await;
        if let Some(state) = resources.get_mut(resource) {
            let before = state.holders.len();
            state.holders.retain(|l| l.expires_at > now);
            if state.holders.len() < before {
                for waiter in &state.waiters {
                    waiter.notify.notify_one();
                }
            }
        }
    }

    pub async fn sweep_all(&self) {
        let resources: Vec<String> = self.resources.read().await.keys().cloned().collect();
        for r in resources {
            self.expire_stale(&r).await;
        }
    }

    /// Spawns a background task that calls `sweep_all` every
    /// `lock_cleanup_interval_secs`; the returned handle should be aborted
    /// by the owning coordinator on shutdown.
    pub fn spawn_cleanup_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(manager.config.lock_cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                manager.sweep_all().await;
            }
        })
    }

    /// Builds the wait-for graph across all pending acquisitions and
    /// aborts the youngest waiter on a cycle (tie-broken by
    /// `acquiredAt`, then lock id — here approximated by arrival order
    /// since the waiter holds no lock yet).
    async fn detect_deadlock(&self, resource: &str, holder_id: &str) -> Option<String> {
        let resources = self.resources.read().await;

        let mut graph = DiGraph::<String, ()>::new();
        let mut idx: HashMap<String, NodeIndex> = HashMap::new();
        let mut get_idx = |g: &mut DiGraph<String, ()>, id: &str| -> NodeIndex {
            *idx.entry(id.to_string())
                .or_insert_with(|| g.add_node(id.to_string()))
        };

        for (_res, state) in resources.iter() {
            for waiter in &state.waiters {
                let from = get_idx(&mut graph, &waiter.holder_id);
                for holder in &state.holders {
                    let to = get_idx(&mut graph, &holder.holder_id);
                    graph.add_edge(from, to, ());
                }
            }
        }
        drop(resources);

        if !is_cyclic_directed(&graph) {
            return None;
        }

        // A cycle exists somewhere in the wait-for graph; abort the
        // youngest waiter on the resource that triggered this check.
        let resources = self.resources.read().await;
        let state = resources.get(resource)?;
        let youngest = state
            .waiters
            .iter()
            .max_by_key(|w| w.arrived_at)
            .map(|w| w.holder_id.clone());
        youngest.or_else(|| Some(holder_id.to_string()))
    }

    pub async fn holder_of(&self, resource: &str) -> Vec<(String, LockMode)> {
        let resources = self.resources.read().await;
        resources
            .get(resource)
            .map(|s| s.holders.iter().map(|l| (l.holder_id.clone(), l.mode)).collect())
            .unwrap_or_default()
    }
}

/// Canonical resource name helpers.
pub mod resource_name {
    use uuid::Uuid;

    pub fn task(id: Uuid) -> String {
        format!("task:{id}")
    }

    pub fn agent(id: Uuid) -> String {
        format!("agent:{id}")
    }

    pub fn file(path: &str) -> String {
        format!("file:{path}")
    }
}
