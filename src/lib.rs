//! Workflow-aware task scheduler and execution coordinator for multi-agent
//! software work.
//!
//! This crate owns the scheduling and coordination core: turning a task
//! graph into an ordered, resource-aware execution plan, dispatching
//! batches to agents under lock-protected boundaries, and tracking
//! workflow- and epic-level progress. It does not implement agent
//! processes, storage backends, or an LLM client — those are supplied by
//! the host through the traits in [`external`].

pub mod agent;
pub mod config;
pub mod epic_graph;
pub mod error;
pub mod execution;
pub mod external;
pub mod graph;
pub mod lock;
pub mod scheduler;
pub mod scoring;
pub mod task;
pub mod workflow_state;

pub use agent::{Agent, AgentPool, AgentStatus};
pub use config::CoreConfig;
pub use epic_graph::EpicDependencyManager;
pub use error::{ErrorKind, OrchestrationError, Result};
pub use execution::ExecutionCoordinator;
pub use graph::DependencyGraph;
pub use lock::LockManager;
pub use scheduler::{ExecutionSchedule, TaskScheduler};
pub use task::{AtomicTask, Epic, Priority, TaskStatus, TaskType};
pub use workflow_state::{WorkflowPhase, WorkflowState, WorkflowStateManager};
