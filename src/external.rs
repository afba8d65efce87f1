//! Outbound collaborator traits: the core depends on these to
//! reach agents, persistent storage, and an optional LLM helper, but never
//! implements the transports itself — host applications provide concrete
//! implementations.
//!
//! Grounded on `agent-orchestrator::agent::AgentCommunicator` (an
//! `async_trait` boundary the orchestrator calls through without knowing the
//! transport) and on `bmad-workflow`'s storage-backed workflow persistence
//! for the `Storage` shape. The LLM helper wraps calls the same
//! validate-or-retry way `agent-orchestrator::context::ContextManager`
//! guards its own provider calls, but the provider itself is left to the
//! host (no bundled LLM client).

use crate::error::Result;
use crate::task::AtomicTask;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub message: String,
    pub output: Option<Value>,
}

/// Boundary to wherever agents actually live (subprocess, RPC, queue). The
/// core only sends tasks and polls for responses; it never starts or
/// manages agent processes.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    async fn send_task(&self, agent_id: Uuid, task: &AtomicTask) -> Result<()>;

    /// Returns `Ok(None)` while no response has arrived yet; callers poll
    /// this rather than blocking on it so the coordinator can also watch its
    /// own timeout.
    async fn receive_response(&self, agent_id: Uuid, task_id: Uuid) -> Result<Option<AgentResponse>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> StorageResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Plain key-value persistence boundary (no bundled CRUD
/// storage layer — the core calls through this, hosts provide Postgres,
/// Redis, a filesystem, whatever fits).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Value>;
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Optional helper for epic-relationship discovery. The core never talks to
/// a model provider directly; it only validates and retries against this
/// trait.
#[async_trait]
pub trait LlmRelationshipHelper: Send + Sync {
    async fn propose_relationships(&self, prompt: &str) -> Result<Value>;
}

const MAX_VALIDATION_ATTEMPTS: u32 = 3;

/// Calls `helper`, validating the response is a JSON array before
/// returning it; retries up to `MAX_VALIDATION_ATTEMPTS` times on a
/// validation failure, injecting the prior failure into the next prompt so
/// the helper sees what was wrong with its last answer (mirrors
/// `ContextManager`'s format-aware retry rather than failing outright on
/// the first malformed response).
pub async fn call_with_validation(
    helper: &dyn LlmRelationshipHelper,
    prompt: &str,
) -> Result<Vec<Value>> {
    let mut current_prompt = prompt.to_string();
    for attempt in 1..=MAX_VALIDATION_ATTEMPTS {
        let value = helper.propose_relationships(&current_prompt).await?;
        if let Value::Array(items) = value {
            return Ok(items);
        }
        if attempt == MAX_VALIDATION_ATTEMPTS {
            return Err(crate::error::OrchestrationError::validation(
                "LlmRelationshipHelper",
                "call_with_validation",
                "expected a JSON array response",
            ));
        }
        current_prompt = format!(
            "{prompt}\n\nYour previous response was not a JSON array: {value}. \
             Respond with only a JSON array this time."
        );
    }
    unreachable!()
}
