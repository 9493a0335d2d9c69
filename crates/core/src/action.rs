//! Action trait: the side-effecting operations the assistant can request.
//!
//! The model asks for an action by embedding a block in its text. Each block
//! becomes an [`ActionRecord`] on the assistant turn, is dispatched through the
//! [`ActionRegistry`], and ends with a [`ToolResult`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::ActionError;

/// Parameters of one action request: a JSON object with unique keys.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// The uniform output of every action executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub succeeded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            succeeded: true,
            payload: Some(payload),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            payload: None,
            error_message: Some(message.into()),
        }
    }
}

/// Lifecycle of an action record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Executing,
    Success,
    Error,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Success | ActionStatus::Error)
    }
}

/// A block extracted from assistant text. Transient.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBlock {
    pub id: String,
    pub action_name: String,
    pub parameters: Params,
    pub raw_text: String,
}

/// One requested action, owned by the assistant turn that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub name: String,
    pub parameters: Params,
    pub status: ActionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

impl ActionRecord {
    /// A new record in `pending`, taking the block's identity.
    pub fn pending(block: &ParsedBlock) -> Self {
        Self {
            id: block.id.clone(),
            name: block.action_name.clone(),
            parameters: block.parameters.clone(),
            status: ActionStatus::Pending,
            result: None,
        }
    }

    /// `pending → executing`. Returns false (and changes nothing) from any other state.
    pub fn start(&mut self) -> bool {
        if self.status != ActionStatus::Pending {
            return false;
        }
        self.status = ActionStatus::Executing;
        true
    }

    /// `executing → success | error`. Returns false (and changes nothing) from any other state.
    pub fn finish(&mut self, result: ToolResult) -> bool {
        if self.status != ActionStatus::Executing {
            return false;
        }
        self.status = if result.succeeded {
            ActionStatus::Success
        } else {
            ActionStatus::Error
        };
        self.result = Some(result);
        true
    }
}

/// Catalog entry describing an action to the model and to API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters
    pub parameters: serde_json::Value,
}

/// The core Action trait.
///
/// Executors validate their own parameters before touching any collaborator
/// and report problems as `Err`; the registry turns those into failed results.
#[async_trait]
pub trait Action: Send + Sync {
    /// The unique name the model uses to request this action.
    fn name(&self) -> &str;

    /// A description of what this action does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this action's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the action with the given parameters.
    async fn execute(&self, params: &Params) -> std::result::Result<ToolResult, ActionError>;

    fn to_spec(&self) -> ActionSpec {
        ActionSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Dispatch table from action name to executor, built once at startup.
///
/// Registration order is kept so the catalog reads the same every time.
pub struct ActionRegistry {
    actions: Vec<Box<dyn Action>>,
    index: HashMap<String, usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: Box<dyn Action>) {
        let name = action.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.actions[slot] = action,
            None => {
                self.index.insert(name, self.actions.len());
                self.actions.push(action);
            }
        }
    }

    /// Get an action by name.
    pub fn get(&self, name: &str) -> Option<&dyn Action> {
        self.index.get(name).map(|&slot| self.actions[slot].as_ref())
    }

    /// All catalog entries, in registration order.
    pub fn specs(&self) -> Vec<ActionSpec> {
        self.actions.iter().map(|a| a.to_spec()).collect()
    }

    /// List all registered action names.
    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run the named action. Never fails: unknown names and executor errors
    /// come back as a failed [`ToolResult`].
    pub async fn dispatch(&self, name: &str, params: &Params) -> ToolResult {
        let Some(action) = self.get(name) else {
            return ToolResult::failed(format!("Unknown action: {name}"));
        };
        match action.execute(params).await {
            Ok(result) => result,
            Err(e) => {
                debug!(action = name, error = %e, "Action rejected");
                ToolResult::failed(e.to_string())
            }
        }
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh identifier for a parsed block.
pub fn new_block_id() -> String {
    Uuid::new_v4().to_string()
}
