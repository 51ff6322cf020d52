use std::sync::Arc;

use fieldlink_knowledge::KnowledgeEngine;
use serde_json::Value;
use tracing::info;

use crate::control_log::{ControlLog, RecordSource};
use crate::error::GatewayError;
use crate::mcp::McpHandler;
use crate::mqtt::ControlPublisher;
use crate::workflow::WorkflowClient;

/// Bus topics the gateway reads and writes.
#[derive(Debug, Clone)]
pub struct Topics {
    pub sensor: String,
    pub control: String,
}

/// Result of a workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub control: Option<Value>,
    /// Whether a control log entry was written.
    pub recorded: bool,
}

/// Shared state for every handler and background task.
pub struct AppState {
    pub knowledge: Arc<KnowledgeEngine>,
    pub control_log: Arc<ControlLog>,
    pub publisher: Arc<dyn ControlPublisher>,
    pub workflow: Option<WorkflowClient>,
    pub topics: Topics,
    mcp: McpHandler,
}

impl AppState {
    pub fn new(
        knowledge: Arc<KnowledgeEngine>,
        control_log: Arc<ControlLog>,
        publisher: Arc<dyn ControlPublisher>,
        workflow: Option<WorkflowClient>,
        topics: Topics,
    ) -> Self {
        let mcp = McpHandler::new(Arc::clone(&knowledge), Arc::clone(&control_log));
        Self {
            knowledge,
            control_log,
            publisher,
            workflow,
            topics,
            mcp,
        }
    }

    pub fn mcp(&self) -> &McpHandler {
        &self.mcp
    }

    /// Run the workflow for `inputs`, recording any control output.
    pub async fn run_workflow(&self, inputs: Value) -> Result<WorkflowRun, GatewayError> {
        let client = self.workflow.as_ref().ok_or(GatewayError::WorkflowDisabled)?;

        let Some(control) = client.run(&inputs).await? else {
            return Ok(WorkflowRun {
                control: None,
                recorded: false,
            });
        };

        self.control_log
            .record(inputs, control.clone(), RecordSource::Workflow)
            .await?;
        info!("workflow control output recorded");

        Ok(WorkflowRun {
            control: Some(control),
            recorded: true,
        })
    }
}
