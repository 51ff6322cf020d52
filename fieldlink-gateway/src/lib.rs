//! HTTP gateway between a Dify workflow, the PLC message bus and the local
//! knowledge store.

pub mod control_log;
pub mod error;
pub mod mcp;
pub mod mqtt;
pub mod routes;
pub mod server;
pub mod simulator;
pub mod state;
pub mod workflow;

pub use control_log::{ControlLog, LogRecord, RecordSource};
pub use error::GatewayError;
pub use mqtt::{BusStatus, ControlPublisher, DisabledPublisher, MqttBridge, PublishError};
pub use state::{AppState, Topics, WorkflowRun};
pub use workflow::{WorkflowClient, WorkflowError};
