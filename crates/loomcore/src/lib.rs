//! Core abstractions for the loom workflow engine
//!
//! This crate provides the fundamental types that all other components
//! depend on: the workflow graph model, the closed set of node type tags,
//! run results, the error taxonomy, and the execution event bus.

mod catalog;
mod envelope;
mod error;
mod events;
mod graph;
mod node_type;
mod run;
mod workflow;

pub use catalog::{CustomNode, NodeTemplate};
pub use envelope::{
    CustomNodeEnvelope, CustomNodeMetadata, ExportMetadata, WorkflowEnvelope, WorkflowExport,
    CUSTOM_NODE_FORMAT, WORKFLOW_FORMAT,
};
pub use error::{GraphError, LoomError};
pub use events::{EventBus, ExecutionEvent, ExecutionId};
pub use graph::{LoopSpan, WorkflowGraph};
pub use node_type::{NodeType, UnknownNodeType};
pub use run::{
    ExecutionRecord, LoopIteration, LoopResult, NodeRunResult, NodeRunStatus, RunOutcome,
    RunStatus,
};
pub use workflow::{
    ConnectionDefinition, NodeDefinition, Workflow, WorkflowData, RESERVED_NAMES,
};

/// Result type for loom operations
pub type Result<T> = std::result::Result<T, LoomError>;
