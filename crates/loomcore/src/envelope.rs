use crate::{NodeType, WorkflowData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Versioned format tag for workflow exports
pub const WORKFLOW_FORMAT: &str = "loom-workflow-v1";

/// Versioned format tag for custom node exports
pub const CUSTOM_NODE_FORMAT: &str = "loom-custom-node-v1";

/// Portable workflow envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEnvelope {
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExportMetadata>,
    pub workflow: WorkflowExport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExport {
    pub name: String,
    pub data: WorkflowData,
}

/// Portable custom node envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomNodeEnvelope {
    pub format: String,
    pub metadata: CustomNodeMetadata,
    #[serde(default)]
    pub node: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomNodeMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub exported_at: DateTime<Utc>,
}
