use crate::NodeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Placeholder names the canvas assigns to a not-yet-saved workflow.
/// Creating a workflow under one of these is rejected.
pub const RESERVED_NAMES: [&str; 2] = ["Untitled", "Untitled Workflow"];

/// Complete stored workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub data: WorkflowData,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_public: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, data: WorkflowData) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            tags: Vec::new(),
            data,
            is_template: false,
            is_public: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Graph payload: node and connection mappings plus free-form metadata
///
/// BTreeMaps keep serialization and iteration deterministic for a given
/// payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowData {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDefinition>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl WorkflowData {
    pub fn add_node(&mut self, id: impl Into<String>, node: NodeDefinition) -> String {
        let id = id.into();
        self.nodes.insert(id.clone(), node);
        id
    }

    pub fn connect(
        &mut self,
        source: impl Into<String>,
        source_slot: impl Into<String>,
        target: impl Into<String>,
        target_slot: impl Into<String>,
    ) {
        let connection = ConnectionDefinition {
            source_node_id: source.into(),
            source_output_slot: source_slot.into(),
            target_node_id: target.into(),
            target_input_slot: target_slot.into(),
        };
        let id = format!("c{}", self.connections.len() + 1);
        self.connections.insert(id, connection);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One typed processing step in a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl NodeDefinition {
    pub fn new(node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            node_type,
            title: title.into(),
            code: None,
            config: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// First line of the node's source, if any
    pub fn first_code_line(&self) -> Option<&str> {
        self.code
            .as_deref()
            .and_then(|code| code.lines().next())
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
    }

    /// String-valued config entry lookup
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|config| config.get(key))
            .and_then(|value| value.as_str())
    }
}

/// Directed data edge between a source output slot and a target input slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDefinition {
    pub source_node_id: String,
    pub source_output_slot: String,
    pub target_node_id: String,
    pub target_input_slot: String,
}
