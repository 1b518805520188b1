use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of a run or a single node result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Display status of a timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRunStatus {
    Waiting,
    Running,
    Success,
    Error,
    Done,
}

impl NodeRunStatus {
    /// Fixed glyph table used wherever a status is rendered as text
    pub fn glyph(self) -> char {
        match self {
            NodeRunStatus::Success | NodeRunStatus::Done => '✓',
            NodeRunStatus::Error => '✗',
            NodeRunStatus::Running => '▶',
            NodeRunStatus::Waiting => '○',
        }
    }
}

impl From<RunStatus> for NodeRunStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => NodeRunStatus::Success,
            RunStatus::Error => NodeRunStatus::Error,
        }
    }
}

/// Result of executing one node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunResult {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub output: serde_json::Value,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub execution_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_result: Option<LoopResult>,
}

/// Iteration results of a foreach node, modeled as an explicit tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub iterations: Vec<LoopIteration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopIteration {
    pub index: usize,
    pub item: serde_json::Value,
    pub node_results: Vec<NodeRunResult>,
}

/// Aggregate result of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub status: RunStatus,
    pub nodes: Vec<NodeRunResult>,
    pub total_time_seconds: f64,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunOutcome {
    /// Best-effort blank outcome for the degraded path
    pub fn empty() -> Self {
        Self {
            status: RunStatus::Success,
            nodes: Vec::new(),
            total_time_seconds: 0.0,
            error: None,
        }
    }
}

/// One durable, append-only outcome of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub status: RunStatus,
    pub duration_seconds: f64,
    pub execution_data: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}
