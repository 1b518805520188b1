use chrono::{DateTime, Utc};
use loomcore::{
    ExecutionEvent, ExecutionRecord, NodeRunResult, NodeRunStatus, RunOutcome, RunStatus,
    WorkflowData,
};
use serde::{Deserialize, Serialize};

/// One human-readable log line derived from an execution outcome.
/// Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: String,
    pub node_id: String,
    pub node_title: String,
    pub status: NodeRunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_seconds: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_loop_result: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_iteration: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_item: Option<serde_json::Value>,
}

impl TimelineEntry {
    pub fn glyph(&self) -> char {
        self.status.glyph()
    }
}

/// Flatten a run outcome into ordered timeline entries
///
/// Loop results are walked as a tree: per iteration, one header entry
/// followed by one entry per nested node, all tagged with the iteration.
pub fn timeline_entries(
    outcome: &RunOutcome,
    data: &WorkflowData,
    at: DateTime<Utc>,
) -> Vec<TimelineEntry> {
    let mut entries = Vec::new();
    let mut seq = 0usize;

    for result in &outcome.nodes {
        let title = title_for(data, &result.id);
        entries.push(result_entry(&mut seq, result, title.clone(), at, None));

        if let Some(loop_result) = &result.loop_result {
            for iteration in &loop_result.iterations {
                let display = iteration.index + 1;
                entries.push(TimelineEntry {
                    id: next_id(&mut seq),
                    node_id: result.id.clone(),
                    node_title: format!("{title} → Iteration {display}"),
                    status: NodeRunStatus::Done,
                    output: None,
                    error: None,
                    stdout: None,
                    stderr: None,
                    execution_time_seconds: None,
                    timestamp: at,
                    is_loop_result: true,
                    loop_iteration: Some(iteration.index),
                    loop_item: Some(iteration.item.clone()),
                });

                for nested in &iteration.node_results {
                    let nested_title =
                        format!("{} [Iteration {display}]", title_for(data, &nested.id));
                    entries.push(result_entry(
                        &mut seq,
                        nested,
                        nested_title,
                        at,
                        Some((iteration.index, iteration.item.clone())),
                    ));
                }
            }
        }
    }

    entries
}

/// Timeline replayed from a persisted execution record
pub fn timeline_from_record(record: &ExecutionRecord, data: &WorkflowData) -> Vec<TimelineEntry> {
    timeline_entries(&record.execution_data, data, record.completed_at)
}

/// Incremental timeline over live execution events
pub struct TimelineBuilder<'a> {
    data: &'a WorkflowData,
    entries: Vec<TimelineEntry>,
    seq: usize,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(data: &'a WorkflowData) -> Self {
        Self {
            data,
            entries: Vec::new(),
            seq: 0,
        }
    }

    pub fn apply(&mut self, event: &ExecutionEvent) {
        if let ExecutionEvent::NodeFinished {
            result, timestamp, ..
        } = event
        {
            let title = title_for(self.data, &result.id);
            self.entries
                .push(result_entry(&mut self.seq, result, title.clone(), *timestamp, None));

            if let Some(loop_result) = &result.loop_result {
                for iteration in &loop_result.iterations {
                    let display = iteration.index + 1;
                    self.entries.push(TimelineEntry {
                        id: next_id(&mut self.seq),
                        node_id: result.id.clone(),
                        node_title: format!("{title} → Iteration {display}"),
                        status: NodeRunStatus::Done,
                        output: None,
                        error: None,
                        stdout: None,
                        stderr: None,
                        execution_time_seconds: None,
                        timestamp: *timestamp,
                        is_loop_result: true,
                        loop_iteration: Some(iteration.index),
                        loop_item: Some(iteration.item.clone()),
                    });
                    for nested in &iteration.node_results {
                        let nested_title = format!(
                            "{} [Iteration {display}]",
                            title_for(self.data, &nested.id)
                        );
                        self.entries.push(result_entry(
                            &mut self.seq,
                            nested,
                            nested_title,
                            *timestamp,
                            Some((iteration.index, iteration.item.clone())),
                        ));
                    }
                }
            }
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TimelineEntry> {
        self.entries
    }
}

fn title_for(data: &WorkflowData, node_id: &str) -> String {
    data.nodes
        .get(node_id)
        .map(|node| node.title.clone())
        .unwrap_or_else(|| node_id.to_string())
}

fn next_id(seq: &mut usize) -> String {
    *seq += 1;
    format!("t{seq}")
}

fn result_entry(
    seq: &mut usize,
    result: &NodeRunResult,
    title: String,
    at: DateTime<Utc>,
    loop_scope: Option<(usize, serde_json::Value)>,
) -> TimelineEntry {
    let error = match result.status {
        RunStatus::Error if !result.stderr.is_empty() => Some(result.stderr.clone()),
        RunStatus::Error => Some("execution failed".to_string()),
        RunStatus::Success => None,
    };
    let (loop_iteration, loop_item) = match loop_scope {
        Some((index, item)) => (Some(index), Some(item)),
        None => (None, None),
    };

    TimelineEntry {
        id: next_id(seq),
        node_id: result.id.clone(),
        node_title: title,
        status: result.status.into(),
        output: Some(result.output.clone()),
        error,
        stdout: Some(result.stdout.clone()).filter(|s| !s.is_empty()),
        stderr: Some(result.stderr.clone()).filter(|s| !s.is_empty()),
        execution_time_seconds: Some(result.execution_time_seconds),
        timestamp: at,
        is_loop_result: loop_iteration.is_some(),
        loop_iteration,
        loop_item,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{FixedTiming, Simulator};
    use loomcore::{NodeDefinition, NodeType, WorkflowGraph};
    use serde_json::json;

    fn loop_workflow() -> WorkflowData {
        let mut data = WorkflowData::default();
        data.add_node("n1", NodeDefinition::new(NodeType::Start, "Start"));
        data.add_node(
            "n2",
            NodeDefinition::new(NodeType::Foreach, "Each row")
                .with_config(json!({ "items": [1, 2] })),
        );
        data.add_node(
            "n3",
            NodeDefinition::new(NodeType::Python, "Transform").with_code("print(row)"),
        );
        data.add_node("n4", NodeDefinition::new(NodeType::Endloop, "Close"));
        data.add_node("n5", NodeDefinition::new(NodeType::End, "End"));
        data.connect("n1", "out", "n2", "in");
        data.connect("n2", "out", "n3", "in");
        data.connect("n3", "out", "n4", "in");
        data.connect("n4", "out", "n5", "in");
        data
    }

    #[test]
    fn loop_iterations_flatten_to_header_plus_nested_entries() {
        let data = loop_workflow();
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = Simulator::with_timing(Box::new(FixedTiming(0.0))).run(&graph);

        let entries = timeline_entries(&outcome, &data, Utc::now());

        // 5 top-level entries + 2 iterations x (1 header + 1 nested).
        assert_eq!(entries.len(), 9);

        let headers: Vec<_> = entries
            .iter()
            .filter(|e| e.node_title.contains("→ Iteration"))
            .collect();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].node_title, "Each row → Iteration 1");
        assert_eq!(headers[0].loop_iteration, Some(0));
        assert!(headers[0].is_loop_result);

        let nested: Vec<_> = entries
            .iter()
            .filter(|e| e.node_title.contains("[Iteration"))
            .collect();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[1].node_title, "Transform [Iteration 2]");
        assert_eq!(nested[1].loop_item, Some(json!(2)));
    }

    #[test]
    fn non_loop_entries_follow_execution_order() {
        let data = loop_workflow();
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = Simulator::with_timing(Box::new(FixedTiming(0.0))).run(&graph);

        let entries = timeline_entries(&outcome, &data, Utc::now());
        let top_level: Vec<_> = entries
            .iter()
            .filter(|e| !e.is_loop_result)
            .map(|e| e.node_id.as_str())
            .collect();
        assert_eq!(top_level, ["n1", "n2", "n3", "n4", "n5"]);
    }

    #[test]
    fn record_replays_to_the_same_entries() {
        let data = loop_workflow();
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = Simulator::with_timing(Box::new(FixedTiming(0.0))).run(&graph);

        let completed_at = Utc::now();
        let record = ExecutionRecord {
            id: "run-1".to_string(),
            workflow_id: Some("wf-1".to_string()),
            status: outcome.status,
            duration_seconds: 0.2,
            execution_data: outcome.clone(),
            diagnostic: None,
            started_at: completed_at,
            completed_at,
        };

        let live = timeline_entries(&outcome, &data, completed_at);
        let replayed = timeline_from_record(&record, &data);
        assert_eq!(replayed.len(), live.len());
        for (a, b) in replayed.iter().zip(live.iter()) {
            assert_eq!(a.node_title, b.node_title);
            assert_eq!(a.status, b.status);
        }
    }

    #[test]
    fn glyphs_follow_the_fixed_table() {
        assert_eq!(NodeRunStatus::Success.glyph(), '✓');
        assert_eq!(NodeRunStatus::Done.glyph(), '✓');
        assert_eq!(NodeRunStatus::Error.glyph(), '✗');
        assert_eq!(NodeRunStatus::Running.glyph(), '▶');
        assert_eq!(NodeRunStatus::Waiting.glyph(), '○');
    }

    #[test]
    fn builder_consumes_live_events() {
        let data = loop_workflow();
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = Simulator::with_timing(Box::new(FixedTiming(0.0))).run(&graph);

        let mut builder = TimelineBuilder::new(&data);
        for result in &outcome.nodes {
            builder.apply(&ExecutionEvent::NodeFinished {
                execution_id: uuid::Uuid::new_v4(),
                node_title: "ignored".to_string(),
                result: result.clone(),
                timestamp: Utc::now(),
            });
        }

        assert_eq!(builder.entries().len(), 9);
    }
}
