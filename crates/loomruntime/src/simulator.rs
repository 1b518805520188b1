use loomcore::{
    LoopIteration, LoopResult, NodeDefinition, NodeRunResult, NodeType, RunOutcome, RunStatus,
    WorkflowGraph,
};
use rand::Rng;
use serde_json::json;

/// Source of simulated per-node execution timings
///
/// Injected so tests can pin the one field the simulator does not keep
/// deterministic.
pub trait TimingSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Uniformly random duration within a band, in seconds
pub struct UniformTiming {
    min: f64,
    max: f64,
}

impl UniformTiming {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Default for UniformTiming {
    fn default() -> Self {
        Self::new(0.05, 0.35)
    }
}

impl TimingSource for UniformTiming {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(self.min..self.max)
    }
}

/// Constant duration for tests
pub struct FixedTiming(pub f64);

impl TimingSource for FixedTiming {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Deterministic stand-in executor, used whenever the external runtime
/// is unreachable
///
/// Produces one result per node, shaped like the runtime's output. This
/// path never fails outward.
pub struct Simulator {
    timing: Box<dyn TimingSource>,
}

impl Simulator {
    pub fn new() -> Self {
        Self::with_timing(Box::new(UniformTiming::default()))
    }

    pub fn with_timing(timing: Box<dyn TimingSource>) -> Self {
        Self { timing }
    }

    pub fn run(&self, graph: &WorkflowGraph<'_>) -> RunOutcome {
        let nodes: Vec<NodeRunResult> = graph
            .nodes_in_order()
            .map(|(id, node)| self.simulate_node(graph, id, node))
            .collect();
        let total_time_seconds = nodes.iter().map(|n| n.execution_time_seconds).sum();

        RunOutcome {
            status: RunStatus::Success,
            nodes,
            total_time_seconds,
            error: None,
        }
    }

    fn simulate_node(
        &self,
        graph: &WorkflowGraph<'_>,
        id: &str,
        node: &NodeDefinition,
    ) -> NodeRunResult {
        let mut loop_result = None;
        let (output, stdout) = match node.node_type {
            NodeType::Start => text("Starting workflow"),
            NodeType::End => text("Workflow completed"),
            // Code and viewer nodes echo their first source line.
            NodeType::Python
            | NodeType::Typescript
            | NodeType::Markdown
            | NodeType::Html
            | NodeType::Json => text(node.first_code_line().unwrap_or_default()),
            NodeType::Llm => {
                let provider = node.config_str("provider").unwrap_or("openai");
                let model = node.config_str("model").unwrap_or("gpt-3.5-turbo");
                text(format!("{provider}/{model} response"))
            }
            NodeType::Embedding => {
                let provider = node.config_str("provider").unwrap_or("openai");
                let model = node.config_str("model").unwrap_or("text-embedding-3-small");
                text(format!("{provider}/{model} embedding"))
            }
            NodeType::Http => {
                let method = node
                    .config_str("method")
                    .unwrap_or("GET")
                    .to_ascii_uppercase();
                let url = node.config_str("url").unwrap_or_default();
                text(format!("{method} {url}").trim_end().to_string())
            }
            NodeType::File => match node.config_str("path").filter(|p| !p.is_empty()) {
                Some(path) => text(format!("Read {path}")),
                None => text("Read file"),
            },
            NodeType::Condition => {
                let expression = node.config_str("expression").unwrap_or("true");
                (json!(true), format!("{expression} => true"))
            }
            NodeType::Database => {
                let query = node.config_str("query").unwrap_or_default();
                let line = query.lines().next().unwrap_or("").trim_end();
                if line.is_empty() {
                    text("Executed query")
                } else {
                    text(line)
                }
            }
            NodeType::Foreach => {
                let result = self.simulate_loop(graph, id, node);
                let count = result.iterations.len();
                loop_result = Some(result);
                (json!({ "iterations": count }), format!("Iterated {count} items"))
            }
            NodeType::Endloop => text("Loop completed"),
            NodeType::Image => match node.config_str("source").filter(|s| !s.is_empty()) {
                Some(source) => text(format!("Rendered {source}")),
                None => text("Rendered image"),
            },
            NodeType::Ocr => match node.config_str("source").filter(|s| !s.is_empty()) {
                Some(source) => text(format!("Extracted text from {source}")),
                None => text("Extracted text"),
            },
            NodeType::Browser => match node.config_str("url").filter(|u| !u.is_empty()) {
                Some(url) => text(format!("Opened {url}")),
                None => text("Opened page"),
            },
        };

        NodeRunResult {
            id: id.to_string(),
            status: RunStatus::Success,
            output,
            stdout,
            stderr: String::new(),
            execution_time_seconds: self.timing.sample(),
            loop_result,
        }
    }

    /// One iteration per configured item, each running the loop body
    /// sequentially. Missing or non-array `items` means zero iterations.
    fn simulate_loop(
        &self,
        graph: &WorkflowGraph<'_>,
        foreach_id: &str,
        node: &NodeDefinition,
    ) -> LoopResult {
        let items: Vec<serde_json::Value> = node
            .config
            .as_ref()
            .and_then(|config| config.get("items"))
            .and_then(|items| items.as_array())
            .cloned()
            .unwrap_or_default();

        let body = graph
            .loop_span(foreach_id)
            .map(|span| span.body.clone())
            .unwrap_or_default();

        let iterations = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| LoopIteration {
                index,
                item,
                node_results: body
                    .iter()
                    .filter_map(|body_id| {
                        graph
                            .node(body_id)
                            .map(|body_node| self.simulate_node(graph, body_id, body_node))
                    })
                    .collect(),
            })
            .collect();

        LoopResult { iterations }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

fn text(message: impl Into<String>) -> (serde_json::Value, String) {
    let message = message.into();
    (json!(message.clone()), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore::WorkflowData;

    fn fixed() -> Simulator {
        Simulator::with_timing(Box::new(FixedTiming(0.1)))
    }

    fn pipeline() -> WorkflowData {
        let mut data = WorkflowData::default();
        data.add_node("n1", NodeDefinition::new(NodeType::Start, "Start"));
        data.add_node(
            "n2",
            NodeDefinition::new(NodeType::Python, "Double")
                .with_code("def run(input):\n  return input*2"),
        );
        data.add_node("n3", NodeDefinition::new(NodeType::End, "End"));
        data.connect("n1", "out", "n2", "in");
        data.connect("n2", "out", "n3", "in");
        data
    }

    #[test]
    fn one_result_per_node() {
        let data = pipeline();
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = fixed().run(&graph);

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.nodes.len(), 3);
        assert!(outcome.error.is_none());
        assert!((outcome.total_time_seconds - 0.3).abs() < 1e-9);
    }

    #[test]
    fn python_node_echoes_first_source_line() {
        let data = pipeline();
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = fixed().run(&graph);

        let python = outcome.nodes.iter().find(|n| n.id == "n2").unwrap();
        assert!(python.stdout.contains("def run(input):"));
    }

    #[test]
    fn output_is_deterministic_across_runs() {
        let data = pipeline();
        let graph = WorkflowGraph::new(&data).unwrap();
        let first = fixed().run(&graph);
        let second = fixed().run(&graph);

        for (a, b) in first.nodes.iter().zip(second.nodes.iter()) {
            assert_eq!(a.output, b.output);
            assert_eq!(a.stdout, b.stdout);
        }
    }

    #[test]
    fn llm_node_defaults_provider_and_model() {
        let mut data = WorkflowData::default();
        data.add_node("llm", NodeDefinition::new(NodeType::Llm, "Ask"));
        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = fixed().run(&graph);

        assert_eq!(outcome.nodes[0].stdout, "openai/gpt-3.5-turbo response");
    }

    #[test]
    fn foreach_produces_one_iteration_per_item() {
        let mut data = WorkflowData::default();
        data.add_node("n1", NodeDefinition::new(NodeType::Start, "Start"));
        data.add_node(
            "n2",
            NodeDefinition::new(NodeType::Foreach, "Each row")
                .with_config(json!({ "items": ["a", "b", "c"] })),
        );
        data.add_node(
            "n3",
            NodeDefinition::new(NodeType::Python, "Step").with_code("print(row)"),
        );
        data.add_node("n4", NodeDefinition::new(NodeType::Endloop, "Close"));
        data.add_node("n5", NodeDefinition::new(NodeType::End, "End"));
        data.connect("n1", "out", "n2", "in");
        data.connect("n2", "out", "n3", "in");
        data.connect("n3", "out", "n4", "in");
        data.connect("n4", "out", "n5", "in");

        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = fixed().run(&graph);

        assert_eq!(outcome.nodes.len(), 5);
        let foreach = outcome.nodes.iter().find(|n| n.id == "n2").unwrap();
        let loop_result = foreach.loop_result.as_ref().unwrap();
        assert_eq!(loop_result.iterations.len(), 3);
        assert_eq!(loop_result.iterations[1].item, json!("b"));
        assert_eq!(loop_result.iterations[1].node_results.len(), 1);
        assert_eq!(loop_result.iterations[1].node_results[0].id, "n3");
    }

    #[test]
    fn foreach_without_items_iterates_zero_times() {
        let mut data = WorkflowData::default();
        data.add_node("f", NodeDefinition::new(NodeType::Foreach, "Loop"));
        data.add_node("e", NodeDefinition::new(NodeType::Endloop, "Close"));
        data.connect("f", "out", "e", "in");

        let graph = WorkflowGraph::new(&data).unwrap();
        let outcome = fixed().run(&graph);

        let foreach = outcome.nodes.iter().find(|n| n.id == "f").unwrap();
        assert!(foreach.loop_result.as_ref().unwrap().iterations.is_empty());
        assert_eq!(foreach.stdout, "Iterated 0 items");
    }
}
