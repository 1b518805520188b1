use loomcore::{ConnectionDefinition, NodeType, WorkflowGraph};
use serde::{Deserialize, Serialize};

/// Wire request for the external execution runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub workflow: RequestWorkflow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestWorkflow {
    pub nodes: Vec<RequestNode>,
    pub connections: Vec<ConnectionDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Pure transform from a validated graph to the runtime wire request.
/// Nodes are listed in execution order.
pub fn build_request(graph: &WorkflowGraph<'_>) -> RunRequest {
    RunRequest {
        workflow: RequestWorkflow {
            nodes: graph
                .nodes_in_order()
                .map(|(id, node)| RequestNode {
                    id: id.to_string(),
                    node_type: node.node_type,
                    title: node.title.clone(),
                    code: node.code.clone(),
                    config: node.config.clone(),
                })
                .collect(),
            connections: graph.data().connections.values().cloned().collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore::{NodeDefinition, WorkflowData};

    #[test]
    fn nodes_are_listed_in_execution_order() {
        let mut data = WorkflowData::default();
        // Keys deliberately sort against the connection order.
        data.add_node("z-start", NodeDefinition::new(NodeType::Start, "Start"));
        data.add_node("a-end", NodeDefinition::new(NodeType::End, "End"));
        data.add_node(
            "m-step",
            NodeDefinition::new(NodeType::Python, "Step").with_code("print('hi')"),
        );
        data.connect("z-start", "out", "m-step", "in");
        data.connect("m-step", "out", "a-end", "in");

        let graph = WorkflowGraph::new(&data).unwrap();
        let request = build_request(&graph);

        let ids: Vec<_> = request.workflow.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["z-start", "m-step", "a-end"]);
        assert_eq!(request.workflow.connections.len(), 2);
    }
}
