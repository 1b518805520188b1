use crate::{GraphError, NodeDefinition, NodeType, WorkflowData};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Validated view over a workflow payload
///
/// Construction checks referential integrity (every connection endpoint
/// resolves to a node) and loop pairing (every `foreach` reaches an
/// `endloop`). Cycles among ordinary edges are legal; ordering is
/// deterministic for a given payload.
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    data: &'a WorkflowData,
    order: Vec<String>,
    loops: BTreeMap<String, LoopSpan>,
}

/// Repeatable unit between a `foreach` node and its matching `endloop`
#[derive(Debug, Clone)]
pub struct LoopSpan {
    /// Node ids strictly between the pair, in execution order
    pub body: Vec<String>,
    pub endloop: String,
}

impl<'a> WorkflowGraph<'a> {
    pub fn new(data: &'a WorkflowData) -> Result<Self, GraphError> {
        for (connection_id, connection) in &data.connections {
            for endpoint in [&connection.source_node_id, &connection.target_node_id] {
                if !data.nodes.contains_key(endpoint) {
                    return Err(GraphError::MalformedGraph {
                        connection: connection_id.clone(),
                        node: endpoint.clone(),
                    });
                }
            }
        }

        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for id in data.nodes.keys() {
            indices.insert(id, graph.add_node(id));
        }
        for connection in data.connections.values() {
            graph.add_edge(
                indices[connection.source_node_id.as_str()],
                indices[connection.target_node_id.as_str()],
                (),
            );
        }

        let order = execution_order(data, &graph, &indices);
        let loops = loop_spans(data, &graph, &indices, &order)?;

        Ok(Self { data, order, loops })
    }

    pub fn data(&self) -> &'a WorkflowData {
        self.data
    }

    pub fn node(&self, id: &str) -> Option<&'a NodeDefinition> {
        self.data.nodes.get(id)
    }

    /// Node ids in execution order: start nodes first, then breadth-first
    /// along connections, then anything unreachable in key order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn nodes_in_order(&self) -> impl Iterator<Item = (&str, &'a NodeDefinition)> {
        self.order
            .iter()
            .filter_map(|id| self.data.nodes.get(id).map(|node| (id.as_str(), node)))
    }

    pub fn loop_span(&self, foreach_id: &str) -> Option<&LoopSpan> {
        self.loops.get(foreach_id)
    }

    pub fn node_count(&self) -> usize {
        self.data.nodes.len()
    }
}

fn sorted_successors(
    graph: &DiGraph<&str, ()>,
    index: NodeIndex,
) -> Vec<String> {
    let mut successors: Vec<String> = graph
        .neighbors_directed(index, Direction::Outgoing)
        .map(|idx| graph[idx].to_string())
        .collect();
    successors.sort();
    successors.dedup();
    successors
}

fn execution_order(
    data: &WorkflowData,
    graph: &DiGraph<&str, ()>,
    indices: &HashMap<&str, NodeIndex>,
) -> Vec<String> {
    let mut roots: Vec<String> = data
        .nodes
        .iter()
        .filter(|(_, node)| node.node_type == NodeType::Start)
        .map(|(id, _)| id.clone())
        .collect();
    if roots.is_empty() {
        roots = data
            .nodes
            .keys()
            .filter(|id| {
                graph
                    .neighbors_directed(indices[id.as_str()], Direction::Incoming)
                    .next()
                    .is_none()
            })
            .cloned()
            .collect();
    }

    let mut order = Vec::with_capacity(data.nodes.len());
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = roots.into_iter().collect();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        for successor in sorted_successors(graph, indices[id.as_str()]) {
            if !visited.contains(&successor) {
                queue.push_back(successor);
            }
        }
        order.push(id);
    }

    // Nodes not reachable from any root still execute, in key order.
    for id in data.nodes.keys() {
        if !visited.contains(id) {
            order.push(id.clone());
        }
    }

    order
}

fn loop_spans(
    data: &WorkflowData,
    graph: &DiGraph<&str, ()>,
    indices: &HashMap<&str, NodeIndex>,
    order: &[String],
) -> Result<BTreeMap<String, LoopSpan>, GraphError> {
    let mut spans = BTreeMap::new();

    for (foreach_id, node) in &data.nodes {
        if node.node_type != NodeType::Foreach {
            continue;
        }

        let mut reachable: HashSet<&str> = HashSet::new();
        let mut bfs = Bfs::new(graph, indices[foreach_id.as_str()]);
        while let Some(idx) = bfs.next(graph) {
            reachable.insert(graph[idx]);
        }

        let position = order
            .iter()
            .position(|id| id == foreach_id)
            .unwrap_or(order.len());
        let mut depth = 0usize;
        let mut body = Vec::new();
        let mut endloop = None;
        for id in order.iter().skip(position + 1) {
            if !reachable.contains(id.as_str()) {
                continue;
            }
            match data.nodes[id].node_type {
                NodeType::Endloop if depth == 0 => {
                    endloop = Some(id.clone());
                    break;
                }
                NodeType::Endloop => {
                    depth -= 1;
                    body.push(id.clone());
                }
                NodeType::Foreach => {
                    depth += 1;
                    body.push(id.clone());
                }
                _ => body.push(id.clone()),
            }
        }

        match endloop {
            Some(endloop) => {
                spans.insert(foreach_id.clone(), LoopSpan { body, endloop });
            }
            None => return Err(GraphError::UnterminatedLoop(foreach_id.clone())),
        }
    }

    Ok(spans)
}
