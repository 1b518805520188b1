use async_trait::async_trait;
use loomcore::{
    CustomNodeEnvelope, EventBus, LoomError, NodeDefinition, NodeType, RunOutcome, WorkflowData,
};
use loomruntime::{
    ExecuteRequest, FixedTiming, LoomService, Orchestrator, RemoteRunner, RemoteUnavailable,
    RunRequest, SaveWorkflowRequest, Simulator,
};
use loomstore::Database;
use serde_json::json;
use std::sync::Arc;

/// Runner stub for the unreachable-runtime path
struct DownRunner;

#[async_trait]
impl RemoteRunner for DownRunner {
    async fn run(&self, _request: &RunRequest) -> Result<RunOutcome, RemoteUnavailable> {
        Err(RemoteUnavailable::new("connection refused"))
    }
}

/// Runner stub that behaves like a healthy runtime: one result per
/// requested node, in request order.
struct EchoRunner;

#[async_trait]
impl RemoteRunner for EchoRunner {
    async fn run(&self, request: &RunRequest) -> Result<RunOutcome, RemoteUnavailable> {
        let nodes = request
            .workflow
            .nodes
            .iter()
            .map(|node| loomcore::NodeRunResult {
                id: node.id.clone(),
                status: loomcore::RunStatus::Success,
                output: json!("remote output"),
                stdout: format!("ran {}", node.title),
                stderr: String::new(),
                execution_time_seconds: 0.01,
                loop_result: None,
            })
            .collect::<Vec<_>>();
        let total_time_seconds = nodes.len() as f64 * 0.01;
        Ok(RunOutcome {
            status: loomcore::RunStatus::Success,
            nodes,
            total_time_seconds,
            error: None,
        })
    }
}

fn service_with_runner(runner: Option<Arc<dyn RemoteRunner>>) -> LoomService {
    let db = Database::open_in_memory().unwrap();
    let orchestrator = Orchestrator::new(
        runner,
        Simulator::with_timing(Box::new(FixedTiming(0.05))),
        Arc::new(EventBus::new(64)),
    );
    LoomService::new(db, orchestrator)
}

fn service() -> LoomService {
    service_with_runner(None)
}

fn pipeline_data() -> WorkflowData {
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

fn save_request(name: &str) -> SaveWorkflowRequest {
    SaveWorkflowRequest {
        id: None,
        name: name.to_string(),
        description: None,
        tags: Vec::new(),
        data: pipeline_data(),
        is_template: false,
        is_public: false,
    }
}

#[tokio::test]
async fn fallback_run_yields_one_result_per_node_and_records_diagnostic() {
    let service = service_with_runner(Some(Arc::new(DownRunner)));
    let saved = service.save_workflow(save_request("fallback target")).unwrap();

    let report = service
        .execute_workflow(ExecuteRequest {
            workflow_id: Some(saved.id.clone()),
            data: Some(pipeline_data()),
            save_execution: true,
        })
        .await
        .unwrap();

    assert!(report.simulated);
    assert_eq!(report.outcome.nodes.len(), 3);
    let python = report.outcome.nodes.iter().find(|n| n.id == "n2").unwrap();
    assert!(python.stdout.contains("def run(input):"));

    let history = service.get_execution_history(&saved.id, 10, 0).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].diagnostic.as_deref(), Some("connection refused"));
    assert_eq!(history[0].execution_data.nodes.len(), 3);
}

#[tokio::test]
async fn healthy_runtime_results_pass_through_unchanged() {
    let service = service_with_runner(Some(Arc::new(EchoRunner)));

    let report = service
        .execute_workflow(ExecuteRequest {
            workflow_id: None,
            data: Some(pipeline_data()),
            save_execution: false,
        })
        .await
        .unwrap();

    assert!(!report.simulated);
    assert!(report.diagnostic.is_none());
    assert_eq!(report.outcome.nodes.len(), 3);
    assert_eq!(report.outcome.nodes[0].stdout, "ran Start");
}

#[tokio::test]
async fn run_without_persistence_leaves_no_history() {
    let service = service();
    let saved = service.save_workflow(save_request("ephemeral")).unwrap();

    service
        .execute_workflow(ExecuteRequest {
            workflow_id: Some(saved.id.clone()),
            data: None,
            save_execution: false,
        })
        .await
        .unwrap();

    assert!(service.get_execution_history(&saved.id, 10, 0).unwrap().is_empty());
}

#[tokio::test]
async fn executing_unknown_workflow_without_data_is_not_found() {
    let service = service();
    let err = service
        .execute_workflow(ExecuteRequest {
            workflow_id: Some("missing".to_string()),
            data: None,
            save_execution: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LoomError::NotFound(_)));
}

#[tokio::test]
async fn unterminated_loop_fails_validation_before_any_run() {
    let service = service();
    let mut data = WorkflowData::default();
    data.add_node("n1", NodeDefinition::new(NodeType::Start, "Start"));
    data.add_node(
        "n2",
        NodeDefinition::new(NodeType::Foreach, "Loop").with_config(json!({ "items": [1] })),
    );
    data.connect("n1", "out", "n2", "in");

    let err = service
        .execute_workflow(ExecuteRequest {
            workflow_id: None,
            data: Some(data),
            save_execution: false,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LoomError::Graph(_)));
}

#[test]
fn reserved_names_are_rejected_on_create_only() {
    let service = service();

    for reserved in ["Untitled", "Untitled Workflow"] {
        let err = service.save_workflow(save_request(reserved)).unwrap_err();
        assert!(matches!(err, LoomError::Validation(_)), "{reserved}");
    }

    let saved = service.save_workflow(save_request("named later")).unwrap();
    let mut rename = save_request("Untitled");
    rename.id = Some(saved.id.clone());
    let updated = service.save_workflow(rename).unwrap();
    assert_eq!(updated.id, saved.id);
    assert!(!updated.created);
}

#[test]
fn save_then_get_round_trips_data() {
    let service = service();
    let saved = service.save_workflow(save_request("round trip")).unwrap();

    let detail = service.get_workflow(&saved.id, false).unwrap();
    assert_eq!(detail.workflow.data, pipeline_data());
    assert!(detail.history.is_none());
}

#[test]
fn duplicate_copies_data_under_a_new_id() {
    let service = service();
    let saved = service.save_workflow(save_request("original")).unwrap();

    let copy = service.duplicate_workflow(&saved.id, "copy of original").unwrap();
    assert_ne!(copy.id, saved.id);

    let detail = service.get_workflow(&copy.id, false).unwrap();
    assert_eq!(detail.workflow.data, pipeline_data());
    assert_eq!(detail.workflow.name, "copy of original");
}

#[test]
fn export_then_import_dedupes_the_name() {
    let service = service();
    let saved = service.save_workflow(save_request("shared flow")).unwrap();

    let bundle = service.export_workflow(&saved.id, "json", true).unwrap();
    assert_eq!(bundle.envelope.format, "loom-workflow-v1");
    assert_eq!(bundle.filename, "shared-flow.loom.json");

    let imported = service
        .import_workflow(bundle.envelope, None, true)
        .unwrap();
    assert_ne!(imported.id, saved.id);
    assert_eq!(imported.name, "shared flow (2)");

    let detail = service.get_workflow(&imported.id, false).unwrap();
    assert_eq!(detail.workflow.data, pipeline_data());
}

#[test]
fn export_rejects_unknown_file_format() {
    let service = service();
    let saved = service.save_workflow(save_request("only json")).unwrap();

    let err = service.export_workflow(&saved.id, "yaml", true).unwrap_err();
    assert!(matches!(err, LoomError::UnsupportedFormat(_)));
}

#[test]
fn import_rejects_unknown_envelope_format() {
    let service = service();
    let saved = service.save_workflow(save_request("exported")).unwrap();
    let mut bundle = service.export_workflow(&saved.id, "json", false).unwrap();
    bundle.envelope.format = "other-tool-v9".to_string();

    let err = service
        .import_workflow(bundle.envelope, None, false)
        .unwrap_err();
    assert!(matches!(err, LoomError::UnsupportedFormat(_)));
}

#[test]
fn custom_node_names_are_unique_and_overwrite_preserves_id() {
    let service = service();

    let draft = loomruntime::CustomNodeDraft {
        name: "Summarizer".to_string(),
        node_type: NodeType::Llm,
        description: Some("Summarize input".to_string()),
        config: json!({ "provider": "openai", "model": "gpt-4o-mini" }),
    };
    let created = service.create_custom_node(draft.clone()).unwrap();

    let err = service.create_custom_node(draft).unwrap_err();
    assert!(matches!(err, LoomError::NameCollision(_)));

    let envelope = service.export_custom_node(&created.id).unwrap();
    assert_eq!(envelope.format, "loom-custom-node-v1");

    let err = service
        .import_custom_node(envelope.clone(), false)
        .unwrap_err();
    assert!(matches!(err, LoomError::NameCollision(_)));

    let overwritten = service.import_custom_node(envelope, true).unwrap();
    assert_eq!(overwritten.id, created.id);
}

#[test]
fn custom_node_import_rejects_unknown_format() {
    let service = service();
    let envelope = CustomNodeEnvelope {
        format: "loom-custom-node-v2".to_string(),
        metadata: loomcore::CustomNodeMetadata {
            name: "Future".to_string(),
            description: None,
            node_type: NodeType::Llm,
            exported_at: chrono::Utc::now(),
        },
        node: json!({}),
    };

    let err = service.import_custom_node(envelope, true).unwrap_err();
    assert!(matches!(err, LoomError::UnsupportedFormat(_)));
}

#[test]
fn history_offset_past_end_returns_empty_page() {
    let service = service();
    let saved = service.save_workflow(save_request("paged")).unwrap();

    let page = service.get_execution_history(&saved.id, 10, 1000).unwrap();
    assert!(page.is_empty());
}

#[test]
fn node_templates_include_builtins_and_filter() {
    let service = service();

    let all = service.get_node_templates(None, None).unwrap();
    assert_eq!(all.len(), NodeType::ALL.len());

    let ai = service.get_node_templates(Some("ai"), None).unwrap();
    assert!(ai.iter().all(|t| t.category == "ai"));
    assert!(ai.iter().any(|t| t.node_type == NodeType::Llm));

    let searched = service.get_node_templates(None, Some("http")).unwrap();
    assert!(searched.iter().any(|t| t.node_type == NodeType::Http));
}
