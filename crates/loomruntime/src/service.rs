use crate::orchestrator::{Orchestrator, RunReport};
use crate::registry::{CustomNodeDraft, NodeRegistry};
use chrono::Utc;
use loomcore::{
    CustomNode, CustomNodeEnvelope, ExecutionRecord, ExportMetadata, LoomError, NodeTemplate,
    Result, Workflow, WorkflowData, WorkflowEnvelope, WorkflowExport, RESERVED_NAMES,
    WORKFLOW_FORMAT,
};
use loomstore::{
    CustomNodeRepository, Database, ExecutionRepository, TemplateRepository, WorkflowPage,
    WorkflowQuery, WorkflowRepository,
};
use serde::{Deserialize, Serialize};

const DEFAULT_HISTORY_PAGE: u32 = 50;
const MAX_HISTORY_PAGE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveWorkflowRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub data: WorkflowData,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveWorkflowResponse {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDetail {
    #[serde(flatten)]
    pub workflow: Workflow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<ExecutionRecord>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExportBundle {
    pub envelope: WorkflowEnvelope,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportWorkflowResponse {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub data: Option<WorkflowData>,
    #[serde(default)]
    pub save_execution: bool,
}

/// Procedure facade exposed to the presentation layer
///
/// Composes the persistence repositories, the node registry, and the
/// orchestrator; the HTTP server and the CLI are thin callers.
pub struct LoomService {
    workflows: WorkflowRepository,
    executions: ExecutionRepository,
    registry: NodeRegistry,
    orchestrator: Orchestrator,
}

impl LoomService {
    pub fn new(db: Database, orchestrator: Orchestrator) -> Self {
        Self {
            workflows: WorkflowRepository::new(db.clone()),
            executions: ExecutionRepository::new(db.clone()),
            registry: NodeRegistry::new(
                TemplateRepository::new(db.clone()),
                CustomNodeRepository::new(db),
            ),
            orchestrator,
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    pub fn get_workflow(&self, id: &str, include_history: bool) -> Result<WorkflowDetail> {
        let workflow = self
            .workflows
            .get(id)?
            .ok_or_else(|| LoomError::NotFound(format!("workflow {id}")))?;

        let history = if include_history {
            Some(self.executions.list(id, DEFAULT_HISTORY_PAGE, 0)?)
        } else {
            None
        };

        Ok(WorkflowDetail { workflow, history })
    }

    pub fn save_workflow(&self, request: SaveWorkflowRequest) -> Result<SaveWorkflowResponse> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(LoomError::Validation("workflow name must not be empty".into()));
        }

        match request.id {
            None => {
                // The reserved-placeholder guard applies to creation only.
                if RESERVED_NAMES.contains(&name.as_str()) {
                    return Err(LoomError::Validation(format!(
                        "'{name}' is a reserved placeholder name"
                    )));
                }
                if self.workflows.find_id_by_name(&name)?.is_some() {
                    return Err(LoomError::Validation(format!(
                        "a workflow named '{name}' already exists"
                    )));
                }

                let mut workflow = Workflow::new(name, request.data);
                workflow.description = request.description;
                workflow.tags = request.tags;
                workflow.is_template = request.is_template;
                workflow.is_public = request.is_public;
                self.workflows.insert(&workflow)?;
                tracing::info!("created workflow '{}' ({})", workflow.name, workflow.id);

                Ok(SaveWorkflowResponse {
                    id: workflow.id,
                    created: true,
                })
            }
            Some(id) => {
                let mut workflow = self
                    .workflows
                    .get(&id)?
                    .ok_or_else(|| LoomError::NotFound(format!("workflow {id}")))?;

                if let Some(holder) = self.workflows.find_id_by_name(&name)? {
                    if holder != workflow.id {
                        return Err(LoomError::Validation(format!(
                            "a workflow named '{name}' already exists"
                        )));
                    }
                }

                workflow.name = name;
                workflow.description = request.description;
                workflow.tags = request.tags;
                workflow.data = request.data;
                workflow.is_template = request.is_template;
                workflow.is_public = request.is_public;
                workflow.version += 1;
                workflow.updated_at = Utc::now();
                self.workflows.update(&workflow)?;

                Ok(SaveWorkflowResponse {
                    id: workflow.id,
                    created: false,
                })
            }
        }
    }

    pub fn list_workflows(&self, query: &WorkflowQuery) -> Result<WorkflowPage> {
        self.workflows.list(query)
    }

    pub fn duplicate_workflow(&self, id: &str, name: &str) -> Result<SaveWorkflowResponse> {
        let source = self
            .workflows
            .get(id)?
            .ok_or_else(|| LoomError::NotFound(format!("workflow {id}")))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(LoomError::Validation("workflow name must not be empty".into()));
        }
        if self.workflows.find_id_by_name(name)?.is_some() {
            return Err(LoomError::Validation(format!(
                "a workflow named '{name}' already exists"
            )));
        }

        let mut copy = Workflow::new(name, source.data.clone());
        copy.description = source.description.clone();
        copy.tags = source.tags.clone();
        copy.is_template = source.is_template;
        copy.is_public = source.is_public;
        self.workflows.insert(&copy)?;

        Ok(SaveWorkflowResponse {
            id: copy.id,
            created: true,
        })
    }

    /// History rows go with the workflow (cascade on the store side).
    pub fn delete_workflow(&self, id: &str) -> Result<bool> {
        self.workflows.delete(id)
    }

    /// Only JSON export exists today; the parameter keeps the surface
    /// stable for other formats.
    pub fn export_workflow(
        &self,
        id: &str,
        format: &str,
        include_metadata: bool,
    ) -> Result<WorkflowExportBundle> {
        if format != "json" {
            return Err(LoomError::UnsupportedFormat(format.to_string()));
        }

        let workflow = self
            .workflows
            .get(id)?
            .ok_or_else(|| LoomError::NotFound(format!("workflow {id}")))?;

        let metadata = include_metadata.then(|| ExportMetadata {
            description: workflow.description.clone(),
            tags: workflow.tags.clone(),
            exported_at: Utc::now(),
        });
        let filename = format!("{}.loom.json", slug(&workflow.name));

        Ok(WorkflowExportBundle {
            envelope: WorkflowEnvelope {
                format: WORKFLOW_FORMAT.to_string(),
                metadata,
                workflow: WorkflowExport {
                    name: workflow.name,
                    data: workflow.data,
                },
            },
            filename,
        })
    }

    pub fn import_workflow(
        &self,
        envelope: WorkflowEnvelope,
        name: Option<String>,
        overwrite_metadata: bool,
    ) -> Result<ImportWorkflowResponse> {
        if envelope.format != WORKFLOW_FORMAT {
            return Err(LoomError::UnsupportedFormat(envelope.format));
        }

        let base = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| envelope.workflow.name.clone());
        let unique = self.dedupe_name(&base)?;

        let mut workflow = Workflow::new(unique, envelope.workflow.data);
        if overwrite_metadata {
            if let Some(metadata) = envelope.metadata {
                workflow.description = metadata.description;
                workflow.tags = metadata.tags;
            }
        }
        self.workflows.insert(&workflow)?;
        tracing::info!("imported workflow '{}' ({})", workflow.name, workflow.id);

        Ok(ImportWorkflowResponse {
            id: workflow.id,
            name: workflow.name,
        })
    }

    fn dedupe_name(&self, base: &str) -> Result<String> {
        if self.workflows.find_id_by_name(base)?.is_none() {
            return Ok(base.to_string());
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{base} ({n})");
            if self.workflows.find_id_by_name(&candidate)?.is_none() {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    pub async fn execute_workflow(&self, request: ExecuteRequest) -> Result<RunReport> {
        let data = match request.data {
            Some(data) => data,
            None => {
                let id = request.workflow_id.as_deref().ok_or_else(|| {
                    LoomError::Validation("either a workflow id or graph data is required".into())
                })?;
                self.workflows
                    .get(id)?
                    .ok_or_else(|| LoomError::NotFound(format!("workflow {id}")))?
                    .data
            }
        };

        let report = self
            .orchestrator
            .execute(request.workflow_id.as_deref(), &data)
            .await?;

        // Recording is a no-op without a stored workflow to attach to.
        if request.save_execution {
            if let Some(workflow_id) = &request.workflow_id {
                if self.workflows.get(workflow_id)?.is_some() {
                    let record = ExecutionRecord {
                        id: report.execution_id.to_string(),
                        workflow_id: Some(workflow_id.clone()),
                        status: report.outcome.status,
                        duration_seconds: report.duration_seconds,
                        execution_data: report.outcome.clone(),
                        diagnostic: report.diagnostic.clone(),
                        started_at: report.started_at,
                        completed_at: report.completed_at,
                    };
                    self.executions.append(&record)?;
                }
            }
        }

        Ok(report)
    }

    pub fn get_execution_history(
        &self,
        workflow_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ExecutionRecord>> {
        let limit = if limit == 0 {
            DEFAULT_HISTORY_PAGE
        } else {
            limit.min(MAX_HISTORY_PAGE)
        };
        self.executions.list(workflow_id, limit, offset)
    }

    // ------------------------------------------------------------------
    // Node catalog
    // ------------------------------------------------------------------

    pub fn get_node_templates(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<NodeTemplate>> {
        self.registry.list_templates(category, search)
    }

    pub fn save_node_template(&self, template: NodeTemplate) -> Result<NodeTemplate> {
        self.registry.save_template(template)
    }

    pub fn list_custom_nodes(&self) -> Result<Vec<CustomNode>> {
        self.registry.list_custom()
    }

    pub fn get_custom_node_by_name(&self, name: &str) -> Result<Option<CustomNode>> {
        self.registry.get_custom_by_name(name)
    }

    pub fn create_custom_node(&self, draft: CustomNodeDraft) -> Result<CustomNode> {
        self.registry.create_custom(draft)
    }

    pub fn update_custom_node(&self, id: &str, draft: CustomNodeDraft) -> Result<CustomNode> {
        self.registry.update_custom(id, draft)
    }

    pub fn delete_custom_node(&self, id: &str) -> Result<bool> {
        self.registry.delete_custom(id)
    }

    pub fn export_custom_node(&self, id: &str) -> Result<CustomNodeEnvelope> {
        self.registry.export_custom(id)
    }

    pub fn import_custom_node(
        &self,
        envelope: CustomNodeEnvelope,
        overwrite: bool,
    ) -> Result<CustomNode> {
        self.registry.import_custom(envelope, overwrite)
    }
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("workflow");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_punctuation() {
        assert_eq!(slug("Daily Report (v2)"), "daily-report-v2");
        assert_eq!(slug("  "), "workflow");
    }
}
