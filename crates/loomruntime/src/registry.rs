use chrono::Utc;
use loomcore::{
    CustomNode, CustomNodeEnvelope, CustomNodeMetadata, LoomError, NodeTemplate, NodeType, Result,
    CUSTOM_NODE_FORMAT,
};
use loomstore::{CustomNodeRepository, TemplateRepository};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// Built-in node catalog, one preset per type tag
pub fn builtin_templates() -> Vec<NodeTemplate> {
    NodeType::ALL
        .iter()
        .map(|&node_type| NodeTemplate {
            id: format!("builtin-{}", node_type),
            node_type,
            name: builtin_name(node_type).to_string(),
            description: Some(builtin_description(node_type).to_string()),
            default_config: builtin_config(node_type),
            category: node_type.category().to_string(),
        })
        .collect()
}

fn builtin_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Start => "Start",
        NodeType::End => "End",
        NodeType::Python => "Python Script",
        NodeType::Typescript => "TypeScript Script",
        NodeType::Http => "HTTP Request",
        NodeType::File => "File",
        NodeType::Condition => "Condition",
        NodeType::Database => "Database Query",
        NodeType::Llm => "LLM Prompt",
        NodeType::Embedding => "Embedding",
        NodeType::Foreach => "For Each",
        NodeType::Endloop => "End Loop",
        NodeType::Markdown => "Markdown View",
        NodeType::Html => "HTML View",
        NodeType::Json => "JSON View",
        NodeType::Image => "Image View",
        NodeType::Ocr => "OCR",
        NodeType::Browser => "Browser",
    }
}

fn builtin_description(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Start => "Entry point of the workflow",
        NodeType::End => "Terminates the workflow",
        NodeType::Python => "Run a Python snippet",
        NodeType::Typescript => "Run a TypeScript snippet",
        NodeType::Http => "Call an HTTP endpoint",
        NodeType::File => "Read a file",
        NodeType::Condition => "Branch on an expression",
        NodeType::Database => "Run a SQL query",
        NodeType::Llm => "Prompt a language model",
        NodeType::Embedding => "Embed text into a vector",
        NodeType::Foreach => "Repeat the enclosed nodes per item",
        NodeType::Endloop => "Close the enclosing loop",
        NodeType::Markdown => "Render markdown",
        NodeType::Html => "Render HTML",
        NodeType::Json => "Inspect JSON",
        NodeType::Image => "Display an image",
        NodeType::Ocr => "Extract text from an image",
        NodeType::Browser => "Open a page in a browser",
    }
}

fn builtin_config(node_type: NodeType) -> serde_json::Value {
    match node_type {
        NodeType::Llm => json!({ "provider": "openai", "model": "gpt-3.5-turbo" }),
        NodeType::Embedding => json!({ "provider": "openai", "model": "text-embedding-3-small" }),
        NodeType::Http => json!({ "method": "GET", "url": "" }),
        NodeType::File => json!({ "path": "" }),
        NodeType::Condition => json!({ "expression": "true" }),
        NodeType::Database => json!({ "query": "" }),
        NodeType::Foreach => json!({ "items": [] }),
        NodeType::Browser => json!({ "url": "" }),
        NodeType::Image | NodeType::Ocr => json!({ "source": "" }),
        _ => json!({}),
    }
}

/// Fields accepted when creating or updating a custom node
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomNodeDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Catalog of built-in templates and user-defined node presets
///
/// Custom node names are globally unique and case-sensitive; every write
/// path checks for a holder of the name before touching the store.
#[derive(Clone)]
pub struct NodeRegistry {
    templates: TemplateRepository,
    custom: CustomNodeRepository,
}

impl NodeRegistry {
    pub fn new(templates: TemplateRepository, custom: CustomNodeRepository) -> Self {
        Self { templates, custom }
    }

    pub fn list_templates(
        &self,
        category: Option<&str>,
        search: Option<&str>,
    ) -> Result<Vec<NodeTemplate>> {
        let mut all = builtin_templates();
        all.extend(self.templates.list()?);

        if let Some(category) = category.filter(|c| !c.is_empty()) {
            all.retain(|template| template.category == category);
        }
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            all.retain(|template| {
                template.name.to_lowercase().contains(&needle)
                    || template
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            });
        }

        Ok(all)
    }

    pub fn save_template(&self, mut template: NodeTemplate) -> Result<NodeTemplate> {
        if template.id.is_empty() {
            template.id = Uuid::new_v4().to_string();
        }
        self.templates.save(&template)?;
        Ok(template)
    }

    pub fn list_custom(&self) -> Result<Vec<CustomNode>> {
        self.custom.list()
    }

    pub fn get_custom_by_name(&self, name: &str) -> Result<Option<CustomNode>> {
        self.custom.get_by_name(name)
    }

    pub fn create_custom(&self, draft: CustomNodeDraft) -> Result<CustomNode> {
        if self.custom.get_by_name(&draft.name)?.is_some() {
            return Err(LoomError::NameCollision(draft.name));
        }

        let now = Utc::now();
        let node = CustomNode {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            node_type: draft.node_type,
            description: draft.description,
            config: draft.config,
            created_at: now,
            updated_at: now,
        };
        self.custom.insert(&node)?;
        tracing::info!("created custom node '{}'", node.name);
        Ok(node)
    }

    pub fn update_custom(&self, id: &str, draft: CustomNodeDraft) -> Result<CustomNode> {
        let mut node = self
            .custom
            .get(id)?
            .ok_or_else(|| LoomError::NotFound(format!("custom node {id}")))?;

        if let Some(holder) = self.custom.get_by_name(&draft.name)? {
            if holder.id != node.id {
                return Err(LoomError::NameCollision(draft.name));
            }
        }

        node.name = draft.name;
        node.node_type = draft.node_type;
        node.description = draft.description;
        node.config = draft.config;
        node.updated_at = Utc::now();
        self.custom.update(&node)?;
        Ok(node)
    }

    pub fn delete_custom(&self, id: &str) -> Result<bool> {
        self.custom.delete(id)
    }

    pub fn export_custom(&self, id: &str) -> Result<CustomNodeEnvelope> {
        let node = self
            .custom
            .get(id)?
            .ok_or_else(|| LoomError::NotFound(format!("custom node {id}")))?;

        Ok(CustomNodeEnvelope {
            format: CUSTOM_NODE_FORMAT.to_string(),
            metadata: CustomNodeMetadata {
                name: node.name,
                description: node.description,
                node_type: node.node_type,
                exported_at: Utc::now(),
            },
            node: node.config,
        })
    }

    /// Import a custom node envelope. With `overwrite` the existing
    /// record keeps its id; without it a held name is a collision.
    pub fn import_custom(
        &self,
        envelope: CustomNodeEnvelope,
        overwrite: bool,
    ) -> Result<CustomNode> {
        if envelope.format != CUSTOM_NODE_FORMAT {
            return Err(LoomError::UnsupportedFormat(envelope.format));
        }

        match self.custom.get_by_name(&envelope.metadata.name)? {
            Some(mut existing) if overwrite => {
                existing.node_type = envelope.metadata.node_type;
                existing.description = envelope.metadata.description;
                existing.config = envelope.node;
                existing.updated_at = Utc::now();
                self.custom.update(&existing)?;
                Ok(existing)
            }
            Some(_) => Err(LoomError::NameCollision(envelope.metadata.name)),
            None => self.create_custom(CustomNodeDraft {
                name: envelope.metadata.name,
                node_type: envelope.metadata.node_type,
                description: envelope.metadata.description,
                config: envelope.node,
            }),
        }
    }
}
