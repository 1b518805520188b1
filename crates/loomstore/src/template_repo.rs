use crate::Database;
use chrono::Utc;
use loomcore::{LoomError, NodeTemplate, NodeType, Result};
use rusqlite::params;
use std::str::FromStr;

/// Repository for user-saved node templates
#[derive(Clone)]
pub struct TemplateRepository {
    db: Database,
}

impl TemplateRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(&self) -> Result<Vec<NodeTemplate>> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, node_type, name, description, default_config, category
                    FROM node_templates
                    ORDER BY name
                    "#,
                )
                .map_err(LoomError::storage)?;
            let rows = stmt
                .query_map([], TemplateRow::from_row)
                .map_err(LoomError::storage)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(LoomError::storage)?;
            Ok(rows)
        })?;

        rows.into_iter().map(TemplateRow::into_template).collect()
    }

    pub fn save(&self, template: &NodeTemplate) -> Result<()> {
        let default_config = serde_json::to_string(&template.default_config)?;
        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO node_templates
                    (id, node_type, name, description, default_config, category, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    template.id,
                    template.node_type.as_str(),
                    template.name,
                    template.description,
                    default_config,
                    template.category,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(LoomError::storage)?;
            Ok(())
        })
    }
}

struct TemplateRow {
    id: String,
    node_type: String,
    name: String,
    description: Option<String>,
    default_config: String,
    category: String,
}

impl TemplateRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_type: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            default_config: row.get(4)?,
            category: row.get(5)?,
        })
    }

    fn into_template(self) -> Result<NodeTemplate> {
        Ok(NodeTemplate {
            id: self.id,
            node_type: parse_node_type(&self.node_type)?,
            name: self.name,
            description: self.description,
            default_config: serde_json::from_str(&self.default_config)?,
            category: self.category,
        })
    }
}

pub(crate) fn parse_node_type(tag: &str) -> Result<NodeType> {
    NodeType::from_str(tag)
        .map_err(|_| LoomError::Storage(format!("unknown node type tag '{tag}'")))
}
