use crate::template_repo::parse_node_type;
use crate::workflow_repo::parse_timestamp;
use crate::Database;
use loomcore::{CustomNode, LoomError, Result};
use rusqlite::{params, OptionalExtension};

/// Repository for user-authored node presets
///
/// Name uniqueness is backed by a UNIQUE column; callers check for
/// collisions first so the violation surfaces as a domain error instead
/// of a constraint failure.
#[derive(Clone)]
pub struct CustomNodeRepository {
    db: Database,
}

impl CustomNodeRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(&self) -> Result<Vec<CustomNode>> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM custom_nodes ORDER BY name"
                ))
                .map_err(LoomError::storage)?;
            let rows = stmt
                .query_map([], CustomNodeRow::from_row)
                .map_err(LoomError::storage)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(LoomError::storage)?;
            Ok(rows)
        })?;

        rows.into_iter().map(CustomNodeRow::into_node).collect()
    }

    pub fn get(&self, id: &str) -> Result<Option<CustomNode>> {
        let row = self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM custom_nodes WHERE id = ?1"),
                params![id],
                CustomNodeRow::from_row,
            )
            .optional()
            .map_err(LoomError::storage)
        })?;
        row.map(CustomNodeRow::into_node).transpose()
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<CustomNode>> {
        let row = self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM custom_nodes WHERE name = ?1"),
                params![name],
                CustomNodeRow::from_row,
            )
            .optional()
            .map_err(LoomError::storage)
        })?;
        row.map(CustomNodeRow::into_node).transpose()
    }

    pub fn insert(&self, node: &CustomNode) -> Result<()> {
        let config = serde_json::to_string(&node.config)?;
        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO custom_nodes
                    (id, name, node_type, description, config, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    node.id,
                    node.name,
                    node.node_type.as_str(),
                    node.description,
                    config,
                    node.created_at.to_rfc3339(),
                    node.updated_at.to_rfc3339(),
                ],
            )
            .map_err(LoomError::storage)?;
            Ok(())
        })
    }

    pub fn update(&self, node: &CustomNode) -> Result<()> {
        let config = serde_json::to_string(&node.config)?;
        self.db.with_connection(|conn| {
            let affected = conn
                .execute(
                    r#"
                    UPDATE custom_nodes
                    SET name = ?2, node_type = ?3, description = ?4, config = ?5, updated_at = ?6
                    WHERE id = ?1
                    "#,
                    params![
                        node.id,
                        node.name,
                        node.node_type.as_str(),
                        node.description,
                        config,
                        node.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(LoomError::storage)?;
            if affected == 0 {
                return Err(LoomError::NotFound(format!("custom node {}", node.id)));
            }
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.db.with_connection(|conn| {
            let affected = conn
                .execute("DELETE FROM custom_nodes WHERE id = ?1", params![id])
                .map_err(LoomError::storage)?;
            Ok(affected > 0)
        })
    }
}

const COLUMNS: &str = "id, name, node_type, description, config, created_at, updated_at";

struct CustomNodeRow {
    id: String,
    name: String,
    node_type: String,
    description: Option<String>,
    config: String,
    created_at: String,
    updated_at: String,
}

impl CustomNodeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            node_type: row.get(2)?,
            description: row.get(3)?,
            config: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_node(self) -> Result<CustomNode> {
        Ok(CustomNode {
            id: self.id,
            name: self.name,
            node_type: parse_node_type(&self.node_type)?,
            description: self.description,
            config: serde_json::from_str(&self.config)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use loomcore::NodeType;
    use serde_json::json;

    fn sample(name: &str) -> CustomNode {
        let now = Utc::now();
        CustomNode {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            node_type: NodeType::Llm,
            description: None,
            config: json!({"provider": "openai", "model": "gpt-3.5-turbo"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn crud_and_name_lookup() {
        let db = Database::open_in_memory().unwrap();
        let repo = CustomNodeRepository::new(db);

        let node = sample("Summarizer");
        repo.insert(&node).unwrap();

        let by_name = repo.get_by_name("Summarizer").unwrap().unwrap();
        assert_eq!(by_name.id, node.id);
        assert!(repo.get_by_name("summarizer").unwrap().is_none());

        let mut renamed = by_name;
        renamed.name = "Summarizer v2".to_string();
        repo.update(&renamed).unwrap();
        assert!(repo.get_by_name("Summarizer").unwrap().is_none());

        assert!(repo.delete(&renamed.id).unwrap());
        assert!(repo.list().unwrap().is_empty());
    }
}
