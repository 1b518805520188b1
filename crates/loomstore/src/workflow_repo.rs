use crate::Database;
use chrono::{DateTime, Utc};
use loomcore::{LoomError, Result, Workflow};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 100;

/// Listing filter for the workflow catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowCategory {
    #[default]
    All,
    Workflows,
    Templates,
    Public,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    Name,
    CreatedAt,
    #[default]
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowQuery {
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub category: WorkflowCategory,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPage {
    pub items: Vec<Workflow>,
    pub total: u64,
}

/// Repository for stored workflow rows
#[derive(Clone)]
pub struct WorkflowRepository {
    db: Database,
}

impl WorkflowRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, workflow: &Workflow) -> Result<()> {
        let row = WorkflowRow::from_workflow(workflow)?;
        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO workflows
                    (id, name, description, tags, data, is_template, is_public, version, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    row.id,
                    row.name,
                    row.description,
                    row.tags,
                    row.data,
                    row.is_template,
                    row.is_public,
                    row.version,
                    row.created_at,
                    row.updated_at,
                ],
            )
            .map_err(LoomError::storage)?;
            Ok(())
        })
    }

    pub fn update(&self, workflow: &Workflow) -> Result<()> {
        let row = WorkflowRow::from_workflow(workflow)?;
        self.db.with_connection(|conn| {
            let affected = conn
                .execute(
                    r#"
                    UPDATE workflows
                    SET name = ?2, description = ?3, tags = ?4, data = ?5,
                        is_template = ?6, is_public = ?7, version = ?8, updated_at = ?9
                    WHERE id = ?1
                    "#,
                    params![
                        row.id,
                        row.name,
                        row.description,
                        row.tags,
                        row.data,
                        row.is_template,
                        row.is_public,
                        row.version,
                        row.updated_at,
                    ],
                )
                .map_err(LoomError::storage)?;
            if affected == 0 {
                return Err(LoomError::NotFound(format!("workflow {}", row.id)));
            }
            Ok(())
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Workflow>> {
        let row = self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM workflows WHERE id = ?1"),
                params![id],
                WorkflowRow::from_row,
            )
            .optional()
            .map_err(LoomError::storage)
        })?;
        row.map(WorkflowRow::into_workflow).transpose()
    }

    pub fn find_id_by_name(&self, name: &str) -> Result<Option<String>> {
        self.db.with_connection(|conn| {
            conn.query_row(
                "SELECT id FROM workflows WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(LoomError::storage)
        })
    }

    pub fn list(&self, query: &WorkflowQuery) -> Result<WorkflowPage> {
        let (filter, binds) = build_filter(query);

        let total: u64 = self.db.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM workflows WHERE 1=1{filter}"),
                params_from_iter(binds.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count.max(0) as u64)
            .map_err(LoomError::storage)
        })?;

        let column = match query.sort_by {
            SortBy::Name => "name",
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
        };
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let limit = if query.limit == 0 {
            DEFAULT_PAGE
        } else {
            query.limit.min(MAX_PAGE)
        };

        let mut binds = binds;
        binds.push(SqlValue::Integer(limit as i64));
        binds.push(SqlValue::Integer(query.offset as i64));

        let rows = self.db.with_connection(|conn| {
            let sql = format!(
                "SELECT {COLUMNS} FROM workflows WHERE 1=1{filter} \
                 ORDER BY {column} {direction} LIMIT ? OFFSET ?"
            );
            let mut stmt = conn.prepare(&sql).map_err(LoomError::storage)?;
            let rows = stmt
                .query_map(params_from_iter(binds.iter()), WorkflowRow::from_row)
                .map_err(LoomError::storage)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(LoomError::storage)?;
            Ok(rows)
        })?;

        let items = rows
            .into_iter()
            .map(WorkflowRow::into_workflow)
            .collect::<Result<Vec<_>>>()?;

        Ok(WorkflowPage { items, total })
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.db.with_connection(|conn| {
            let affected = conn
                .execute("DELETE FROM workflows WHERE id = ?1", params![id])
                .map_err(LoomError::storage)?;
            Ok(affected > 0)
        })
    }
}

const COLUMNS: &str =
    "id, name, description, tags, data, is_template, is_public, version, created_at, updated_at";

fn build_filter(query: &WorkflowQuery) -> (String, Vec<SqlValue>) {
    let mut filter = String::new();
    let mut binds: Vec<SqlValue> = Vec::new();

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        filter.push_str(" AND (name LIKE ? OR COALESCE(description, '') LIKE ?)");
        let pattern = format!("%{}%", search);
        binds.push(SqlValue::Text(pattern.clone()));
        binds.push(SqlValue::Text(pattern));
    }

    // Tags are stored as a JSON array; match each requested tag literally.
    for tag in &query.tags {
        filter.push_str(" AND tags LIKE ?");
        binds.push(SqlValue::Text(format!("%\"{}\"%", tag)));
    }

    match query.category {
        WorkflowCategory::All => {}
        WorkflowCategory::Workflows => filter.push_str(" AND is_template = 0"),
        WorkflowCategory::Templates => filter.push_str(" AND is_template = 1"),
        WorkflowCategory::Public => filter.push_str(" AND is_public = 1"),
    }

    (filter, binds)
}

/// Intermediate row shape for mapping database rows
struct WorkflowRow {
    id: String,
    name: String,
    description: Option<String>,
    tags: String,
    data: String,
    is_template: i64,
    is_public: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            tags: row.get(3)?,
            data: row.get(4)?,
            is_template: row.get(5)?,
            is_public: row.get(6)?,
            version: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn from_workflow(workflow: &Workflow) -> Result<Self> {
        Ok(Self {
            id: workflow.id.clone(),
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            tags: serde_json::to_string(&workflow.tags)?,
            data: serde_json::to_string(&workflow.data)?,
            is_template: workflow.is_template as i64,
            is_public: workflow.is_public as i64,
            version: workflow.version,
            created_at: workflow.created_at.to_rfc3339(),
            updated_at: workflow.updated_at.to_rfc3339(),
        })
    }

    fn into_workflow(self) -> Result<Workflow> {
        Ok(Workflow {
            id: self.id,
            name: self.name,
            description: self.description,
            tags: serde_json::from_str(&self.tags)?,
            data: serde_json::from_str(&self.data)?,
            is_template: self.is_template != 0,
            is_public: self.is_public != 0,
            version: self.version,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(LoomError::storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore::{NodeDefinition, NodeType, WorkflowData};

    fn sample_workflow(name: &str) -> Workflow {
        let mut data = WorkflowData::default();
        data.add_node("n1", NodeDefinition::new(NodeType::Start, "Start"));
        data.add_node("n2", NodeDefinition::new(NodeType::End, "End"));
        data.connect("n1", "out", "n2", "in");
        Workflow::new(name, data)
    }

    #[test]
    fn round_trip_preserves_data() {
        let db = Database::open_in_memory().unwrap();
        let repo = WorkflowRepository::new(db);

        let workflow = sample_workflow("roundtrip");
        repo.insert(&workflow).unwrap();

        let loaded = repo.get(&workflow.id).unwrap().unwrap();
        assert_eq!(loaded.name, "roundtrip");
        assert_eq!(loaded.data, workflow.data);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn list_filters_by_category_and_search() {
        let db = Database::open_in_memory().unwrap();
        let repo = WorkflowRepository::new(db);

        let mut template = sample_workflow("etl template");
        template.is_template = true;
        repo.insert(&template).unwrap();
        repo.insert(&sample_workflow("daily report")).unwrap();

        let templates = repo
            .list(&WorkflowQuery {
                category: WorkflowCategory::Templates,
                ..WorkflowQuery::default()
            })
            .unwrap();
        assert_eq!(templates.total, 1);
        assert_eq!(templates.items[0].name, "etl template");

        let searched = repo
            .list(&WorkflowQuery {
                search: Some("daily".to_string()),
                ..WorkflowQuery::default()
            })
            .unwrap();
        assert_eq!(searched.total, 1);
        assert_eq!(searched.items[0].name, "daily report");
    }

    #[test]
    fn list_offset_past_end_is_empty() {
        let db = Database::open_in_memory().unwrap();
        let repo = WorkflowRepository::new(db);
        repo.insert(&sample_workflow("only one")).unwrap();

        let page = repo
            .list(&WorkflowQuery {
                offset: 500,
                ..WorkflowQuery::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(page.items.is_empty());
    }

    #[test]
    fn find_id_by_name_is_case_sensitive_lookup() {
        let db = Database::open_in_memory().unwrap();
        let repo = WorkflowRepository::new(db);

        let workflow = sample_workflow("Exact Name");
        repo.insert(&workflow).unwrap();

        assert_eq!(
            repo.find_id_by_name("Exact Name").unwrap(),
            Some(workflow.id)
        );
        assert_eq!(repo.find_id_by_name("exact name").unwrap(), None);
    }
}
