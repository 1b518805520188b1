use loomcore::{LoomError, Result};
use rusqlite::{params, Connection};

pub const CURRENT_VERSION: i64 = 1;

struct Migration {
    version: i64,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema",
    up: r#"
        CREATE TABLE IF NOT EXISTS workflows (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            data TEXT NOT NULL,
            is_template INTEGER NOT NULL DEFAULT 0,
            is_public INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_workflows_updated ON workflows(updated_at DESC);

        CREATE TABLE IF NOT EXISTS node_templates (
            id TEXT PRIMARY KEY,
            node_type TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            default_config TEXT NOT NULL DEFAULT '{}',
            category TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_node_templates_category ON node_templates(category);

        CREATE TABLE IF NOT EXISTS custom_nodes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            node_type TEXT NOT NULL,
            description TEXT,
            config TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            workflow_id TEXT REFERENCES workflows(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            duration_seconds REAL NOT NULL,
            execution_data TEXT NOT NULL,
            diagnostic TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_executions_workflow
            ON executions(workflow_id, started_at DESC);
    "#,
}];

/// Bring the schema up to [`CURRENT_VERSION`], recording each applied step
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            description TEXT
        );
        "#,
    )
    .map_err(LoomError::storage)?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::info!(
                "running migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up).map_err(LoomError::storage)?;
            conn.execute(
                "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
                params![migration.version, migration.description],
            )
            .map_err(LoomError::storage)?;
        }
    }

    Ok(())
}
