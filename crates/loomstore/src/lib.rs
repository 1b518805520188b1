//! SQLite persistence for workflows, node presets, and execution history
//!
//! The [`Database`] handle is an injected value with an explicit open
//! lifecycle; repositories borrow it and own all SQL.

mod custom_node_repo;
mod database;
mod execution_repo;
mod schema;
mod template_repo;
mod workflow_repo;

pub use custom_node_repo::CustomNodeRepository;
pub use database::Database;
pub use execution_repo::ExecutionRepository;
pub use template_repo::TemplateRepository;
pub use workflow_repo::{
    SortBy, SortOrder, WorkflowCategory, WorkflowPage, WorkflowQuery, WorkflowRepository,
};
