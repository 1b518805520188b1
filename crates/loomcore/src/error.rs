use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoomError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("name already in use: {0}")]
    NameCollision(String),

    #[error("unsupported envelope format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoomError {
    /// Wrap a backend failure as a storage error
    pub fn storage(err: impl std::fmt::Display) -> Self {
        LoomError::Storage(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("connection '{connection}' references missing node '{node}'")]
    MalformedGraph { connection: String, node: String },

    #[error("foreach node '{0}' has no reachable endloop")]
    UnterminatedLoop(String),
}
