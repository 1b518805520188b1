use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of node type tags understood by the engine
///
/// The tag set is fixed at compile time; anything outside it is rejected
/// during deserialization, so downstream dispatch can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Start,
    End,
    Python,
    Typescript,
    Http,
    File,
    Condition,
    Database,
    Llm,
    Embedding,
    Foreach,
    Endloop,
    Markdown,
    Html,
    Json,
    Image,
    Ocr,
    Browser,
}

impl NodeType {
    pub const ALL: [NodeType; 18] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Python,
        NodeType::Typescript,
        NodeType::Http,
        NodeType::File,
        NodeType::Condition,
        NodeType::Database,
        NodeType::Llm,
        NodeType::Embedding,
        NodeType::Foreach,
        NodeType::Endloop,
        NodeType::Markdown,
        NodeType::Html,
        NodeType::Json,
        NodeType::Image,
        NodeType::Ocr,
        NodeType::Browser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Python => "python",
            NodeType::Typescript => "typescript",
            NodeType::Http => "http",
            NodeType::File => "file",
            NodeType::Condition => "condition",
            NodeType::Database => "database",
            NodeType::Llm => "llm",
            NodeType::Embedding => "embedding",
            NodeType::Foreach => "foreach",
            NodeType::Endloop => "endloop",
            NodeType::Markdown => "markdown",
            NodeType::Html => "html",
            NodeType::Json => "json",
            NodeType::Image => "image",
            NodeType::Ocr => "ocr",
            NodeType::Browser => "browser",
        }
    }

    /// Catalog category for the node palette
    pub fn category(&self) -> &'static str {
        match self {
            NodeType::Start
            | NodeType::End
            | NodeType::Condition
            | NodeType::Foreach
            | NodeType::Endloop => "flow",
            NodeType::Python | NodeType::Typescript => "code",
            NodeType::Http | NodeType::Browser => "web",
            NodeType::File | NodeType::Database | NodeType::Json => "data",
            NodeType::Llm | NodeType::Embedding | NodeType::Ocr => "ai",
            NodeType::Markdown | NodeType::Html | NodeType::Image => "content",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = UnknownNodeType;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        NodeType::ALL
            .iter()
            .find(|node_type| node_type.as_str() == tag)
            .copied()
            .ok_or_else(|| UnknownNodeType(tag.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNodeType(pub String);

impl fmt::Display for UnknownNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown node type tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownNodeType {}
