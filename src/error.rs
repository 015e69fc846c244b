use crate::node::NodeId;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArborDbError {
    #[error("Database at {} is already open", .0.display())]
    AlreadyOpen(PathBuf),

    #[error("Database is closed")]
    Closed,

    #[error("Transaction panicked: {0}")]
    TransactionPanicked(String),

    #[error("No schema registered under '{0}'")]
    SchemaNotFound(String),

    #[error("No node with id {0}")]
    NodeNotFound(NodeId),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("The database root cannot be removed")]
    RootRemoval,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArborDbError>;
