pub mod error;
pub mod config;
pub mod node;
pub mod validation;
pub mod driver;
pub mod queue;
pub mod database;

pub use config::Config;
pub use database::{Database, TreeStats};
pub use driver::fs::FsDriver;
pub use driver::{Driver, TransactionHandle};
pub use error::{ArborDbError, Result};
pub use node::{Node, NodeId, NodePosition, NodeTree, Visit};
pub use queue::TransactionReceipt;
pub use validation::{FieldSpec, FieldType, Schema, ValidationResult};
