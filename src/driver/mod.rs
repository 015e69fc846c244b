// Storage driver capability traits

use crate::error::Result;
use crate::node::{Node, NodeId, NodePosition, Visit};
use serde_json::Value;

pub mod fs;

/// A transaction-scoped view of the database's node tree.
///
/// Handles are produced by [`Driver::create_transaction`] and handed to
/// transaction callbacks. The transaction queue guarantees that no two
/// handles are ever live at the same time, so implementations need no
/// locking of their own against concurrent transactions.
pub trait TransactionHandle {
    /// Visit every node in pre-order, passing its depth and sibling
    /// order. The visitor may return [`Visit::Skip`] to prune a subtree.
    fn each_node(&self, visitor: &mut dyn FnMut(&Node, NodePosition) -> Visit);

    /// Read the JSON document stored at a file node.
    fn read(&self, id: NodeId) -> Result<Value>;

    /// Create or overwrite the JSON file `name` under the directory node
    /// `parent`. Returns the file's node id.
    fn write(&mut self, parent: NodeId, name: &str, document: &Value) -> Result<NodeId>;

    /// Delete a file node, or a directory node with its entire subtree.
    /// The root cannot be removed.
    fn remove(&mut self, id: NodeId) -> Result<()>;
}

/// Capability contract for the storage layer that owns all file-system
/// I/O and the in-memory node tree.
pub trait Driver: Send + Sync {
    /// Prepare the underlying storage for access.
    fn open(&self) -> Result<()>;

    /// Release underlying resources.
    fn close(&self) -> Result<()>;

    /// Produce a handle scoped to one transaction.
    fn create_transaction(&self) -> Box<dyn TransactionHandle + '_>;
}
