// File-system driver - scans the root directory into a node tree and
// serves JSON document I/O through transaction handles.

use crate::driver::{Driver, TransactionHandle};
use crate::error::{ArborDbError, Result};
use crate::node::{Node, NodeId, NodePosition, NodeTree, Visit};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Storage driver over a real directory tree of JSON files.
///
/// `open()` scans the root into an arena-backed [`NodeTree`]. Children
/// are enumerated in name order, so traversal order is stable across
/// platforms and re-scans. The lock below makes the driver `Sync`; it is
/// not what serializes transactions (the queue is).
pub struct FsDriver {
    root: PathBuf,
    tree: RwLock<Option<NodeTree>>,
}

impl FsDriver {
    pub fn new(root: &Path) -> Self {
        FsDriver {
            root: root.to_path_buf(),
            tree: RwLock::new(None),
        }
    }

    fn scan(&self) -> Result<NodeTree> {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        let mut tree = NodeTree::new(&name, &self.root);
        scan_into(&mut tree, NodeTree::ROOT, &self.root)?;
        Ok(tree)
    }
}

/// List `dir` in name order and insert its entries under `parent`,
/// recursing into subdirectories.
fn scan_into(tree: &mut NodeTree, parent: NodeId, dir: &Path) -> Result<()> {
    let mut entries: Vec<(String, PathBuf, bool)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type()?.is_dir();
        entries.push((name, entry.path(), is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path, is_dir) in entries {
        let id = match tree.insert(parent, &name, &path, is_dir) {
            Some(id) => id,
            None => continue,
        };
        if is_dir {
            scan_into(tree, id, &path)?;
        }
    }
    Ok(())
}

impl Driver for FsDriver {
    fn open(&self) -> Result<()> {
        let tree = self.scan()?;
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = Some(tree);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn create_transaction(&self) -> Box<dyn TransactionHandle + '_> {
        Box::new(FsTransaction { driver: self })
    }
}

/// One transaction's view of the driver's tree.
struct FsTransaction<'a> {
    driver: &'a FsDriver,
}

impl FsTransaction<'_> {
    fn with_tree<R>(&self, op: impl FnOnce(&NodeTree) -> Result<R>) -> Result<R> {
        let guard = self
            .driver
            .tree
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tree) => op(tree),
            None => Err(ArborDbError::Closed),
        }
    }

    fn with_tree_mut<R>(&self, op: impl FnOnce(&mut NodeTree) -> Result<R>) -> Result<R> {
        let mut guard = self
            .driver
            .tree
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(tree) => op(tree),
            None => Err(ArborDbError::Closed),
        }
    }
}

impl TransactionHandle for FsTransaction<'_> {
    fn each_node(&self, visitor: &mut dyn FnMut(&Node, NodePosition) -> Visit) {
        let guard = self
            .driver
            .tree
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(tree) = guard.as_ref() {
            tree.each_node(|node, pos| visitor(node, pos));
        }
    }

    fn read(&self, id: NodeId) -> Result<Value> {
        let path = self.with_tree(|tree| {
            let node = tree.get(id).ok_or(ArborDbError::NodeNotFound(id))?;
            if node.is_dir {
                return Err(ArborDbError::NotAFile(node.path.clone()));
            }
            Ok(node.path.clone())
        })?;
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&mut self, parent: NodeId, name: &str, document: &Value) -> Result<NodeId> {
        self.with_tree_mut(|tree| {
            let (dir_path, existing) = {
                let dir = tree.get(parent).ok_or(ArborDbError::NodeNotFound(parent))?;
                if !dir.is_dir {
                    return Err(ArborDbError::NotADirectory(dir.path.clone()));
                }
                let existing = dir
                    .children()
                    .iter()
                    .copied()
                    .find(|&child| tree.get(child).is_some_and(|n| n.name == name));
                (dir.path.clone(), existing)
            };

            let path = dir_path.join(name);
            if let Some(id) = existing {
                if tree.get(id).is_some_and(|n| n.is_dir) {
                    return Err(ArborDbError::NotAFile(path));
                }
            }

            let text = serde_json::to_string_pretty(document)?;
            fs::write(&path, text)?;

            match existing {
                Some(id) => Ok(id),
                None => {
                    let id = tree
                        .insert(parent, name, &path, false)
                        .ok_or(ArborDbError::NodeNotFound(parent))?;
                    tree.sort_children_by_name(parent);
                    Ok(id)
                }
            }
        })
    }

    fn remove(&mut self, id: NodeId) -> Result<()> {
        self.with_tree_mut(|tree| {
            if id == NodeTree::ROOT {
                return Err(ArborDbError::RootRemoval);
            }
            let (path, is_dir) = {
                let node = tree.get(id).ok_or(ArborDbError::NodeNotFound(id))?;
                (node.path.clone(), node.is_dir)
            };
            if is_dir {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            tree.remove(id);
            Ok(())
        })
    }
}
