//! The trie's storage backend seam (spec.md §4.F "path-scheme trie
//! backend"). Nodes are keyed by [`NodePath`], not by hash, so that witness
//! collection and path-indexed commit labeling (spec.md §4.B `Commit`) can
//! report which paths changed rather than only which hashes appeared.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::TrieError;
use crate::path::NodePath;

/// Read/write access to encoded trie nodes, addressed by path.
pub trait TrieDB: Send + Sync {
    fn get_node(&self, path: &NodePath) -> Result<Option<Vec<u8>>, TrieError>;
    fn put_node(&self, path: &NodePath, encoded: Vec<u8>) -> Result<(), TrieError>;
    fn delete_node(&self, path: &NodePath) -> Result<(), TrieError>;
}

/// A plain in-memory backend, used by tests and by the applier before its
/// first on-disk commit.
#[derive(Default)]
pub struct InMemoryTrieDB {
    nodes: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryTrieDB {
    pub fn new() -> Self {
        InMemoryTrieDB {
            nodes: RwLock::new(HashMap::new()),
        }
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get_node(&self, path: &NodePath) -> Result<Option<Vec<u8>>, TrieError> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| TrieError::DbError("poisoned lock".to_string()))?;
        Ok(nodes.get(&path.to_db_key()).cloned())
    }

    fn put_node(&self, path: &NodePath, encoded: Vec<u8>) -> Result<(), TrieError> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| TrieError::DbError("poisoned lock".to_string()))?;
        nodes.insert(path.to_db_key(), encoded);
        Ok(())
    }

    fn delete_node(&self, path: &NodePath) -> Result<(), TrieError> {
        let mut nodes = self
            .nodes
            .write()
            .map_err(|_| TrieError::DbError("poisoned lock".to_string()))?;
        nodes.remove(&path.to_db_key());
        Ok(())
    }
}

/// Wraps a backend and records every node read into a witness map, keyed by
/// the same path encoding used on disk (spec.md §4.B `Witness`).
pub struct WitnessTracer<'a> {
    inner: &'a dyn TrieDB,
    touched: RefCell<HashMap<Vec<u8>, Vec<u8>>>,
}

impl<'a> WitnessTracer<'a> {
    pub fn new(inner: &'a dyn TrieDB) -> Self {
        WitnessTracer {
            inner,
            touched: RefCell::new(HashMap::new()),
        }
    }

    pub fn into_witness(self) -> HashMap<Vec<u8>, Vec<u8>> {
        self.touched.into_inner()
    }
}

impl TrieDB for WitnessTracer<'_> {
    fn get_node(&self, path: &NodePath) -> Result<Option<Vec<u8>>, TrieError> {
        let result = self.inner.get_node(path)?;
        if let Some(bytes) = &result {
            self.touched
                .borrow_mut()
                .insert(path.to_db_key(), bytes.clone());
        }
        Ok(result)
    }

    fn put_node(&self, path: &NodePath, encoded: Vec<u8>) -> Result<(), TrieError> {
        self.inner.put_node(path, encoded)
    }

    fn delete_node(&self, path: &NodePath) -> Result<(), TrieError> {
        self.inner.delete_node(path)
    }
}
