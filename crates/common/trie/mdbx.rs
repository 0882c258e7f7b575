//! Path-scheme on-disk `TrieDB` (spec.md §4.F), mirroring `ethrex-trie`'s
//! own `libmdbx`-backed node store: one table keyed by the path's db-key
//! encoding, node bytes as the value, no hash-keyed secondary index.

use std::path::Path;
use std::sync::Arc;

use libmdbx::orm::{table, Database};
use libmdbx::table_info;

use crate::db::TrieDB;
use crate::error::TrieError;
use crate::path::NodePath;

table!(
    /// path db-key -> encoded node
    ( Nodes ) Vec<u8> => Vec<u8>
);

pub struct MdbxTrieDB {
    db: Arc<Database>,
}

impl MdbxTrieDB {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrieError> {
        let tables = [table_info!(Nodes)].into_iter().collect();
        let db = Database::create(Some(path.as_ref().to_path_buf()), &tables)
            .map_err(|e| TrieError::DbError(e.to_string()))?;
        Ok(MdbxTrieDB { db: Arc::new(db) })
    }
}

impl TrieDB for MdbxTrieDB {
    fn get_node(&self, path: &NodePath) -> Result<Option<Vec<u8>>, TrieError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| TrieError::DbError(e.to_string()))?;
        txn.get::<Nodes>(path.to_db_key())
            .map_err(|e| TrieError::DbError(e.to_string()))
    }

    fn put_node(&self, path: &NodePath, encoded: Vec<u8>) -> Result<(), TrieError> {
        let txn = self
            .db
            .begin_readwrite()
            .map_err(|e| TrieError::DbError(e.to_string()))?;
        txn.upsert::<Nodes>(path.to_db_key(), encoded)
            .map_err(|e| TrieError::DbError(e.to_string()))?;
        txn.commit().map_err(|e| TrieError::DbError(e.to_string()))
    }

    fn delete_node(&self, path: &NodePath) -> Result<(), TrieError> {
        let txn = self
            .db
            .begin_readwrite()
            .map_err(|e| TrieError::DbError(e.to_string()))?;
        txn.delete::<Nodes>(path.to_db_key(), None)
            .map_err(|e| TrieError::DbError(e.to_string()))?;
        txn.commit().map_err(|e| TrieError::DbError(e.to_string()))
    }
}
