//! `libmdbx`-backed outbox storage, mirroring `ethrex-storage`'s
//! `store_db/libmdbx.rs`: one `Database` opened on a datadir, tables
//! declared with `table!`. Reads/writes are synchronous, same as the
//! teacher's own storage calls from async RPC handlers.

use std::path::Path;
use std::sync::Arc;

use libmdbx::orm::{table, Database};
use libmdbx::table_info;

use crate::backend::OutboxBackend;
use crate::error::OutboxError;

table!(
    /// event seq -> encoded envelope blob
    ( Events ) u64 => Vec<u8>
);

table!(
    /// ancillary singleton keys: "ubt-seq", "ubt-lowest", "ubt-usage",
    /// "ubt-anchor-N", "ubt-anchor-count", "ubt-failure-checkpoint"
    ( Meta ) String => Vec<u8>
);

pub struct MdbxOutboxBackend {
    db: Arc<Database>,
}

impl MdbxOutboxBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OutboxError> {
        let tables = [table_info!(Events), table_info!(Meta)].into_iter().collect();
        let db = Database::create(Some(path.as_ref().to_path_buf()), &tables)
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        Ok(MdbxOutboxBackend { db: Arc::new(db) })
    }
}

impl OutboxBackend for MdbxOutboxBackend {
    fn get_event(&self, seq: u64) -> Result<Option<Vec<u8>>, OutboxError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.get::<Events>(seq)
            .map_err(|e| OutboxError::Backend(e.to_string()))
    }

    fn put_event_and_advance(&self, seq: u64, blob: Vec<u8>, next_seq: u64) -> Result<(), OutboxError> {
        let txn = self
            .db
            .begin_readwrite()
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.upsert::<Events>(seq, blob)
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.upsert::<Meta>("ubt-seq".to_string(), next_seq.to_be_bytes().to_vec())
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.commit().map_err(|e| OutboxError::Backend(e.to_string()))
    }

    fn delete_range(&self, from: u64, to_exclusive: u64) -> Result<(), OutboxError> {
        let txn = self
            .db
            .begin_readwrite()
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        for seq in from..to_exclusive {
            txn.delete::<Events>(seq, None)
                .map_err(|e| OutboxError::Backend(e.to_string()))?;
        }
        txn.commit().map_err(|e| OutboxError::Backend(e.to_string()))
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, OutboxError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.get::<Meta>(key.to_string())
            .map_err(|e| OutboxError::Backend(e.to_string()))
    }

    fn put_meta(&self, key: &str, value: Vec<u8>) -> Result<(), OutboxError> {
        let txn = self
            .db
            .begin_readwrite()
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.upsert::<Meta>(key.to_string(), value)
            .map_err(|e| OutboxError::Backend(e.to_string()))?;
        txn.commit().map_err(|e| OutboxError::Backend(e.to_string()))
    }
}
