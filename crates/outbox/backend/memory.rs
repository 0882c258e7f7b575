use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::backend::OutboxBackend;
use crate::error::OutboxError;

#[derive(Default)]
pub struct InMemoryOutboxBackend {
    events: RwLock<BTreeMap<u64, Vec<u8>>>,
    meta: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryOutboxBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutboxBackend for InMemoryOutboxBackend {
    fn get_event(&self, seq: u64) -> Result<Option<Vec<u8>>, OutboxError> {
        Ok(self.events.read().expect("lock").get(&seq).cloned())
    }

    fn put_event_and_advance(&self, seq: u64, blob: Vec<u8>, _next_seq: u64) -> Result<(), OutboxError> {
        self.events.write().expect("lock").insert(seq, blob);
        Ok(())
    }

    fn delete_range(&self, from: u64, to_exclusive: u64) -> Result<(), OutboxError> {
        let mut events = self.events.write().expect("lock");
        let keys: Vec<u64> = events.range(from..to_exclusive).map(|(k, _)| *k).collect();
        for k in keys {
            events.remove(&k);
        }
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, OutboxError> {
        Ok(self.meta.read().expect("lock").get(key).cloned())
    }

    fn put_meta(&self, key: &str, value: Vec<u8>) -> Result<(), OutboxError> {
        self.meta.write().expect("lock").insert(key.to_string(), value);
        Ok(())
    }
}
