use std::sync::{Arc, RwLock};

use ubt_applier::Applier;

/// Shared read handle into the daemon's applier, the way the teacher's
/// `RpcApiContext` shares `Store`/`Blockchain` handles with its server
/// tasks. The consumer run-loop and this RPC server both hold a clone of
/// the same `Arc<RwLock<Applier>>`; the lock is taken for reads only here
/// (writes happen exclusively on the consumer's thread between commits).
#[derive(Clone)]
pub struct RpcApiContext {
    pub applier: Arc<RwLock<Applier>>,
}
