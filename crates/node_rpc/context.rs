use std::sync::Arc;

use ubt_emitter::Emitter;
use ubt_outbox::Outbox;

#[derive(Clone)]
pub struct RpcApiContext {
    pub outbox: Arc<Outbox>,
    pub emitter: Arc<Emitter>,
}
