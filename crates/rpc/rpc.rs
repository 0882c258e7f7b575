//! Query RPC (spec.md §4.H): `ubt_getBalance`/`ubt_getNonce`/`ubt_getCode`/
//! `ubt_getStorageAt`/`ubt_getAccountProof`/`ubt_getProof`/`ubt_status`,
//! served over HTTP against the applier's trie at a resolved `blockRef`.

pub mod context;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use context::RpcApiContext;
pub use error::RpcErr;
pub use server::start_api;
