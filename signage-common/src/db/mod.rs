//! Local database layer
//!
//! SQLite initialization and the key-value table backing the local store.

pub mod init;
pub mod kv;

pub use init::*;
pub use kv::*;
