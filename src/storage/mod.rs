//! Durable storage for the whitelist and blacklist.
//!
//! The access list cache writes through a [`NetworkStore`] before updating
//! itself, and loads its initial contents from it at startup.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::access::ListKind;
use crate::error::Result;

/// Persistence for canonical CIDR strings, one set per list.
#[async_trait]
pub trait NetworkStore: Send + Sync {
    /// Persist a network. Storing a network twice in the same list is an error.
    async fn insert(&self, list: ListKind, network: &str) -> Result<()>;

    /// Remove a network. Removing an absent network succeeds.
    async fn delete(&self, list: ListKind, network: &str) -> Result<()>;

    /// All networks of a list.
    async fn networks(&self, list: ListKind) -> Result<Vec<String>>;
}
