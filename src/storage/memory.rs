//! Process-local network store.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::NetworkStore;
use crate::access::ListKind;
use crate::error::{BruteguardError, Result};

/// Keeps both lists in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    whitelist: Mutex<Vec<String>>,
    blacklist: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, list: ListKind) -> &Mutex<Vec<String>> {
        match list {
            ListKind::Whitelist => &self.whitelist,
            ListKind::Blacklist => &self.blacklist,
        }
    }
}

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn insert(&self, list: ListKind, network: &str) -> Result<()> {
        let mut networks = self.list(list).lock();
        if networks.iter().any(|stored| stored == network) {
            return Err(BruteguardError::Storage(format!(
                "network {} already in {}",
                network, list
            )));
        }
        networks.push(network.to_string());
        Ok(())
    }

    async fn delete(&self, list: ListKind, network: &str) -> Result<()> {
        self.list(list).lock().retain(|stored| stored != network);
        Ok(())
    }

    async fn networks(&self, list: ListKind) -> Result<Vec<String>> {
        Ok(self.list(list).lock().clone())
    }
}
