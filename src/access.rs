//! In-memory whitelist and blacklist of networks.
//!
//! Each list caches its networks for lock-light membership tests and writes
//! every change through a [`NetworkStore`] before applying it locally.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{BruteguardError, Result};
use crate::storage::NetworkStore;

/// Which access list a network belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Always admitted
    Whitelist,
    /// Always denied
    Blacklist,
}

impl ListKind {
    /// Table holding this list in SQL stores.
    pub fn table(&self) -> &'static str {
        match self {
            ListKind::Whitelist => "whitelist",
            ListKind::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Parse a CIDR literal, clearing any host bits ("10.0.0.5/24" becomes
/// "10.0.0.0/24").
pub fn parse_network(network: &str) -> Result<IpNet> {
    network
        .trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|e| BruteguardError::InvalidInput(format!("invalid network {:?}: {}", network, e)))
}

/// Parse an IP literal exactly as given; surrounding whitespace is an error.
/// IPv4-mapped IPv6 addresses become IPv4.
pub fn parse_ip(ip: &str) -> Result<IpAddr> {
    ip.parse::<IpAddr>()
        .map(|addr| addr.to_canonical())
        .map_err(|e| BruteguardError::InvalidInput(format!("invalid ip {:?}: {}", ip, e)))
}

/// A write-through cache of one access list.
pub struct AccessList {
    kind: ListKind,
    store: Arc<dyn NetworkStore>,
    networks: RwLock<Vec<IpNet>>,
    /// Serializes writers across the persist-then-cache sequence
    writer: tokio::sync::Mutex<()>,
}

impl AccessList {
    /// Load a list from its store.
    pub async fn load(kind: ListKind, store: Arc<dyn NetworkStore>) -> Result<Self> {
        let networks = store
            .networks(kind)
            .await?
            .iter()
            .map(|network| parse_network(network))
            .collect::<Result<Vec<_>>>()?;

        info!(list = %kind, count = networks.len(), "Loaded access list");

        Ok(Self {
            kind,
            store,
            networks: RwLock::new(networks),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    /// Whether any network in the list contains `ip`.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.read().iter().any(|network| network.contains(&ip))
    }

    /// Persist `network`, then add it to the cache.
    ///
    /// If the store rejects the network the cache is left untouched.
    pub async fn add_network(&self, network: IpNet) -> Result<()> {
        let network = network.trunc();
        let _writer = self.writer.lock().await;

        self.store.insert(self.kind, &network.to_string()).await?;
        self.networks.write().push(network);

        debug!(list = %self.kind, %network, "Added network");
        Ok(())
    }

    /// Remove `network` from the store, then the first matching cache entry.
    ///
    /// Removing a network that is not in the list is not an error.
    pub async fn delete_network(&self, network: IpNet) -> Result<()> {
        let network = network.trunc();
        let _writer = self.writer.lock().await;

        self.store.delete(self.kind, &network.to_string()).await?;
        {
            let mut networks = self.networks.write();
            if let Some(pos) = networks.iter().position(|cached| *cached == network) {
                networks.remove(pos);
            }
        }

        debug!(list = %self.kind, %network, "Deleted network");
        Ok(())
    }

    /// Snapshot of the list in insertion order, as canonical CIDR strings.
    pub fn items(&self) -> Vec<String> {
        self.networks
            .read()
            .iter()
            .map(|network| network.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.networks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.read().is_empty()
    }
}

/// The whitelist and blacklist, loaded from the same store.
pub struct AccessLists {
    pub whitelist: AccessList,
    pub blacklist: AccessList,
}

impl AccessLists {
    pub async fn load(store: Arc<dyn NetworkStore>) -> Result<Self> {
        Ok(Self {
            whitelist: AccessList::load(ListKind::Whitelist, Arc::clone(&store)).await?,
            blacklist: AccessList::load(ListKind::Blacklist, store).await?,
        })
    }

    pub fn get(&self, kind: ListKind) -> &AccessList {
        match kind {
            ListKind::Whitelist => &self.whitelist,
            ListKind::Blacklist => &self.blacklist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    /// A store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl NetworkStore for BrokenStore {
        async fn insert(&self, _list: ListKind, _network: &str) -> Result<()> {
            Err(BruteguardError::Storage("disk on fire".to_string()))
        }

        async fn delete(&self, _list: ListKind, _network: &str) -> Result<()> {
            Err(BruteguardError::Storage("disk on fire".to_string()))
        }

        async fn networks(&self, _list: ListKind) -> Result<Vec<String>> {
            Ok(vec!["10.0.0.0/8".to_string()])
        }
    }

    fn ip(s: &str) -> IpAddr {
        parse_ip(s).unwrap()
    }

    #[test]
    fn test_parse_network_canonicalizes() {
        assert_eq!(parse_network("10.0.0.5/24").unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(parse_network(" 2001:db8::1/32 ").unwrap().to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_parse_invalid_input() {
        assert!(matches!(parse_network("10.0.0.0"), Err(BruteguardError::InvalidInput(_))));
        assert!(matches!(parse_network("10.0.0.0/33"), Err(BruteguardError::InvalidInput(_))));
        assert!(matches!(parse_ip("not-an-ip"), Err(BruteguardError::InvalidInput(_))));
        assert!(matches!(parse_ip(""), Err(BruteguardError::InvalidInput(_))));
        for padded in [" 10.0.0.5", "10.0.0.5 ", "\t10.0.0.5", "10.0.0.5\n"] {
            assert!(matches!(parse_ip(padded), Err(BruteguardError::InvalidInput(_))));
        }
        assert_eq!(ip("::ffff:10.0.0.5"), ip("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_contains() {
        let list = AccessList::load(ListKind::Whitelist, Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        list.add_network(parse_network("10.0.0.0/24").unwrap()).await.unwrap();
        list.add_network(parse_network("2001:db8::/32").unwrap()).await.unwrap();

        assert!(list.contains(ip("10.0.0.5")));
        assert!(list.contains(ip("10.0.0.255")));
        assert!(!list.contains(ip("10.0.1.1")));
        assert!(list.contains(ip("2001:db8::42")));
        assert!(list.contains("::ffff:10.0.0.7".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_write_through_and_reload() {
        let store: Arc<dyn NetworkStore> = Arc::new(MemoryStore::new());
        let list = AccessList::load(ListKind::Blacklist, Arc::clone(&store))
            .await
            .unwrap();

        list.add_network(parse_network("192.168.1.0/24").unwrap()).await.unwrap();
        list.add_network(parse_network("10.0.0.9/8").unwrap()).await.unwrap();
        assert_eq!(list.items(), vec!["192.168.1.0/24", "10.0.0.0/8"]);

        let reloaded = AccessList::load(ListKind::Blacklist, store).await.unwrap();
        assert_eq!(reloaded.items(), list.items());
        assert!(reloaded.contains(ip("10.200.0.1")));
    }

    #[tokio::test]
    async fn test_delete_network() {
        let list = AccessList::load(ListKind::Whitelist, Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let network = parse_network("10.0.0.0/24").unwrap();
        list.add_network(network).await.unwrap();

        list.delete_network(network).await.unwrap();
        assert!(list.is_empty());
        assert!(!list.contains(ip("10.0.0.5")));

        // Absent network is a no-op.
        list.delete_network(network).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_add_leaves_cache_unchanged() {
        let list = AccessList::load(ListKind::Whitelist, Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let network = parse_network("10.0.0.0/24").unwrap();
        list.add_network(network).await.unwrap();

        assert!(list.add_network(network).await.is_err());
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_cache_unchanged() {
        let list = AccessList::load(ListKind::Blacklist, Arc::new(BrokenStore))
            .await
            .unwrap();
        assert_eq!(list.items(), vec!["10.0.0.0/8"]);

        let err = list
            .add_network(parse_network("192.168.0.0/16").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BruteguardError::Storage(_)));
        assert_eq!(list.items(), vec!["10.0.0.0/8"]);

        assert!(list.delete_network(parse_network("10.0.0.0/8").unwrap()).await.is_err());
        assert!(list.contains(ip("10.1.2.3")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writers() {
        let list = Arc::new(
            AccessList::load(ListKind::Whitelist, Arc::new(MemoryStore::new()))
                .await
                .unwrap(),
        );

        let mut tasks = Vec::new();
        for i in 0..32u8 {
            let list = Arc::clone(&list);
            tasks.push(tokio::spawn(async move {
                let network = parse_network(&format!("10.{}.0.0/16", i)).unwrap();
                list.add_network(network).await.unwrap();
                assert!(list.contains(ip(&format!("10.{}.1.1", i))));
            }));
        }
        futures::future::join_all(tasks)
            .await
            .into_iter()
            .for_each(|result| result.unwrap());

        assert_eq!(list.len(), 32);
    }
}
