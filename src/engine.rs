//! The admission decision for an authentication attempt.

use std::sync::Arc;

use ipnet::IpNet;
use tracing::debug;

use crate::access::{parse_ip, AccessLists, ListKind};
use crate::error::Result;
use crate::ratelimit::RateLimiter;

/// Combines the access lists and the rate limiter into one decision.
pub struct Authorizer {
    lists: Arc<AccessLists>,
    limiter: Arc<RateLimiter>,
}

impl Authorizer {
    pub fn new(lists: Arc<AccessLists>, limiter: Arc<RateLimiter>) -> Self {
        Self { lists, limiter }
    }

    /// Decide whether an authentication attempt may proceed.
    ///
    /// A whitelisted IP is admitted and a blacklisted IP denied without
    /// touching the rate limiter; the whitelist is consulted first. Otherwise
    /// the attempt is admitted iff the rate limiter admits it. Callers cannot
    /// tell a blacklist denial from a rate limit denial.
    pub fn allow_authorization(&self, ip: &str, login: &str, password: &str) -> Result<bool> {
        let addr = parse_ip(ip)?;

        if self.lists.whitelist.contains(addr) {
            debug!(%addr, "Admitted by whitelist");
            return Ok(true);
        }
        if self.lists.blacklist.contains(addr) {
            debug!(%addr, "Denied by blacklist");
            return Ok(false);
        }

        // Key the IP dimension on the address the lists matched, so every
        // textual form of one address shares a single bucket.
        Ok(self.limiter.allow(&addr.to_string(), password, login))
    }

    /// Reset the IP bucket of an address, whichever textual form it is given
    /// in. Keys that do not parse as an IP are looked up verbatim.
    pub fn clean_bucket_ip(&self, ip: &str) -> Result<()> {
        match parse_ip(ip) {
            Ok(addr) => self.limiter.clean_bucket_ip(&addr.to_string()),
            Err(_) => self.limiter.clean_bucket_ip(ip),
        }
    }

    pub async fn add_network(&self, list: ListKind, network: IpNet) -> Result<()> {
        self.lists.get(list).add_network(network).await
    }

    pub async fn delete_network(&self, list: ListKind, network: IpNet) -> Result<()> {
        self.lists.get(list).delete_network(network).await
    }

    pub fn networks(&self, list: ListKind) -> Vec<String> {
        self.lists.get(list).items()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}
