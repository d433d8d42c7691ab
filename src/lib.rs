//! Bruteguard - Brute-force Protection Service
//!
//! This crate decides whether a login attempt, identified by source IP,
//! login and password, may proceed. It combines a static whitelist/blacklist
//! of networks with per-key rate limits on each of the three dimensions, and
//! exposes the decision over gRPC.

pub mod access;
pub mod config;
pub mod engine;
pub mod error;
pub mod grpc;
pub mod ratelimit;
pub mod storage;
