//! Shared routing state for transfers.
//!
//! Two independent maps:
//! - client IP -> the username last seen logging in from it (written by the
//!   login forwarder)
//! - username -> verified backend (written by the control plane)
//!
//! Every operation touches a single key under a single lock, and no lock is
//! held across an await on I/O. Entries are never expired: an address keeps
//! its username until another login from the same address overwrites it.

use std::collections::HashMap;
use std::net::IpAddr;

use log::debug;
use tokio::sync::RwLock;

use crate::backend::BackendAddress;

/// Result of resolving a client address to a transfer destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup {
    Resolved {
        username: String,
        backend: BackendAddress,
    },
    /// Nobody has logged in from this address.
    UnknownAddress,
    /// The username is known but no backend was verified for it.
    Unverified { username: String },
}

#[derive(Default)]
pub struct RoutingRegistry {
    names: RwLock<HashMap<IpAddr, String>>,
    backends: RwLock<HashMap<String, BackendAddress>>,
}

impl RoutingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `username` for `addr`, returning the name it replaced.
    pub async fn record_login(&self, addr: IpAddr, username: &str) -> Option<String> {
        let addr = addr.to_canonical();
        let previous = self
            .names
            .write()
            .await
            .insert(addr, username.to_string());
        debug!("Recorded {} for address {}", username, addr);
        previous
    }

    pub async fn username_for(&self, addr: IpAddr) -> Option<String> {
        self.names.read().await.get(&addr.to_canonical()).cloned()
    }

    /// Stores the verified backend for `username`; the latest call wins.
    pub async fn verify(&self, username: &str, backend: BackendAddress) -> Option<BackendAddress> {
        debug!("Verified backend {} for {}", backend, username);
        self.backends
            .write()
            .await
            .insert(username.to_string(), backend)
    }

    pub async fn backend_for(&self, username: &str) -> Option<BackendAddress> {
        self.backends.read().await.get(username).cloned()
    }

    pub async fn resolve(&self, addr: IpAddr) -> RouteLookup {
        let username = match self.username_for(addr).await {
            Some(username) => username,
            None => return RouteLookup::UnknownAddress,
        };
        match self.backend_for(&username).await {
            Some(backend) => RouteLookup::Resolved { username, backend },
            None => RouteLookup::Unverified { username },
        }
    }

    pub async fn verified_count(&self) -> usize {
        self.backends.read().await.len()
    }
}
