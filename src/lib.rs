//! A Minecraft front proxy that answers server-list pings itself, forwards
//! logins to a default backend and routes transfer handshakes to the backend
//! verified for the player behind the connecting address.

use std::sync::Arc;

use tokio::sync::RwLock;

pub mod backend;
pub mod cfg;
pub mod client;
pub mod codec;
pub mod control;
pub mod forward;
pub mod listener;
pub mod packets;
pub mod player;
pub mod registry;
pub mod relay;
pub mod status;

pub use backend::BackendAddress;
pub use cfg::ProxyConfig;
pub use listener::{Listener, RefusalReason, SessionOutcome};
pub use registry::{RouteLookup, RoutingRegistry};
pub use status::Favicon;

pub struct MutableProxyInfo {
    pub current_players: i32,
}

pub type LockedProxyInfo = RwLock<MutableProxyInfo>;

/// State shared by every session of one running proxy.
pub struct ProxyInfo {
    pub mut_data: LockedProxyInfo,
    pub config: ProxyConfig,
    pub registry: Arc<RoutingRegistry>,
    pub favicon: Option<Favicon>,
}

impl ProxyInfo {
    pub fn new(
        config: ProxyConfig,
        registry: Arc<RoutingRegistry>,
        favicon: Option<Favicon>,
    ) -> Self {
        ProxyInfo {
            mut_data: RwLock::new(MutableProxyInfo { current_players: 0 }),
            config,
            registry,
            favicon,
        }
    }
}
