use std::net::SocketAddr;

use uuid::Uuid;

use crate::cfg::Players;
use crate::packets::{Handshake, LoginStart};
use crate::ProxyInfo;

pub const PLAYER_LIMIT_REASON: &str = "Player limit reached.";

/// Who is on the other end of a forwarded session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    pub protocol_version: i32,
    pub remote_addr: SocketAddr,
    pub name: String,
    pub id: Uuid,
}

impl ClientInfo {
    pub fn new(handshake: &Handshake, login: &LoginStart, remote_addr: SocketAddr) -> Self {
        ClientInfo {
            protocol_version: handshake.protocol_version,
            remote_addr,
            name: login.name.clone(),
            id: login.id,
        }
    }
}

/// Takes a player slot. Fails only when the player mode is capped and full.
pub async fn try_join(proxy_info: &ProxyInfo) -> bool {
    let mut data_write = proxy_info.mut_data.write().await;
    if let Players::Capped { max_players } = proxy_info.config.status.players {
        if data_write.current_players >= max_players {
            return false;
        }
    }
    data_write.current_players += 1;
    true
}

pub async fn leave(proxy_info: &ProxyInfo) {
    let mut data_write = proxy_info.mut_data.write().await;
    data_write.current_players -= 1;
}

pub async fn current_players(proxy_info: &ProxyInfo) -> i32 {
    proxy_info.mut_data.read().await.current_players
}
