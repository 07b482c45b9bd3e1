//! Accept loop and per-connection dispatch on the handshake's next state.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::backend::BackendAddress;
use crate::client::ClientConnection;
use crate::codec::ProtocolError;
use crate::forward::{forward_login, forward_transfer, refuse};
use crate::packets::{Handshake, NextState};
use crate::player::{self, ClientInfo, PLAYER_LIMIT_REASON};
use crate::relay::RelayStats;
use crate::status::respond_status;
use crate::ProxyInfo;

/// How a session ended when it ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A status exchange; `responses` frames were answered.
    Status { responses: u32 },
    Relayed {
        player: ClientInfo,
        backend: BackendAddress,
        stats: RelayStats,
    },
    /// The client was told to go away and nothing was dialed.
    Refused(RefusalReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefusalReason {
    UnknownAddress,
    Unverified { username: String },
    PlayerLimit,
}

pub struct Listener {
    listener: TcpListener,
    proxy_info: Arc<ProxyInfo>,
    conn_semaphore: Arc<Semaphore>,
}

impl Listener {
    pub async fn bind(proxy_info: Arc<ProxyInfo>) -> io::Result<Self> {
        let listener = TcpListener::bind(&proxy_info.config.bind).await?;
        info!(
            "Listening on {} (max {} connections)",
            listener.local_addr()?,
            proxy_info.config.max_connections
        );
        Ok(Listener {
            conn_semaphore: Arc::new(Semaphore::new(proxy_info.config.max_connections)),
            listener,
            proxy_info,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts forever. Each connection runs in its own task, so dropping the
    /// future returned here stops accepting without touching live sessions.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let permit = match self.conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("Dropping {}: max connections reached", peer_addr);
                            continue;
                        }
                    };
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!("Could not set nodelay for {}: {}", peer_addr, err);
                    }

                    let proxy_info = Arc::clone(&self.proxy_info);
                    tokio::spawn(async move {
                        match handle_connection(&proxy_info, stream, peer_addr).await {
                            Ok(outcome) => debug!("{} finished: {:?}", peer_addr, outcome),
                            Err(err) if is_expected(&err) => {
                                debug!("{} went away: {:#}", peer_addr, err)
                            }
                            Err(err) => warn!("Session for {} failed: {:#}", peer_addr, err),
                        }
                        drop(permit);
                    });
                }
                Err(err) => {
                    error!("Accept failed: {}", err);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Runs one session from handshake to close.
pub async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin>(
    proxy_info: &ProxyInfo,
    stream: S,
    peer_addr: SocketAddr,
) -> anyhow::Result<SessionOutcome> {
    let mut client =
        ClientConnection::new(stream, peer_addr, proxy_info.config.timeouts.handshake());
    let (handshake, _) = client.read_packet_with_timeout::<Handshake>().await?;
    debug!(
        "{} handshake: protocol {}, {}:{}, {:?}",
        peer_addr,
        handshake.protocol_version,
        handshake.server_address,
        handshake.server_port,
        handshake.next_state
    );

    match handshake.next_state {
        NextState::Status => {
            let responses = respond_status(proxy_info, &mut client, &handshake).await?;
            Ok(SessionOutcome::Status { responses })
        }
        NextState::Login | NextState::Transfer => {
            if !player::try_join(proxy_info).await {
                let name = refuse(&mut client, PLAYER_LIMIT_REASON).await;
                info!(
                    "Refused {} from {}: player limit reached",
                    name.as_deref().unwrap_or("<no login>"),
                    peer_addr
                );
                return Ok(SessionOutcome::Refused(RefusalReason::PlayerLimit));
            }
            let result = if handshake.next_state == NextState::Login {
                forward_login(proxy_info, &mut client, &handshake).await
            } else {
                forward_transfer(proxy_info, &mut client, &handshake).await
            };
            player::leave(proxy_info).await;
            result
        }
    }
}

/// True for errors that just mean the peer went away.
pub fn is_disconnect(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(protocol) = cause.downcast_ref::<ProtocolError>() {
            protocol.is_disconnect()
        } else if let Some(io) = cause.downcast_ref::<io::Error>() {
            crate::codec::is_disconnect_kind(io.kind())
        } else {
            false
        }
    })
}

fn is_expected(err: &anyhow::Error) -> bool {
    is_disconnect(err)
        || matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::UnknownNextState(_))
        )
}
