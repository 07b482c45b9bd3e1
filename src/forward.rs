use anyhow::Context;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::backend::{connect_server_client, BackendAddress};
use crate::client::ClientConnection;
use crate::listener::{RefusalReason, SessionOutcome};
use crate::packets::{Handshake, LoginStart};
use crate::player::ClientInfo;
use crate::registry::RouteLookup;
use crate::relay::relay;
use crate::ProxyInfo;

pub const UNKNOWN_ADDRESS_REASON: &str = "Your address is not recognised by this proxy.";
pub const UNVERIFIED_REASON: &str = "You have not been verified for a transfer.";

/// Forwards a fresh login to the configured default backend.
///
/// The client's address is remembered against the name it logs in with so a
/// later transfer from the same address can be routed.
pub async fn forward_login<S: AsyncRead + AsyncWrite + Unpin>(
    proxy_info: &ProxyInfo,
    client: &mut ClientConnection<S>,
    handshake: &Handshake,
) -> anyhow::Result<SessionOutcome> {
    let backend = proxy_info.config.backend.clone();
    let mut server = connect_server_client(
        &backend,
        handshake,
        proxy_info.config.timeouts.connect(),
    )
    .await
    .with_context(|| format!("failed to reach backend {}", backend))?;

    let (login, raw_login) = client.read_packet_with_timeout::<LoginStart>().await?;
    let peer_addr = client.peer_addr();
    if let Some(previous) = proxy_info
        .registry
        .record_login(peer_addr.ip(), &login.name)
        .await
    {
        if previous != login.name {
            debug!("{} was {}, now {}", peer_addr.ip(), previous, login.name);
        }
    }
    raw_login.write_to(&mut server).await?;

    let player = ClientInfo::new(handshake, &login, peer_addr);
    info!(
        "{} ({}) logged in from {}, forwarding to {}",
        player.name, player.id, peer_addr, backend
    );

    let stats = relay(
        client.get_mut(),
        &mut server,
        proxy_info.config.timeouts.idle(),
    )
    .await
    .with_context(|| format!("relay for {} ended with an error", player.name))?;

    Ok(SessionOutcome::Relayed {
        player,
        backend,
        stats,
    })
}

/// Routes a transfer handshake to the backend verified for the player last
/// seen logging in from this address.
///
/// Nothing is dialed unless both the address and the player are known.
pub async fn forward_transfer<S: AsyncRead + AsyncWrite + Unpin>(
    proxy_info: &ProxyInfo,
    client: &mut ClientConnection<S>,
    handshake: &Handshake,
) -> anyhow::Result<SessionOutcome> {
    let peer_addr = client.peer_addr();
    let (username, backend): (String, BackendAddress) =
        match proxy_info.registry.resolve(peer_addr.ip()).await {
            RouteLookup::Resolved { username, backend } => (username, backend),
            RouteLookup::UnknownAddress => {
                let name = refuse(client, UNKNOWN_ADDRESS_REASON).await;
                info!(
                    "Refused transfer of {} from unknown address {}",
                    name.as_deref().unwrap_or("<no login>"),
                    peer_addr
                );
                return Ok(SessionOutcome::Refused(RefusalReason::UnknownAddress));
            }
            RouteLookup::Unverified { username } => {
                refuse(client, UNVERIFIED_REASON).await;
                info!("Refused transfer of unverified {} from {}", username, peer_addr);
                return Ok(SessionOutcome::Refused(RefusalReason::Unverified { username }));
            }
        };

    let mut server = connect_server_client(
        &backend,
        handshake,
        proxy_info.config.timeouts.connect(),
    )
    .await
    .with_context(|| format!("failed to reach {} for {}", backend, username))?;

    let (login, raw_login) = client.read_packet_with_timeout::<LoginStart>().await?;
    if login.name != username {
        debug!(
            "Transfer from {} logs in as {}, routed as {}",
            peer_addr, login.name, username
        );
    }
    raw_login.write_to(&mut server).await?;

    let player = ClientInfo::new(handshake, &login, peer_addr);
    info!("Transferring {} from {} to {}", player.name, peer_addr, backend);

    let stats = relay(
        client.get_mut(),
        &mut server,
        proxy_info.config.timeouts.idle(),
    )
    .await
    .with_context(|| format!("relay for {} ended with an error", player.name))?;

    Ok(SessionOutcome::Relayed {
        player,
        backend,
        stats,
    })
}

/// Drains the pending login start, then disconnects with `reason`.
///
/// Closing with unread input would reset the connection and could cost the
/// client the disconnect message. Returns the name the client tried to use.
pub(crate) async fn refuse<S: AsyncRead + AsyncWrite + Unpin>(
    client: &mut ClientConnection<S>,
    reason: &str,
) -> Option<String> {
    let name = match client.read_packet_with_timeout::<LoginStart>().await {
        Ok((login, _)) => Some(login.name),
        Err(err) => {
            debug!("No login start from {} before refusal: {}", client.peer_addr(), err);
            None
        }
    };
    if let Err(err) = client.disconnect(reason).await {
        debug!("Could not tell {} why: {}", client.peer_addr(), err);
    }
    name
}
