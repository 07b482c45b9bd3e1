//! Local answers to server-list pings. No backend is ever contacted.

use std::fs;
use std::io;
use std::path::Path;

use base64::Engine as _;
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::cfg::Players;
use crate::client::ClientConnection;
use crate::codec::ProtocolError;
use crate::packets::{
    Handshake, Packet, PlayerSample, Ping, Pong, StatusPlayers, StatusRequest, StatusResponse,
    StatusVersion,
};
use crate::player;
use crate::ProxyInfo;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Server icon as a `data:` URI, ready to drop into a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favicon(String);

impl Favicon {
    pub fn from_png(bytes: &[u8]) -> Self {
        Favicon(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ))
    }

    /// Loads a PNG icon. Anything that is not a readable PNG file means no
    /// icon, with a warning.
    pub fn load(path: &Path) -> Option<Self> {
        if !path.is_file() {
            warn!("Favicon {} is not a file, serving none", path.display());
            return None;
        }
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Could not read favicon {}: {}", path.display(), err);
                return None;
            }
        };
        if !bytes.starts_with(PNG_SIGNATURE) {
            warn!("Favicon {} is not a PNG, serving none", path.display());
            return None;
        }
        Some(Favicon::from_png(&bytes))
    }

    pub fn data_uri(&self) -> &str {
        &self.0
    }
}

pub async fn build_status(proxy_info: &ProxyInfo, protocol_version: i32) -> StatusResponse {
    let status = &proxy_info.config.status;
    let players = player::current_players(proxy_info).await;

    let (max, online) = match &status.players {
        Players::Incremental => (players + 1, players),
        Players::Static {
            max_players,
            online_players,
        } => (*max_players, *online_players),
        Players::Capped { max_players } => (*max_players, players),
    };

    StatusResponse {
        version: StatusVersion {
            name: status.version_name.clone(),
            protocol: protocol_version,
        },
        players: StatusPlayers {
            max,
            online,
            sample: vec![PlayerSample {
                name: status.version_name.clone(),
                id: Uuid::nil().to_string(),
            }],
        },
        description: status.motd.clone(),
        favicon: proxy_info
            .favicon
            .as_ref()
            .map(|favicon| favicon.data_uri().to_string()),
    }
}

/// Serves status requests and pings until the client closes or stays quiet
/// for a whole read deadline.
///
/// Returns how many frames were answered. Unknown packet ids are skipped.
pub async fn respond_status<S: AsyncRead + AsyncWrite + Unpin>(
    proxy_info: &ProxyInfo,
    client: &mut ClientConnection<S>,
    handshake: &Handshake,
) -> anyhow::Result<u32> {
    let mut answered = 0;
    loop {
        let frame = match client.next_frame_with_timeout().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            // A pinger that just stops talking is done, not broken.
            Err(ProtocolError::Io(err)) if err.kind() == io::ErrorKind::TimedOut => {
                debug!("{} went quiet after {} status replies", client.peer_addr(), answered);
                break;
            }
            Err(err) => return Err(err.into()),
        };
        match frame.id {
            StatusRequest::ID => {
                let status = build_status(proxy_info, handshake.protocol_version).await;
                client.write_packet(&status.to_packet()?).await?;
                answered += 1;
            }
            Ping::ID => {
                let ping = Ping::from_frame(&frame)?;
                client
                    .write_packet(&Pong {
                        payload: ping.payload,
                    })
                    .await?;
                answered += 1;
            }
            other => debug!(
                "Ignoring status packet {:#04x} from {}",
                other,
                client.peer_addr()
            ),
        }
    }
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::ProxyConfig;
    use crate::codec::Frame;
    use crate::packets::{NextState, StatusResponsePacket};
    use crate::registry::RoutingRegistry;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::duplex;

    fn proxy_info(players: Players, favicon: Option<Favicon>) -> ProxyInfo {
        let mut config = ProxyConfig::default();
        config.status.motd = "A proxy".to_string();
        config.status.players = players;
        ProxyInfo::new(config, Arc::new(RoutingRegistry::new()), favicon)
    }

    fn status_handshake() -> Handshake {
        Handshake {
            protocol_version: 763,
            server_address: "localhost".to_string(),
            server_port: 25565,
            next_state: NextState::Status,
        }
    }

    #[test]
    fn test_favicon_data_uri() {
        let favicon = Favicon::from_png(&[0x89, b'P', b'N', b'G']);
        assert_eq!(favicon.data_uri(), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_missing_favicon_file() {
        assert!(Favicon::load(Path::new("/nonexistent/server-icon.png")).is_none());
    }

    #[test]
    fn test_favicon_path_is_a_directory() {
        assert!(Favicon::load(&std::env::temp_dir()).is_none());
    }

    #[test]
    fn test_load_favicon_file() {
        let dir = std::env::temp_dir();
        let png = dir.join(format!("transfer-proxy-icon-{}.png", std::process::id()));
        let text = dir.join(format!("transfer-proxy-icon-{}.txt", std::process::id()));
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(b"rest of the image");
        fs::write(&png, &bytes).unwrap();
        fs::write(&text, b"not an image").unwrap();

        assert_eq!(Favicon::load(&png), Some(Favicon::from_png(&bytes)));
        assert!(Favicon::load(&text).is_none());

        fs::remove_file(&png).unwrap();
        fs::remove_file(&text).unwrap();
    }

    #[tokio::test]
    async fn test_build_status_static_players() {
        let info = proxy_info(
            Players::Static {
                max_players: 100,
                online_players: 42,
            },
            Some(Favicon::from_png(b"png")),
        );
        let status = build_status(&info, 763).await;
        assert_eq!(status.version.protocol, 763);
        assert_eq!(status.players.max, 100);
        assert_eq!(status.players.online, 42);
        assert_eq!(status.players.sample.len(), 1);
        assert_eq!(status.description, "A proxy");
        assert!(status
            .favicon
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_build_status_counts_players() {
        let info = proxy_info(Players::Incremental, None);
        player::try_join(&info).await;
        player::try_join(&info).await;
        let status = build_status(&info, 763).await;
        assert_eq!((status.players.max, status.players.online), (3, 2));
        assert_eq!(status.favicon, None);
    }

    #[tokio::test]
    async fn test_status_then_ping_then_close() {
        let info = proxy_info(Players::Incremental, None);
        let (mut remote, local) = duplex(4096);
        let mut client = ClientConnection::new(
            local,
            "127.0.0.1:40000".parse().unwrap(),
            Duration::from_secs(1),
        );

        StatusRequest.to_frame().write_to(&mut remote).await.unwrap();
        Frame::new(0x05, vec![1, 2, 3])
            .write_to(&mut remote)
            .await
            .unwrap();
        Ping { payload: 1234 }
            .to_frame()
            .write_to(&mut remote)
            .await
            .unwrap();

        let server = tokio::spawn(async move {
            respond_status(&info, &mut client, &status_handshake()).await
        });

        let response = Frame::read_from(&mut remote).await.unwrap();
        let status = StatusResponse::from_packet(
            &StatusResponsePacket::from_frame(&response).unwrap(),
        )
        .unwrap();
        assert_eq!(status.description, "A proxy");

        let pong = Pong::from_frame(&Frame::read_from(&mut remote).await.unwrap()).unwrap();
        assert_eq!(pong.payload, 1234);

        drop(remote);
        assert_eq!(server.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_quiet_status_client_ends_cleanly() {
        let info = proxy_info(Players::Incremental, None);
        let (mut remote, local) = duplex(4096);
        let mut client = ClientConnection::new(
            local,
            "127.0.0.1:40001".parse().unwrap(),
            Duration::from_millis(50),
        );

        Ping { payload: 9 }
            .to_frame()
            .write_to(&mut remote)
            .await
            .unwrap();
        // `remote` stays open and silent until the read deadline passes.
        let answered = respond_status(&info, &mut client, &status_handshake())
            .await
            .unwrap();
        assert_eq!(answered, 1);

        let pong = Pong::from_frame(&Frame::read_from(&mut remote).await.unwrap()).unwrap();
        assert_eq!(pong.payload, 9);
    }
}
