
use tokio::io::AsyncReadExt;

use harness::{MockBackend, TestProxy};
use transfer_proxy::cfg::Players;
use transfer_proxy::codec::Frame;
use transfer_proxy::packets::{
    Handshake, NextState, Packet, Ping, Pong, StatusRequest, StatusResponse, StatusResponsePacket,
};

fn status_handshake() -> Handshake {
    Handshake {
        protocol_version: 763,
        server_address: "play.example.com".to_string(),
        server_port: 25565,
        next_state: NextState::Status,
    }
}

#[tokio::test]
async fn test_status_and_ping() {
    let backend = MockBackend::spawn().await.unwrap();
    let proxy = TestProxy::spawn_with(backend.address(), |config| {
        config.status.motd = "Welcome".to_string();
        config.status.players = Players::Static {
            max_players: 50,
            online_players: 7,
        };
    })
    .await
    .unwrap();

    let mut client = proxy.connect().await.unwrap();
    status_handshake()
        .to_frame()
        .write_to(&mut client)
        .await
        .unwrap();
    StatusRequest.to_frame().write_to(&mut client).await.unwrap();

    let frame = Frame::read_from(&mut client).await.unwrap();
    assert_eq!(frame.id, 0);
    let status =
        StatusResponse::from_packet(&StatusResponsePacket::from_frame(&frame).unwrap()).unwrap();
    assert_eq!(status.description, "Welcome");
    assert_eq!(status.version.protocol, 763);
    assert_eq!((status.players.max, status.players.online), (50, 7));

    // Unknown ids are skipped without a reply.
    Frame::new(0x09, vec![0u8; 4])
        .write_to(&mut client)
        .await
        .unwrap();
    Ping {
        payload: 0x0102_0304_0506_0708,
    }
    .to_frame()
    .write_to(&mut client)
    .await
    .unwrap();

    let pong = Pong::from_frame(&Frame::read_from(&mut client).await.unwrap()).unwrap();
    assert_eq!(pong.payload, 0x0102_0304_0506_0708);
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn test_invalid_next_state_closes_without_reply() {
    let backend = MockBackend::spawn().await.unwrap();
    let proxy = TestProxy::spawn(backend.address()).await.unwrap();

    let mut client = proxy.connect().await.unwrap();
    let mut frame = status_handshake().to_frame().encode();
    let last = frame.len() - 1;
    frame[last] = 9;
    tokio::io::AsyncWriteExt::write_all(&mut client, &frame)
        .await
        .unwrap();

    let mut rest = Vec::new();
    let _ = client.read_to_end(&mut rest).await;
    assert!(rest.is_empty());
    assert_eq!(backend.connection_count(), 0);
}
