use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::codec::{Frame, ProtocolError};
use crate::packets::{Disconnect, Packet};

/// The inbound side of a session, up to the point where relaying starts.
pub struct ClientConnection<S> {
    stream: S,
    peer_addr: SocketAddr,
    read_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ClientConnection<S> {
    pub fn new(stream: S, peer_addr: SocketAddr, read_timeout: Duration) -> Self {
        ClientConnection {
            stream,
            peer_addr,
            read_timeout,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Next frame, or `None` if the client closed between frames.
    pub async fn next_frame_with_timeout(&mut self) -> Result<Option<Frame>, ProtocolError> {
        match tokio::time::timeout(self.read_timeout, Frame::try_read_from(&mut self.stream)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "client read timed out",
            ))),
        }
    }

    /// Reads one frame and decodes it as `P`, keeping the raw frame so it
    /// can be forwarded untouched.
    pub async fn read_packet_with_timeout<P: Packet>(
        &mut self,
    ) -> Result<(P, Frame), ProtocolError> {
        let frame = match self.next_frame_with_timeout().await? {
            Some(frame) => frame,
            None => {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "client closed before sending a packet",
                )))
            }
        };
        let packet = P::from_frame(&frame)?;
        Ok((packet, frame))
    }

    pub async fn write_packet<P: Packet>(&mut self, packet: &P) -> Result<(), ProtocolError> {
        packet.to_frame().write_to(&mut self.stream).await
    }

    /// Sends a login disconnect with `reason` and closes our write side.
    pub async fn disconnect(&mut self, reason: &str) -> Result<(), ProtocolError> {
        self.write_packet(&Disconnect::text(reason)).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packets::{Handshake, LoginStart};
    use tokio::io::duplex;
    use uuid::Uuid;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_read_packet_keeps_raw_frame() {
        let (mut remote, local) = duplex(256);
        let mut client = ClientConnection::new(local, peer(), Duration::from_secs(1));

        let login = LoginStart {
            name: "Steve".to_string(),
            id: Uuid::nil(),
        };
        login.to_frame().write_to(&mut remote).await.unwrap();

        let (decoded, frame) = client.read_packet_with_timeout::<LoginStart>().await.unwrap();
        assert_eq!(decoded, login);
        assert_eq!(frame, login.to_frame());
    }

    #[tokio::test]
    async fn test_read_times_out() {
        let (_remote, local) = duplex(256);
        let mut client = ClientConnection::new(local, peer(), Duration::from_millis(20));

        match client.read_packet_with_timeout::<Handshake>().await {
            Err(ProtocolError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_data_stays_typed() {
        let (mut remote, local) = duplex(256);
        let mut client = ClientConnection::new(local, peer(), Duration::from_secs(1));
        tokio::io::AsyncWriteExt::write_all(&mut remote, &[0xff; 6])
            .await
            .unwrap();

        assert!(matches!(
            client.read_packet_with_timeout::<Handshake>().await,
            Err(ProtocolError::MalformedVarInt)
        ));
    }

    #[tokio::test]
    async fn test_closed_before_packet() {
        let (remote, local) = duplex(256);
        drop(remote);
        let mut client = ClientConnection::new(local, peer(), Duration::from_secs(1));

        match client.read_packet_with_timeout::<Handshake>().await {
            Err(err) => assert!(err.is_disconnect()),
            Ok(packet) => panic!("Expected disconnect, got {:?}", packet),
        }
    }

    #[tokio::test]
    async fn test_disconnect_writes_reason() {
        let (mut remote, local) = duplex(256);
        let mut client = ClientConnection::new(local, peer(), Duration::from_secs(1));
        client.disconnect("go away").await.unwrap();

        let frame = Frame::read_from(&mut remote).await.unwrap();
        let disconnect = Disconnect::from_frame(&frame).unwrap();
        assert!(disconnect.reason.contains("go away"));
        assert!(Frame::try_read_from(&mut remote).await.unwrap().is_none());
    }
}
