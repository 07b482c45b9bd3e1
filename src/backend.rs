use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::codec::ProtocolError;
use crate::packets::{Handshake, Packet};

/// A backend server as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address '{0}' has no port")]
    MissingPort(String),
    #[error("invalid port in address '{0}'")]
    InvalidPort(String),
    #[error("address '{0}' has an empty host")]
    EmptyHost(String),
}

impl BackendAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        BackendAddress {
            host: host.into(),
            port,
        }
    }

    pub async fn connect(&self, connect_timeout: Duration) -> io::Result<TcpStream> {
        match tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out", self),
            )),
        }
    }
}

impl FromStr for BackendAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = match s.strip_prefix('[') {
            Some(rest) => rest
                .split_once("]:")
                .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?,
            None => s
                .rsplit_once(':')
                .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?,
        };
        if host.is_empty() {
            return Err(AddressParseError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        Ok(BackendAddress::new(host, port))
    }
}

impl TryFrom<String> for BackendAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendAddress> for String {
    fn from(value: BackendAddress) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Dials `server` and sends the client's handshake rewritten to point at it.
///
/// The returned stream is positioned right after the handshake, so the next
/// thing written must be the client's login start.
pub async fn connect_server_client(
    server: &BackendAddress,
    client_handshake: &Handshake,
    connect_timeout: Duration,
) -> Result<TcpStream, ProtocolError> {
    let mut connection = server.connect(connect_timeout).await?;
    connection.set_nodelay(true)?;

    let handshake = client_handshake.redirected(&server.host, server.port);
    handshake.to_frame().write_to(&mut connection).await?;
    Ok(connection)
}
