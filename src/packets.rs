//! Typed views over the packets the proxy understands.
//!
//! Every packet decodes from a [`Frame`] whose id must match the packet's id
//! for its phase. Fields are scanned in a fixed order; bytes after the last
//! known field are left alone so a forwarded frame stays byte-identical.

use bytes::{BufMut, Bytes, BytesMut};
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{self, Frame, ProtocolError};

pub trait Packet: Sized {
    const ID: i32;

    fn encode_payload(&self, buf: &mut BytesMut);

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError>;

    fn to_frame(&self) -> Frame {
        let mut buf = BytesMut::new();
        self.encode_payload(&mut buf);
        Frame::new(Self::ID, buf.freeze())
    }

    fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.id != Self::ID {
            return Err(ProtocolError::UnexpectedPacket {
                expected: Self::ID,
                got: frame.id,
            });
        }
        let mut payload = frame.payload.clone();
        Self::decode_payload(&mut payload)
    }
}

/// Phase the client asks for in its handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    Status,
    Login,
    Transfer,
}

impl TryFrom<i32> for NextState {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(NextState::Status),
            2 => Ok(NextState::Login),
            3 => Ok(NextState::Transfer),
            other => Err(ProtocolError::UnknownNextState(other)),
        }
    }
}

impl From<NextState> for i32 {
    fn from(state: NextState) -> Self {
        match state {
            NextState::Status => 1,
            NextState::Login => 2,
            NextState::Transfer => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: NextState,
}

impl Handshake {
    /// The same handshake pointed at another server, always asking to log in.
    pub fn redirected(&self, host: &str, port: u16) -> Handshake {
        Handshake {
            protocol_version: self.protocol_version,
            server_address: host.to_string(),
            server_port: port,
            next_state: NextState::Login,
        }
    }
}

impl Packet for Handshake {
    const ID: i32 = 0x00;

    fn encode_payload(&self, buf: &mut BytesMut) {
        codec::put_var_int(buf, self.protocol_version);
        codec::put_string(buf, &self.server_address);
        buf.put_u16(self.server_port);
        codec::put_var_int(buf, self.next_state.into());
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let protocol_version = codec::get_var_int(buf)?;
        let server_address = codec::get_string(buf)?;
        let server_port = codec::get_u16(buf)?;
        let next_state = NextState::try_from(codec::get_var_int(buf)?)?;
        Ok(Handshake {
            protocol_version,
            server_address,
            server_port,
            next_state,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    pub name: String,
    pub id: Uuid,
}

impl Packet for LoginStart {
    const ID: i32 = 0x00;

    fn encode_payload(&self, buf: &mut BytesMut) {
        codec::put_string(buf, &self.name);
        codec::put_uuid(buf, &self.id);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let name = codec::get_string(buf)?;
        let id = codec::get_uuid(buf)?;
        Ok(LoginStart { name, id })
    }
}

/// Login-phase disconnect. `reason` holds a JSON chat component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: String,
}

impl Disconnect {
    pub fn text(message: &str) -> Disconnect {
        Disconnect {
            reason: serde_json::json!({ "text": message }).to_string(),
        }
    }
}

impl Packet for Disconnect {
    const ID: i32 = 0x00;

    fn encode_payload(&self, buf: &mut BytesMut) {
        codec::put_string(buf, &self.reason);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Disconnect {
            reason: codec::get_string(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRequest;

impl Packet for StatusRequest {
    const ID: i32 = 0x00;

    fn encode_payload(&self, _: &mut BytesMut) {}

    fn decode_payload(_: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(StatusRequest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub payload: i64,
}

impl Packet for Ping {
    const ID: i32 = 0x01;

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_i64(self.payload);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Ping {
            payload: codec::get_i64(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub payload: i64,
}

impl Packet for Pong {
    const ID: i32 = 0x01;

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_i64(self.payload);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Pong {
            payload: codec::get_i64(buf)?,
        })
    }
}

/// The JSON document carried by a status response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusPlayers {
    pub max: i32,
    pub online: i32,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlayerSample {
    pub name: String,
    pub id: String,
}

impl StatusResponse {
    pub fn to_packet(&self) -> Result<StatusResponsePacket, serde_json::Error> {
        Ok(StatusResponsePacket {
            json: serde_json::to_string(self)?,
        })
    }

    pub fn from_packet(packet: &StatusResponsePacket) -> Result<Self, serde_json::Error> {
        serde_json::from_str(&packet.json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponsePacket {
    pub json: String,
}

impl Packet for StatusResponsePacket {
    const ID: i32 = 0x00;

    fn encode_payload(&self, buf: &mut BytesMut) {
        codec::put_string(buf, &self.json);
    }

    fn decode_payload(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(StatusResponsePacket {
            json: codec::get_string(buf)?,
        })
    }
}
