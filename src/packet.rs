//! sentinelmc/src/packet.rs
//! Typed read/write of the five in-scope packets over a duplex byte
//! stream, with raw-frame retention for the two packets that must be
//! replayed verbatim to the upstream server after handoff.

use crate::error::{Error, Result};
use crate::wire::{self, Frame};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

const HANDSHAKE_ID: u8 = 0x00;
const STATUS_REQUEST_ID: u8 = 0x00;
const STATUS_RESPONSE_ID: u8 = 0x00;
const PING_ID: u8 = 0x01;
const LOGIN_START_ID: u8 = 0x00;

fn expect_id(frame: &Frame, expected: u8) -> Result<()> {
    let actual = frame.id()?;
    if actual != expected {
        return Err(Error::Protocol(format!(
            "expected packet id {expected:#04x} but got {actual:#04x}"
        )));
    }
    Ok(())
}

/// The client's Handshake packet, decoded, plus its complete on-wire
/// bytes for later replay to the upstream server.
pub struct Handshake {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
    /// The complete framed packet as received from the client.
    pub raw: Vec<u8>,
}

/// Handshake `NextState` values.
pub const NEXT_STATE_STATUS: i32 = 1;
pub const NEXT_STATE_LOGIN: i32 = 2;

/// Reads and decodes a Handshake packet (Handshaking, id 0x00).
pub async fn read_handshake<R>(stream: &mut R) -> Result<Handshake>
where
    R: AsyncRead + Unpin,
{
    let frame = wire::read_frame(stream).await?;
    expect_id(&frame, HANDSHAKE_ID)?;

    let body = &frame.body[1..];
    let (protocol_version, n1) = wire::decode_varint(body)?;
    let (server_address, n2) = wire::read_string(&body[n1..])?;
    let (server_port, n3) = wire::read_unsigned_short(&body[n1 + n2..])?;
    let (next_state, _) = wire::decode_varint(&body[n1 + n2 + n3..])?;

    Ok(Handshake {
        protocol_version,
        server_address,
        server_port,
        next_state,
        raw: frame.raw,
    })
}

/// Reads and discards a StatusRequest packet (Status, id 0x00, empty body).
pub async fn read_status_request<R>(stream: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let frame = wire::read_frame(stream).await?;
    expect_id(&frame, STATUS_REQUEST_ID)?;
    Ok(())
}

/// The client's LoginStart packet, decoded, plus its complete on-wire
/// bytes for later replay to the upstream server.
pub struct LoginStart {
    pub username: String,
    /// The complete framed packet as received from the client.
    pub raw: Vec<u8>,
}

/// Reads and decodes a LoginStart packet (Login, id 0x00).
pub async fn read_login_start<R>(stream: &mut R) -> Result<LoginStart>
where
    R: AsyncRead + Unpin,
{
    let frame = wire::read_frame(stream).await?;
    expect_id(&frame, LOGIN_START_ID)?;
    let (username, _) = wire::read_string(&frame.body[1..])?;
    Ok(LoginStart {
        username,
        raw: frame.raw,
    })
}

/// Reads a Ping frame (Status, id 0x01) and writes the identical frame
/// bytes back as the Pong response. The 8-byte payload need not be
/// parsed, only echoed.
pub async fn read_and_echo_ping<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let frame = wire::read_frame(stream).await?;
    expect_id(&frame, PING_ID)?;
    stream.write_all(&frame.raw).await?;
    Ok(())
}

/// Emits a StatusResponse (id 0x00) whose single field is the given JSON
/// document, serialized to a string.
pub async fn write_status<W, T>(stream: &mut W, status: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(status)
        .map_err(|e| Error::Protocol(format!("failed to serialize status json: {e}")))?;
    write_json_text(stream, &json).await
}

/// Emits a StatusResponse-shaped frame carrying a plain `{"text":...}`
/// message, used in either Status or pre-login Login context.
pub async fn write_text<W>(stream: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(&serde_json::json!({ "text": text }))
        .map_err(|e| Error::Protocol(format!("failed to serialize text json: {e}")))?;
    write_json_text(stream, &json).await
}

async fn write_json_text<W>(stream: &mut W, json: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut fields = Vec::new();
    wire::write_string(json, &mut fields);
    wire::write_frame(stream, STATUS_RESPONSE_ID, &fields).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake_bytes(protocol_version: i32, host: &str, port: u16, next_state: i32) -> Vec<u8> {
        let mut fields = Vec::new();
        wire::encode_varint(protocol_version, &mut fields);
        wire::write_string(host, &mut fields);
        fields.extend_from_slice(&port.to_be_bytes());
        wire::encode_varint(next_state, &mut fields);

        let mut body = vec![HANDSHAKE_ID];
        body.extend_from_slice(&fields);

        let mut packet = Vec::new();
        wire::encode_varint(body.len() as i32, &mut packet);
        packet.extend_from_slice(&body);
        packet
    }

    #[tokio::test]
    async fn reads_handshake_and_retains_raw_bytes() {
        let bytes = handshake_bytes(756, "localhost", 25565, NEXT_STATE_STATUS);
        let mut cursor = std::io::Cursor::new(bytes.clone());
        let hs = read_handshake(&mut cursor).await.unwrap();
        assert_eq!(hs.protocol_version, 756);
        assert_eq!(hs.server_address, "localhost");
        assert_eq!(hs.server_port, 25565);
        assert_eq!(hs.next_state, NEXT_STATE_STATUS);
        assert_eq!(hs.raw, bytes);
    }

    #[tokio::test]
    async fn wrong_packet_id_is_protocol_error() {
        // StatusRequest expects id 0, feed it a ping-shaped frame (id 1).
        let mut packet = Vec::new();
        wire::encode_varint(9, &mut packet);
        packet.push(1);
        packet.extend_from_slice(&[0u8; 8]);
        let mut cursor = std::io::Cursor::new(packet);
        let err = read_status_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn ping_is_echoed_verbatim() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let payload: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];
        let mut packet = Vec::new();
        wire::encode_varint(9, &mut packet); // id + 8 bytes
        packet.push(PING_ID);
        packet.extend_from_slice(&payload);

        tokio::io::AsyncWriteExt::write_all(&mut client, &packet)
            .await
            .unwrap();

        read_and_echo_ping(&mut server).await.unwrap();

        let mut echoed = vec![0u8; packet.len()];
        tokio::io::AsyncReadExt::read_exact(&mut client, &mut echoed)
            .await
            .unwrap();
        assert_eq!(echoed, packet);
        assert_eq!(echoed.len(), 10); // length byte + id + 8 byte payload
    }

    #[tokio::test]
    async fn write_text_round_trips_as_status_shaped_frame() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_text(&mut server, "server is stopped").await.unwrap();
        let frame = wire::read_frame(&mut client).await.unwrap();
        assert_eq!(frame.id().unwrap(), STATUS_RESPONSE_ID);
        let (json, _) = wire::read_string(&frame.body[1..]).unwrap();
        assert_eq!(json, r#"{"text":"server is stopped"}"#);
    }
}
