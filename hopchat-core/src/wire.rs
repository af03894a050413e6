//! Packet codec and stream framing: JSON records, length-prefix (4 bytes LE) frames.

use crate::protocol::Packet;

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 1024 * 1024; // 1 MiB

/// Serialize a packet to its JSON wire record.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(packet)?)
}

/// Error serializing a packet.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse and validate one raw message. Anything that is not a JSON object with a known `kind`,
/// or a chat record missing its required fields, is `Invalid`. Never mutates anything; callers
/// drop invalid input without surfacing it.
pub fn parse_packet(raw: &[u8]) -> Result<Packet, PacketError> {
    let value: serde_json::Value = serde_json::from_slice(raw).map_err(PacketError::Malformed)?;
    let kind = value
        .as_object()
        .ok_or(PacketError::NotARecord)?
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or(PacketError::MissingKind)?;
    if kind != "HELLO" && kind != "CHAT" {
        return Err(PacketError::UnknownKind(kind.to_string()));
    }
    let packet: Packet = serde_json::from_value(value).map_err(PacketError::Malformed)?;
    if let Packet::Chat(chat) = &packet {
        if chat.dst_id.is_empty() {
            return Err(PacketError::MissingDestination);
        }
        if chat.via.is_empty() {
            return Err(PacketError::EmptyVia);
        }
    }
    Ok(packet)
}

/// Why a raw message was rejected.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("not a structured record")]
    NotARecord,
    #[error("missing kind discriminator")]
    MissingKind,
    #[error("unknown packet kind {0:?}")]
    UnknownKind(String),
    #[error("chat packet without destination")]
    MissingDestination,
    #[error("chat packet with empty via trail")]
    EmptyVia,
}

/// Wrap a payload into a single frame: 4 bytes LE length + payload.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameEncodeError> {
    let len = payload.len();
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + len);
    out.extend_from_slice(&(len as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Error framing a payload.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the payload and the number of bytes consumed.
/// Call with partial buffer; returns error if not enough bytes (caller should try again after more data).
pub fn decode_frame(bytes: &[u8]) -> Result<(&[u8], usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = frame_len([bytes[0], bytes[1], bytes[2], bytes[3]])?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    Ok((&bytes[LEN_SIZE..LEN_SIZE + len], LEN_SIZE + len))
}

/// Validate a length prefix read off a stream.
pub fn frame_len(prefix: [u8; LEN_SIZE]) -> Result<usize, FrameDecodeError> {
    let len = u32::from_le_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    Ok(len as usize)
}

/// Error decoding a frame (need more bytes or too large).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatPacket, HelloPacket};

    fn sample_chat() -> Packet {
        Packet::Chat(ChatPacket::new("A1".into(), "alice", "D1".into(), "hi", 8))
    }

    #[test]
    fn parse_encoded_chat() {
        let pkt = sample_chat();
        let raw = encode_packet(&pkt).unwrap();
        assert_eq!(parse_packet(&raw).unwrap(), pkt);
    }

    #[test]
    fn parse_hello_record() {
        let raw = br#"{"kind":"HELLO","srcId":"B1","srcNick":"bob"}"#;
        let expected = Packet::Hello(HelloPacket {
            src_id: "B1".into(),
            src_nick: "bob".into(),
        });
        assert_eq!(parse_packet(raw).unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_packet(b"\xff\x00garbage"),
            Err(PacketError::Malformed(_))
        ));
        assert!(matches!(parse_packet(b"[1,2,3]"), Err(PacketError::NotARecord)));
        assert!(matches!(parse_packet(b"\"CHAT\""), Err(PacketError::NotARecord)));
        assert!(matches!(
            parse_packet(br#"{"srcId":"A1"}"#),
            Err(PacketError::MissingKind)
        ));
        assert!(matches!(
            parse_packet(br#"{"kind":"PING"}"#),
            Err(PacketError::UnknownKind(k)) if k == "PING"
        ));
    }

    #[test]
    fn rejects_chat_without_required_fields() {
        let no_id = br#"{"kind":"CHAT","srcId":"A1","dstId":"D1","ttl":3,"payload":"x","via":["A1"]}"#;
        assert!(matches!(parse_packet(no_id), Err(PacketError::Malformed(_))));

        let no_dst = br#"{"kind":"CHAT","messageId":"9b2f3e0c-5d0e-4c38-9a43-1f1d2b6b7a11","srcId":"A1","ttl":3,"payload":"x","via":["A1"]}"#;
        assert!(matches!(parse_packet(no_dst), Err(PacketError::Malformed(_))));

        let empty_dst = br#"{"kind":"CHAT","messageId":"9b2f3e0c-5d0e-4c38-9a43-1f1d2b6b7a11","srcId":"A1","dstId":"","ttl":3,"payload":"x","via":["A1"]}"#;
        assert!(matches!(
            parse_packet(empty_dst),
            Err(PacketError::MissingDestination)
        ));

        let no_via = br#"{"kind":"CHAT","messageId":"9b2f3e0c-5d0e-4c38-9a43-1f1d2b6b7a11","srcId":"A1","dstId":"D1","ttl":3,"payload":"x","via":[]}"#;
        assert!(matches!(parse_packet(no_via), Err(PacketError::EmptyVia)));
    }

    #[test]
    fn rejects_negative_ttl() {
        let raw = br#"{"kind":"CHAT","messageId":"9b2f3e0c-5d0e-4c38-9a43-1f1d2b6b7a11","srcId":"A1","dstId":"D1","ttl":-1,"payload":"x","via":["A1"]}"#;
        assert!(parse_packet(raw).is_err());
    }

    #[test]
    fn accepts_ttl_above_byte_range() {
        let raw = br#"{"kind":"CHAT","messageId":"9b2f3e0c-5d0e-4c38-9a43-1f1d2b6b7a11","srcId":"A1","dstId":"D1","ttl":1000,"payload":"x","via":["A1"]}"#;
        match parse_packet(raw) {
            Ok(Packet::Chat(c)) => assert_eq!(c.ttl, 1000),
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn partial_read_need_more() {
        let frame = encode_frame(b"hello").unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..LEN_SIZE + 1]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_frames() {
        let fa = encode_frame(b"first").unwrap();
        let fb = encode_frame(b"second").unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (p1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(p1, b"first");
        assert_eq!(n1, fa.len());
        let (p2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(p2, b"second");
        assert_eq!(n2, fb.len());
    }

    #[test]
    fn oversized_prefix_rejected() {
        let prefix = (MAX_FRAME_LEN + 1).to_le_bytes();
        assert!(matches!(frame_len(prefix), Err(FrameDecodeError::TooLarge)));
    }
}
