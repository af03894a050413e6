//! HopChat wire protocol: packet types and defaults.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::PeerId;

/// Hop budget given to locally authored chat packets when no other value is configured.
pub const DEFAULT_TTL: u32 = 8;

/// All wire packets. Encoded as a JSON record discriminated by `kind` (see wire module).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Packet {
    /// Presence / display-name announcement to a direct neighbor. Never relayed.
    #[serde(rename = "HELLO")]
    Hello(HelloPacket),
    /// Addressed chat message, relayed hop by hop.
    #[serde(rename = "CHAT")]
    Chat(ChatPacket),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPacket {
    pub src_id: PeerId,
    pub src_nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPacket {
    /// Assigned once by the author; the dedup key at every hop.
    pub message_id: Uuid,
    pub src_id: PeerId,
    #[serde(default)]
    pub src_nick: String,
    pub dst_id: PeerId,
    /// Remaining relays. Decremented on every flood, never flooded at 0.
    pub ttl: u32,
    pub payload: String,
    /// Nodes that processed this packet, author first.
    pub via: Vec<PeerId>,
    /// Unix epoch milliseconds at authoring time.
    #[serde(default)]
    pub created_at: i64,
}

impl ChatPacket {
    /// New packet authored by `src`: fresh message ID, `via = [src]`, stamped now.
    pub fn new(
        src: PeerId,
        src_nick: impl Into<String>,
        dst: PeerId,
        payload: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            via: vec![src.clone()],
            src_id: src,
            src_nick: src_nick.into(),
            dst_id: dst,
            ttl,
            payload: payload.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Copy of this packet as processed by `local`: `local` appended to the via trail and the
    /// given hop budget. The receiver's copy is left untouched.
    pub fn relayed(&self, local: &PeerId, ttl: u32) -> Self {
        let mut next = self.clone();
        next.via.push(local.clone());
        next.ttl = ttl;
        next
    }

    /// Authoring time as a UTC timestamp, if the sender stamped a sane value.
    pub fn created_at_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.created_at)
    }
}

impl From<HelloPacket> for Packet {
    fn from(p: HelloPacket) -> Self {
        Packet::Hello(p)
    }
}

impl From<ChatPacket> for Packet {
    fn from(p: ChatPacket) -> Self {
        Packet::Chat(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_chat_starts_trail_at_author() {
        let pkt = ChatPacket::new("A1".into(), "alice", "D1".into(), "hi", DEFAULT_TTL);
        assert_eq!(pkt.via, vec![PeerId::from("A1")]);
        assert_eq!(pkt.ttl, 8);
        assert!(pkt.created_at_utc().is_some());
    }

    #[test]
    fn relayed_leaves_original_untouched() {
        let pkt = ChatPacket::new("A1".into(), "alice", "D1".into(), "hi", 2);
        let next = pkt.relayed(&"B1".into(), 1);
        assert_eq!(pkt.via.len(), 1);
        assert_eq!(pkt.ttl, 2);
        assert_eq!(next.via, vec![PeerId::from("A1"), PeerId::from("B1")]);
        assert_eq!(next.ttl, 1);
        assert_eq!(next.message_id, pkt.message_id);
    }

    #[test]
    fn wire_field_names() {
        let pkt = Packet::Hello(HelloPacket {
            src_id: "A1".into(),
            src_nick: "alice".into(),
        });
        let v = serde_json::to_value(&pkt).unwrap();
        assert_eq!(v["kind"], "HELLO");
        assert_eq!(v["srcId"], "A1");
        assert_eq!(v["srcNick"], "alice");

        let chat = Packet::Chat(ChatPacket::new("A1".into(), "a", "D1".into(), "x", 3));
        let v = serde_json::to_value(&chat).unwrap();
        assert_eq!(v["kind"], "CHAT");
        assert_eq!(v["dstId"], "D1");
        assert!(v["messageId"].is_string());
        assert!(v["createdAt"].is_i64());
    }
}
