//! Peer identity: opaque overlay identifiers and the trust check on claimed sources.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Overlay peer identifier. Issued once per session by the transport layer; used as the
/// neighbor key and as `srcId`/`dstId` in packets.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    /// Fresh random identifier (UUID v4), for nodes that are not handed one.
    pub fn generate() -> Self {
        PeerId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First four characters; the fallback label when a peer has not announced a name.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(4) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(s)
    }
}

/// Decide whether a source id claimed inside a packet is accepted for the link it arrived on.
/// Identities are not authenticated; the only rule is that a direct announcement must name
/// the peer at the other end of the channel.
pub fn accept_claimed_source(claimed: &PeerId, channel_peer: &PeerId) -> bool {
    claimed == channel_peer
}
