//! Flood router: per inbound chat packet, decide absorb, relay or drop.

use crate::dedup::DedupLedger;
use crate::identity::PeerId;
use crate::protocol::ChatPacket;

/// Outcome of routing one inbound chat packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Already processed here; discard.
    Duplicate,
    /// Addressed to this node. Carries the packet with this node appended to `via`.
    Deliver(ChatPacket),
    /// Flood to every live neighbor except the one it came from. `ttl` is one less than on arrival.
    Forward(ChatPacket),
    /// Hop budget exhausted; dropped without notice to the author.
    Expired,
}

/// Route an inbound chat packet at `local`. The ledger entry is written before any forwarding
/// decision, so a message ID is decided on at most once per node.
pub fn route_chat(
    ledger: &mut DedupLedger,
    local: &PeerId,
    packet: &ChatPacket,
    now: u64,
) -> RouteDecision {
    if !ledger.check_and_insert(packet.message_id, now) {
        return RouteDecision::Duplicate;
    }
    if &packet.dst_id == local {
        return RouteDecision::Deliver(packet.relayed(local, packet.ttl));
    }
    match packet.ttl.checked_sub(1) {
        Some(ttl) => RouteDecision::Forward(packet.relayed(local, ttl)),
        None => RouteDecision::Expired,
    }
}
