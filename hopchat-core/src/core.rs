//! Host-driven API: HopNode receives channel events and raw messages from the host, sends through
//! neighbor channels and returns application events.

use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::dedup::DedupLedger;
use crate::identity::{self, PeerId};
use crate::liveness;
use crate::neighbors::{Channel, NeighborSnapshot, NeighborTable};
use crate::planner::{self, DeliveryPlan};
use crate::protocol::{ChatPacket, HelloPacket, Packet};
use crate::router::{self, RouteDecision};
use crate::wire;

/// Notification for the application surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A chat packet reached this node as its destination. Raised once per message ID.
    ChatDelivered(ChatPacket),
    /// Liveness or display name of some neighbor changed. Carries the full table snapshot.
    NeighborStatusChanged(Vec<NeighborSnapshot>),
}

/// How a locally authored packet left this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryRoute {
    Direct(PeerId),
    Flood { fanout: usize },
}

/// Result of `HopNode::send_chat`: the authored packet (for local echo), the route, and any
/// events raised while sending.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub packet: ChatPacket,
    pub route: DeliveryRoute,
    pub events: Vec<Event>,
}

/// Protocol state of one overlay node. All methods run to completion; the host must call them
/// from a single task (or otherwise serialize them).
pub struct HopNode<C> {
    local_id: PeerId,
    nick: String,
    config: Config,
    neighbors: NeighborTable<C>,
    ledger: DedupLedger,
    tick_count: u64,
}

impl<C: Channel> HopNode<C> {
    /// Node with the default nick `User-<first four id chars>`.
    pub fn new(local_id: PeerId, config: Config) -> Self {
        let nick = format!("User-{}", local_id.short());
        Self::with_nick(local_id, nick, config)
    }

    pub fn with_nick(local_id: PeerId, nick: impl Into<String>, config: Config) -> Self {
        Self {
            ledger: DedupLedger::new(config.dedup_capacity, config.dedup_max_age_ticks),
            local_id,
            nick: nick.into(),
            config,
            neighbors: NeighborTable::new(),
            tick_count: 0,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    pub fn display_name(&self) -> &str {
        &self.nick
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn neighbors(&self) -> &NeighborTable<C> {
        &self.neighbors
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// A link to `peer` opened. Registers it, greets it with our Hello and reports the change.
    /// Fails when `peer` already has a live link (the host should close the new one) or is us.
    pub fn on_channel_open(&mut self, peer: PeerId, channel: C) -> Result<Vec<Event>, LinkError> {
        if peer == self.local_id {
            return Err(LinkError::SelfLink);
        }
        if !self.neighbors.add_or_replace(peer.clone(), channel) {
            debug!(peer = %peer, "refusing second link to live neighbor");
            return Err(LinkError::Duplicate(peer));
        }
        info!(peer = %peer, "neighbor connected");
        if let Ok(hello) = self.hello_bytes() {
            self.send_to(&peer, hello);
        }
        Ok(vec![self.status_event()])
    }

    /// The link to `peer` closed. The entry stays, marked offline.
    pub fn on_channel_closed(&mut self, peer: &PeerId) -> Vec<Event> {
        if self.neighbors.mark_offline(peer) {
            info!(peer = %peer, "neighbor disconnected");
            vec![self.status_event()]
        } else {
            vec![]
        }
    }

    /// The link to `peer` failed. Treated like a close; pending sends on it are lost.
    pub fn on_channel_error(&mut self, peer: &PeerId, reason: &str) -> Vec<Event> {
        warn!(peer = %peer, error = reason, "neighbor channel error");
        self.on_channel_closed(peer)
    }

    /// Process one raw message received from direct neighbor `from`. Invalid input is dropped.
    pub fn on_message_received(&mut self, from: &PeerId, raw: &[u8]) -> Vec<Event> {
        let packet = match wire::parse_packet(raw) {
            Ok(p) => p,
            Err(e) => {
                trace!(peer = %from, error = %e, "dropping invalid packet");
                return vec![];
            }
        };
        match packet {
            Packet::Hello(hello) => self.on_hello(from, hello),
            Packet::Chat(chat) => self.on_chat(from, chat),
        }
    }

    fn on_hello(&mut self, from: &PeerId, hello: HelloPacket) -> Vec<Event> {
        if !identity::accept_claimed_source(&hello.src_id, from) {
            debug!(peer = %from, claimed = %hello.src_id, "ignoring hello with mismatched source");
            return vec![];
        }
        if self.neighbors.get(from).is_none() {
            debug!(peer = %from, "ignoring hello from unregistered peer");
            return vec![];
        }
        let renamed = self.neighbors.update_display_name(from, &hello.src_nick);
        let revived = self.neighbors.mark_online(from);
        if renamed || revived {
            debug!(peer = %from, nick = %hello.src_nick, "neighbor announced");
            vec![self.status_event()]
        } else {
            vec![]
        }
    }

    fn on_chat(&mut self, from: &PeerId, chat: ChatPacket) -> Vec<Event> {
        let message_id = chat.message_id;
        match router::route_chat(&mut self.ledger, &self.local_id, &chat, self.tick_count) {
            RouteDecision::Duplicate => {
                debug!(peer = %from, message_id = %message_id, "duplicate chat discarded");
                vec![]
            }
            RouteDecision::Deliver(packet) => {
                info!(
                    message_id = %message_id,
                    src = %packet.src_id,
                    hops = packet.via.len() - 1,
                    "chat delivered"
                );
                vec![Event::ChatDelivered(packet)]
            }
            RouteDecision::Forward(packet) => {
                let bytes = match wire::encode_packet(&Packet::Chat(packet)) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(message_id = %message_id, error = %e, "cannot encode relayed chat");
                        return vec![];
                    }
                };
                let (fanout, changed) = self.flood(&bytes, Some(from));
                debug!(message_id = %message_id, fanout, "chat relayed");
                self.events_if(changed)
            }
            RouteDecision::Expired => {
                debug!(message_id = %message_id, "chat ttl exhausted, dropped");
                vec![]
            }
        }
    }

    /// Author a chat message to `dst`. Unicast when `dst` is a live direct neighbor, flood otherwise.
    /// The message ID is recorded first so a flooded copy looping back is ignored.
    pub fn send_chat(&mut self, dst: &str, payload: &str) -> Result<DeliveryReport, SendError> {
        let dst = dst.trim();
        let payload = payload.trim();
        if dst.is_empty() {
            return Err(SendError::EmptyDestination);
        }
        if payload.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        let dst = PeerId::from(dst);
        if dst == self.local_id {
            return Err(SendError::SelfAddressed);
        }
        let packet = ChatPacket::new(
            self.local_id.clone(),
            self.nick.clone(),
            dst.clone(),
            payload,
            self.config.default_ttl,
        );
        self.ledger.check_and_insert(packet.message_id, self.tick_count);
        let bytes = wire::encode_packet(&Packet::Chat(packet.clone()))?;

        let (route, changed) = match planner::plan_delivery(&self.neighbors, &dst) {
            DeliveryPlan::Direct(peer) => {
                let ok = self.send_to(&peer, bytes);
                (DeliveryRoute::Direct(peer), !ok)
            }
            DeliveryPlan::Flood => {
                let (fanout, changed) = self.flood(&bytes, None);
                if fanout == 0 {
                    warn!(dst = %dst, "no live neighbors, chat not sent");
                }
                (DeliveryRoute::Flood { fanout }, changed)
            }
        };
        debug!(message_id = %packet.message_id, route = ?route, "chat sent");
        Ok(DeliveryReport {
            events: self.events_if(changed),
            packet,
            route,
        })
    }

    /// Change our display name and announce it to every live neighbor. Blank names are ignored.
    pub fn set_display_name(&mut self, name: &str) -> Vec<Event> {
        let name = name.trim();
        if name.is_empty() || name == self.nick {
            return vec![];
        }
        self.nick = name.to_string();
        info!(nick = %self.nick, "display name changed");
        match self.hello_bytes() {
            Ok(hello) => {
                let (_, changed) = self.flood(&hello, None);
                self.events_if(changed)
            }
            Err(e) => {
                warn!(error = %e, "cannot encode hello");
                vec![]
            }
        }
    }

    /// Periodic tick: demote neighbors with closed channels and age out the dedup ledger.
    pub fn tick(&mut self) -> Vec<Event> {
        self.tick_count = self.tick_count.saturating_add(1);
        let pruned = self.ledger.prune(self.tick_count);
        if pruned > 0 {
            trace!(pruned, "dedup ledger aged out entries");
        }
        let demoted = liveness::sweep(&mut self.neighbors);
        for peer in &demoted {
            info!(peer = %peer, "neighbor channel no longer open, marked offline");
        }
        self.events_if(!demoted.is_empty())
    }

    fn hello_bytes(&self) -> Result<Vec<u8>, wire::EncodeError> {
        wire::encode_packet(&Packet::Hello(HelloPacket {
            src_id: self.local_id.clone(),
            src_nick: self.nick.clone(),
        }))
    }

    /// Send the same bytes to every live neighbor but `exclude`. Returns the fan-out and whether
    /// any neighbor went offline on a failed send.
    fn flood(&mut self, bytes: &[u8], exclude: Option<&PeerId>) -> (usize, bool) {
        let targets: Vec<PeerId> = self
            .neighbors
            .all_live_except(exclude)
            .map(|e| e.id.clone())
            .collect();
        let mut changed = false;
        for peer in &targets {
            if !self.send_to(peer, bytes.to_vec()) {
                changed = true;
            }
        }
        (targets.len(), changed)
    }

    /// Returns false when the send failed and the neighbor was marked offline.
    fn send_to(&mut self, peer: &PeerId, bytes: Vec<u8>) -> bool {
        let Some(entry) = self.neighbors.get(peer) else {
            return true;
        };
        match entry.channel.send(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %peer, error = %e, "send failed, marking neighbor offline");
                self.neighbors.mark_offline(peer);
                false
            }
        }
    }

    fn status_event(&self) -> Event {
        Event::NeighborStatusChanged(self.neighbors.snapshot())
    }

    fn events_if(&self, changed: bool) -> Vec<Event> {
        if changed {
            vec![self.status_event()]
        } else {
            vec![]
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("peer {0} already has a live link")]
    Duplicate(PeerId),
    #[error("refusing link to self")]
    SelfLink,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("destination is empty")]
    EmptyDestination,
    #[error("message is empty")]
    EmptyPayload,
    #[error("cannot address a message to self")]
    SelfAddressed,
    #[error(transparent)]
    Encode(#[from] wire::EncodeError),
}
