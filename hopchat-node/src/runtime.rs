//! Coordinator task: the only owner of protocol state. Link events, console commands and
//! liveness ticks are queued here and handled one at a time.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use hopchat_core::{Event, HopNode, LinkError, PeerId};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::console::{self, ConsoleCommand};
use crate::transport::{TcpChannel, Transport};

/// Everything the coordinator reacts to.
pub enum NodeEvent {
    /// `outbound` is true when this node dialed the link.
    Opened {
        peer: PeerId,
        channel: TcpChannel,
        outbound: bool,
    },
    Data { peer: PeerId, link: u64, bytes: Vec<u8> },
    Closed { peer: PeerId, link: u64 },
    Failed { peer: PeerId, link: u64, reason: String },
    Command(ConsoleCommand),
}

pub struct Runtime {
    node: HopNode<TcpChannel>,
    transport: Transport,
    /// Link currently registered for each neighbor; events from replaced links are ignored.
    active: HashMap<PeerId, ActiveLink>,
}

#[derive(Debug, Clone, Copy)]
struct ActiveLink {
    id: u64,
    /// Dialed by the lower of the two ids. When both nodes dial each other, both keep this one.
    preferred: bool,
}

impl Runtime {
    pub fn new(node: HopNode<TcpChannel>, transport: Transport) -> Self {
        Self {
            node,
            transport,
            active: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn node(&self) -> &HopNode<TcpChannel> {
        &self.node
    }

    /// Handle events until the queue closes, `/quit` arrives or `shutdown` resolves.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<NodeEvent>,
        liveness_interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(liveness_interval.max(Duration::from_millis(100)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle(event) {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let changes = self.node.tick();
                    self.present(changes);
                }
                _ = &mut shutdown => break,
            }
        }
        info!("node stopping");
        for entry in self.node.neighbors().all_live_except(None) {
            entry.channel.close();
        }
    }

    /// Returns false when the node should stop.
    pub fn handle(&mut self, event: NodeEvent) -> bool {
        match event {
            NodeEvent::Opened {
                peer,
                channel,
                outbound,
            } => self.open_link(peer, channel, outbound),
            NodeEvent::Data { peer, link, bytes } => {
                if self.is_active(&peer, link) {
                    let events = self.node.on_message_received(&peer, &bytes);
                    self.present(events);
                }
            }
            NodeEvent::Closed { peer, link } => {
                if self.is_active(&peer, link) {
                    self.active.remove(&peer);
                    let events = self.node.on_channel_closed(&peer);
                    self.present(events);
                }
            }
            NodeEvent::Failed { peer, link, reason } => {
                if self.is_active(&peer, link) {
                    self.active.remove(&peer);
                    let events = self.node.on_channel_error(&peer, &reason);
                    self.present(events);
                }
            }
            NodeEvent::Command(cmd) => return self.command(cmd),
        }
        true
    }

    fn open_link(&mut self, peer: PeerId, channel: TcpChannel, outbound: bool) {
        let link = ActiveLink {
            id: channel.link(),
            preferred: outbound == (self.node.local_id() < &peer),
        };
        let mut result = self.node.on_channel_open(peer.clone(), channel.clone());
        if matches!(result, Err(LinkError::Duplicate(_)))
            && link.preferred
            && self.active.get(&peer).is_some_and(|current| !current.preferred)
        {
            if let Some(entry) = self.node.neighbors().get(&peer) {
                info!(peer = %peer, link = entry.channel.link(), "replacing link dialed by the higher id");
                entry.channel.close();
            }
            result = self.node.on_channel_open(peer.clone(), channel.clone());
        }
        match result {
            Ok(events) => {
                self.active.insert(peer, link);
                self.present(events);
            }
            Err(e) => {
                info!(peer = %peer, error = %e, "closing extra link");
                channel.close();
            }
        }
    }

    fn is_active(&self, peer: &PeerId, link: u64) -> bool {
        let active = self.active.get(peer).map(|l| l.id) == Some(link);
        if !active {
            debug!(peer = %peer, link, "event from inactive link ignored");
        }
        active
    }

    fn command(&mut self, cmd: ConsoleCommand) -> bool {
        match cmd {
            ConsoleCommand::Connect(addr) => {
                println!("connecting to {addr}…");
                self.transport.dial(addr);
            }
            ConsoleCommand::Send { dst, text } => match self.node.send_chat(&dst, &text) {
                Ok(report) => {
                    println!("{}", console::render_sent(&report, self.node.neighbors()));
                    self.present(report.events);
                }
                Err(e) => println!("not sent: {e}"),
            },
            ConsoleCommand::Nick(name) => {
                let events = self.node.set_display_name(&name);
                println!("you are now {}", self.node.display_name());
                self.present(events);
            }
            ConsoleCommand::Neighbors => {
                println!(
                    "{}",
                    console::render_neighbors(&self.node.neighbors().snapshot())
                );
            }
            ConsoleCommand::Id => {
                println!("{} ({})", self.node.local_id(), self.node.display_name());
            }
            ConsoleCommand::Help => println!("{}", console::HELP),
            ConsoleCommand::Quit => return false,
        }
        true
    }

    fn present(&self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::ChatDelivered(packet) => {
                    println!("{}", console::render_delivered(&packet, self.node.neighbors()));
                }
                Event::NeighborStatusChanged(snapshot) => {
                    println!("neighbors:\n{}", console::render_neighbors(&snapshot));
                }
            }
        }
    }
}
