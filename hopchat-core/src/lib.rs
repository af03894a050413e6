//! HopChat flood-routing protocol reference implementation.
//! Host-driven: no I/O; host passes channel events and raw messages, core sends through
//! neighbor channels and returns application events.

pub mod config;
pub mod core;
pub mod dedup;
pub mod identity;
pub mod liveness;
pub mod neighbors;
pub mod planner;
pub mod protocol;
pub mod router;
pub mod wire;

pub use config::Config;
pub use crate::core::{DeliveryReport, DeliveryRoute, Event, HopNode, LinkError, SendError};
pub use identity::PeerId;
pub use neighbors::{Channel, ChannelError, NeighborSnapshot, NeighborTable};
pub use protocol::{ChatPacket, HelloPacket, Packet, DEFAULT_TTL};
pub use wire::{decode_frame, encode_frame, parse_packet, FrameDecodeError, PacketError};
