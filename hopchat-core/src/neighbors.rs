//! Neighbor table: one entry per directly linked peer, with its channel, name and liveness.

use std::collections::HashMap;

use crate::identity::PeerId;

/// Duplex link to one neighbor, supplied by the host's transport.
pub trait Channel {
    /// Queue a raw message for the neighbor.
    fn send(&self, message: Vec<u8>) -> Result<(), ChannelError>;
    /// Whether the underlying link still reports itself usable.
    fn is_open(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("transport error: {0}")]
    Transport(String),
}

pub struct NeighborEntry<C> {
    pub id: PeerId,
    pub channel: C,
    pub display_name: Option<String>,
    pub online: bool,
}

/// Presentation copy of an entry, without the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSnapshot {
    pub id: PeerId,
    pub display_name: Option<String>,
    pub online: bool,
}

pub struct NeighborTable<C> {
    entries: HashMap<PeerId, NeighborEntry<C>>,
}

impl<C: Channel> NeighborTable<C> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a directly connected peer. Returns false (and keeps the existing entry) when the
    /// peer already has a live entry on an open channel. A stale entry is replaced; its display
    /// name carries over.
    pub fn add_or_replace(&mut self, id: PeerId, channel: C) -> bool {
        let display_name = match self.entries.get(&id) {
            Some(existing) if existing.online && existing.channel.is_open() => return false,
            Some(existing) => existing.display_name.clone(),
            None => None,
        };
        self.entries.insert(
            id.clone(),
            NeighborEntry {
                id,
                channel,
                display_name,
                online: true,
            },
        );
        true
    }

    /// Returns true if the flag changed.
    pub fn mark_online(&mut self, id: &PeerId) -> bool {
        self.set_online(id, true)
    }

    /// Returns true if the flag changed. The entry and its display name stay.
    pub fn mark_offline(&mut self, id: &PeerId) -> bool {
        self.set_online(id, false)
    }

    fn set_online(&mut self, id: &PeerId, online: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(e) if e.online != online => {
                e.online = online;
                true
            }
            _ => false,
        }
    }

    /// Returns true if the stored name changed. Unknown peers are ignored.
    pub fn update_display_name(&mut self, id: &PeerId, name: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(e) if e.display_name.as_deref() != Some(name) => {
                e.display_name = Some(name.to_string());
                true
            }
            _ => false,
        }
    }

    /// Every online entry except `exclude`. Order is unspecified.
    pub fn all_live_except<'a>(
        &'a self,
        exclude: Option<&'a PeerId>,
    ) -> impl Iterator<Item = &'a NeighborEntry<C>> + 'a {
        self.entries
            .values()
            .filter(move |e| e.online && Some(&e.id) != exclude)
    }

    pub fn get(&self, id: &PeerId) -> Option<&NeighborEntry<C>> {
        self.entries.get(id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut NeighborEntry<C>> {
        self.entries.values_mut()
    }

    /// Display name if announced, else the short form of the id.
    pub fn label(&self, id: &PeerId) -> String {
        self.entries
            .get(id)
            .and_then(|e| e.display_name.clone())
            .unwrap_or_else(|| id.short().to_string())
    }

    /// Snapshot sorted by id.
    pub fn snapshot(&self) -> Vec<NeighborSnapshot> {
        let mut out: Vec<NeighborSnapshot> = self
            .entries
            .values()
            .map(|e| NeighborSnapshot {
                id: e.id.clone(),
                display_name: e.display_name.clone(),
                online: e.online,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Channel> Default for NeighborTable<C> {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockChannel;
    use super::*;

    fn id(s: &str) -> PeerId {
        PeerId::from(s)
    }

    #[test]
    fn add_refuses_duplicate_live_link() {
        let mut table = NeighborTable::new();
        assert!(table.add_or_replace(id("B1"), MockChannel::default()));
        assert!(!table.add_or_replace(id("B1"), MockChannel::default()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn add_replaces_dead_link_and_keeps_name() {
        let mut table = NeighborTable::new();
        let first = MockChannel::default();
        table.add_or_replace(id("B1"), first.clone());
        table.update_display_name(&id("B1"), "bob");
        first.close();
        table.mark_offline(&id("B1"));

        let second = MockChannel::default();
        assert!(table.add_or_replace(id("B1"), second));
        let entry = table.get(&id("B1")).unwrap();
        assert!(entry.online);
        assert!(entry.channel.is_open());
        assert_eq!(entry.display_name.as_deref(), Some("bob"));
    }

    #[test]
    fn add_replaces_entry_whose_channel_closed() {
        let mut table = NeighborTable::new();
        let first = MockChannel::default();
        table.add_or_replace(id("B1"), first.clone());
        first.close();
        assert!(table.add_or_replace(id("B1"), MockChannel::default()));
    }

    #[test]
    fn liveness_toggle_reports_change() {
        let mut table = NeighborTable::new();
        table.add_or_replace(id("B1"), MockChannel::default());
        table.update_display_name(&id("B1"), "bob");
        assert!(table.mark_offline(&id("B1")));
        assert!(!table.mark_offline(&id("B1")));
        assert_eq!(
            table.get(&id("B1")).unwrap().display_name.as_deref(),
            Some("bob")
        );
        assert!(table.mark_online(&id("B1")));
        assert!(!table.mark_online(&id("nobody")));
    }

    #[test]
    fn display_name_update_is_idempotent() {
        let mut table = NeighborTable::new();
        table.add_or_replace(id("B1"), MockChannel::default());
        assert!(table.update_display_name(&id("B1"), "bob"));
        let before = table.snapshot();
        assert!(!table.update_display_name(&id("B1"), "bob"));
        assert_eq!(table.snapshot(), before);
        assert!(!table.update_display_name(&id("Z9"), "zed"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn live_iteration_skips_excluded_and_offline() {
        let mut table = NeighborTable::new();
        for p in ["B1", "C1", "D1"] {
            table.add_or_replace(id(p), MockChannel::default());
        }
        table.mark_offline(&id("D1"));
        let exclude = id("B1");
        let mut live: Vec<String> = table
            .all_live_except(Some(&exclude))
            .map(|e| e.id.to_string())
            .collect();
        live.sort();
        assert_eq!(live, vec!["C1"]);
        assert_eq!(table.all_live_except(None).count(), 2);
    }

    #[test]
    fn label_falls_back_to_short_id() {
        let mut table = NeighborTable::new();
        table.add_or_replace(id("B1234567"), MockChannel::default());
        assert_eq!(table.label(&id("B1234567")), "B123");
        table.update_display_name(&id("B1234567"), "bob");
        assert_eq!(table.label(&id("B1234567")), "bob");
        assert_eq!(table.label(&id("unknown-peer")), "unkn");
    }

    #[test]
    fn snapshot_sorted_by_id() {
        let mut table = NeighborTable::new();
        table.add_or_replace(id("C1"), MockChannel::default());
        table.add_or_replace(id("A1"), MockChannel::default());
        let snap = table.snapshot();
        assert_eq!(snap[0].id, id("A1"));
        assert_eq!(snap[1].id, id("C1"));
        assert_eq!(table.len(), 2);
    }
}
