//! Passive liveness sweep: demote neighbors whose channel reports closed. No probing.

use crate::identity::PeerId;
use crate::neighbors::{Channel, NeighborTable};

/// Default sweep interval in seconds.
pub const DEFAULT_LIVENESS_INTERVAL_SECS: u64 = 5;

/// Mark offline every online neighbor whose channel is no longer open. Returns the demoted ids.
/// Entries only come back online through a Hello or a fresh link.
pub fn sweep<C: Channel>(table: &mut NeighborTable<C>) -> Vec<PeerId> {
    let mut demoted = Vec::new();
    for entry in table.iter_mut() {
        if entry.online && !entry.channel.is_open() {
            entry.online = false;
            demoted.push(entry.id.clone());
        }
    }
    demoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::testing::MockChannel;

    #[test]
    fn closed_channels_go_offline() {
        let mut table = NeighborTable::new();
        let b = MockChannel::default();
        let c = MockChannel::default();
        table.add_or_replace("B1".into(), b.clone());
        table.add_or_replace("C1".into(), c);
        b.close();

        assert_eq!(sweep(&mut table), vec![PeerId::from("B1")]);
        assert!(!table.get(&"B1".into()).unwrap().online);
        assert!(table.get(&"C1".into()).unwrap().online);
        assert!(sweep(&mut table).is_empty());
    }
}
