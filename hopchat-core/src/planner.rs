//! Delivery planner: unicast to a live direct neighbor when possible, otherwise flood.

use crate::identity::PeerId;
use crate::neighbors::{Channel, NeighborTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPlan {
    /// Destination is a live direct neighbor; send to it alone.
    Direct(PeerId),
    /// Send to every live neighbor.
    Flood,
}

pub fn plan_delivery<C: Channel>(table: &NeighborTable<C>, dst: &PeerId) -> DeliveryPlan {
    match table.get(dst) {
        Some(entry) if entry.online => DeliveryPlan::Direct(dst.clone()),
        _ => DeliveryPlan::Flood,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::testing::MockChannel;

    #[test]
    fn live_neighbor_is_direct() {
        let mut table = NeighborTable::new();
        table.add_or_replace("D1".into(), MockChannel::default());
        assert_eq!(
            plan_delivery(&table, &"D1".into()),
            DeliveryPlan::Direct("D1".into())
        );
    }

    #[test]
    fn offline_or_unknown_floods() {
        let mut table = NeighborTable::new();
        table.add_or_replace("D1".into(), MockChannel::default());
        table.mark_offline(&"D1".into());
        assert_eq!(plan_delivery(&table, &"D1".into()), DeliveryPlan::Flood);
        assert_eq!(plan_delivery(&table, &"X9".into()), DeliveryPlan::Flood);
    }
}
