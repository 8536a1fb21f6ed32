//! Scheduler statistics and per-client reports.
//!
//! Counters are updated by the scheduler on its own tick, so plain integers suffice. Snapshots are
//! serializable for the simulation driver's JSON summary.

// Import finalized slot records counted by the stats
use crate::allocation::SlotAllocationRecord;
// Import client context read by per-client reports
use crate::context::{ClientContext, ClientId};
// Import per-direction counters
use crate::priority::{Direction, DirectionTable};
// Import serde derive for JSON export
use serde::Serialize;

/// Running totals for one scheduler instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub slots_scheduled: u64,
    /// Slots in which at least one unit was granted, per direction.
    pub busy_slots: DirectionTable<u64>,
    pub units_offered: DirectionTable<u64>,
    pub units_assigned: DirectionTable<u64>,
    pub grants: DirectionTable<u64>,
    pub harq_acks: u64,
    pub harq_nacks: u64,
    pub control_emitted: u64,
    pub control_accepted: u64,
    pub control_rejected: u64,
}

impl SchedulerStats {
    /// Fold one finalized record into the totals.
    pub fn record_slot(&mut self, record: &SlotAllocationRecord) {
        self.slots_scheduled += 1;
        for direction in Direction::ALL {
            let assigned = u64::from(record.assigned(direction));
            self.units_offered[direction] += u64::from(record.available(direction));
            self.units_assigned[direction] += assigned;
            self.grants[direction] += record.grants(direction).len() as u64;
            if assigned > 0 {
                self.busy_slots[direction] += 1;
            }
        }
    }

    /// Fraction of offered units that were assigned; zero before anything was offered.
    pub fn utilization(&self, direction: Direction) -> f64 {
        let offered = self.units_offered[direction];
        if offered == 0 {
            return 0.0;
        }
        self.units_assigned[direction] as f64 / offered as f64
    }
}

/// Point-in-time view of one client, in bits and bits per second.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientReport {
    pub client: ClientId,
    pub backlog_bytes: DirectionTable<u64>,
    pub average_throughput_bps: DirectionTable<f64>,
    pub delivered_bits: DirectionTable<u64>,
}

impl ClientReport {
    pub fn from_context(context: &ClientContext) -> Self {
        Self {
            client: context.id(),
            backlog_bytes: DirectionTable::from_fn(|direction| context.backlog_bytes(direction)),
            average_throughput_bps: DirectionTable::from_fn(|direction| {
                context.metric(direction).average()
            }),
            delivered_bits: DirectionTable::from_fn(|direction| {
                context.metric(direction).delivered_bits()
            }),
        }
    }
}

/// Jain's fairness index over a set of non-negative values; 1.0 means perfectly equal.
pub fn jain_index(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let sum: f64 = values.iter().sum();
    let squares: f64 = values.iter().map(|value| value * value).sum();
    if squares == 0.0 {
        return 1.0;
    }
    sum * sum / (values.len() as f64 * squares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::Grant;
    use crate::link::Mcs;
    use crate::slot::SlotKey;

    #[test]
    fn record_slot_accumulates_per_direction() {
        let mut record = SlotAllocationRecord::new(SlotKey::default(), DirectionTable::splat(10));
        record
            .set_grants(
                Direction::Downlink,
                vec![Grant {
                    client: ClientId(1),
                    units: 4,
                    mcs: Mcs(2),
                }],
            )
            .unwrap();
        let mut stats = SchedulerStats::default();
        stats.record_slot(&record);
        stats.record_slot(&record);
        assert_eq!(stats.slots_scheduled, 2);
        assert_eq!(stats.units_assigned[Direction::Downlink], 8);
        assert_eq!(stats.busy_slots[Direction::Uplink], 0);
        assert!((stats.utilization(Direction::Downlink) - 0.4).abs() < 1e-12);
        assert_eq!(stats.utilization(Direction::Uplink), 0.0);
    }

    #[test]
    fn jain_index_bounds() {
        assert!((jain_index(&[5.0, 5.0, 5.0]) - 1.0).abs() < 1e-12);
        assert!((jain_index(&[1.0, 0.0, 0.0, 0.0]) - 0.25).abs() < 1e-12);
        assert_eq!(jain_index(&[]), 1.0);
    }
}
