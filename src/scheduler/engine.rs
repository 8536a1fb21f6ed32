//! Resource assignment engine.
//!
//! One call to [`assign`] distributes the units of one direction of one slot. The loop itself is
//! policy independent; only the ranking and metric updates come from the [`Policy`].
//!
//! Algorithm:
//! 1. Start the slot for every client: snapshot averages, read the MCS from the link model
//! 2. Collect eligible clients (nonzero demand) and let the policy refresh their potential
//! 3. Pick the best-ranked eligible client and grant `min(step, demand, remaining)` units
//! 4. Update the winner's metric as assigned and every other eligible client as not assigned
//! 5. Drop clients whose demand is met; repeat until units or demand run out
//! 6. Settle every client's metric so averages move even for clients that were never eligible
//! 7. Drain the granted bytes from the winners' logical channels

// Import grant produced per served client
use crate::allocation::Grant;
// Import client table the pass iterates
use crate::context::{ClientId, ClientTable};
// Import crate error type for link preconditions
use crate::error::{Result, SchedulerError};
// Import link model for MCS and unit size
use crate::link::LinkQuality;
// Import direction being assigned
use crate::priority::Direction;
// Import ranking and metric rules
use crate::scheduler::policy::Policy;
// Import map from client to its grant index
use std::collections::HashMap;
// Import slot period type
use std::time::Duration;
// Import per-iteration trace logging
use tracing::trace;

/// Per-pass inputs that do not change between iterations.
#[derive(Debug, Clone, Copy)]
pub struct PassParams {
    pub direction: Direction,
    /// Units offered this slot.
    pub available: u32,
    /// Units granted per iteration.
    pub step: u32,
    pub slot_period: Duration,
}

/// Result of one assignment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// One entry per served client, in order of first grant.
    pub grants: Vec<Grant>,
    pub assigned: u32,
    pub available: u32,
}

impl Assignment {
    pub fn unassigned(&self) -> u32 {
        self.available - self.assigned
    }
}

/// Verify that every client with queued data in `direction` can be served by `link`.
///
/// A link that reports zero bits per unit would make such a client look demand-free and leave
/// units idle while its backlog waits.
///
/// # Errors
/// `ZeroCapacityLink` naming the first such client, in id order.
pub fn check_link(
    table: &ClientTable,
    link: &dyn LinkQuality,
    direction: Direction,
) -> Result<()> {
    for context in table.iter() {
        if context.backlog_bytes(direction) == 0 {
            continue;
        }
        let mcs = link.mcs(context.id(), direction);
        if link.bits_per_unit(mcs, direction) == 0 {
            return Err(SchedulerError::ZeroCapacityLink {
                client: context.id(),
                direction,
                mcs,
            });
        }
    }
    Ok(())
}

/// Distribute `params.available` units among the clients of `table`.
///
/// # Arguments
/// * `table` - every attached client; all contexts get their per-slot metric update
/// * `policy` - ranking and metric rules
/// * `link` - MCS and bits-per-unit source, queried once per client
/// * `params` - direction, capacity, grant step and slot period of this pass
///
/// # Returns
/// The grants in order of first service, plus assigned and offered totals. The assigned total
/// is `min(available, total demand)`.
///
/// # Errors
/// `ZeroCapacityLink` (see [`check_link`]); the table is left untouched in that case.
pub fn assign(
    table: &mut ClientTable,
    policy: &Policy,
    link: &dyn LinkQuality,
    params: PassParams,
) -> Result<Assignment> {
    let direction = params.direction;
    let step = params.step.max(1);
    check_link(table, link, direction)?;

    // STEP 1/2: start the slot everywhere and collect the clients that have something to send.
    let mut eligible: Vec<(ClientId, u32)> = Vec::new();
    for context in table.contexts_mut() {
        let mcs = link.mcs(context.id(), direction);
        let bits_per_unit = link.bits_per_unit(mcs, direction);
        context.begin_slot(direction, mcs, bits_per_unit, params.slot_period);
        let demand = context.demand_units(direction);
        if demand > 0 {
            policy.before_schedule(context, direction, step);
            eligible.push((context.id(), demand));
        }
    }

    let mut remaining = params.available;
    let mut grants: Vec<Grant> = Vec::new();
    let mut grant_index: HashMap<ClientId, usize> = HashMap::new();

    // STEP 3-5: iterate until capacity or demand is exhausted.
    while remaining > 0 && !eligible.is_empty() {
        let winner_pos = {
            let table = &*table;
            let mut best = 0;
            for pos in 1..eligible.len() {
                let (Some(candidate), Some(current)) =
                    (table.get(eligible[pos].0), table.get(eligible[best].0))
                else {
                    continue;
                };
                if policy.compare(candidate, current, direction).is_lt() {
                    best = pos;
                }
            }
            best
        };

        let (winner, demand) = eligible[winner_pos];
        let units = step.min(demand).min(remaining);
        remaining -= units;
        eligible[winner_pos].1 -= units;

        let stamp = table.next_service_stamp();
        if let Some(context) = table.get_mut(winner) {
            policy.on_assigned(context, direction, units);
            context.stamp_service(direction, stamp);
            let mcs = context.metric(direction).mcs();
            match grant_index.get(&winner) {
                Some(&index) => grants[index].units += units,
                None => {
                    grant_index.insert(winner, grants.len());
                    grants.push(Grant {
                        client: winner,
                        units,
                        mcs,
                    });
                }
            }
        }
        trace!(%direction, client = %winner, units, remaining, "granted units");

        for &(other, _) in eligible.iter().filter(|(id, _)| *id != winner) {
            if let Some(context) = table.get_mut(other) {
                policy.on_not_assigned(context, direction);
            }
        }

        eligible.retain(|&(_, left)| left > 0);
    }

    // STEP 6: every context gets its per-slot update; recomputing from the slot snapshot is
    // idempotent for clients already updated above.
    for context in table.contexts_mut() {
        policy.on_not_assigned(context, direction);
    }

    // STEP 7: the granted transport blocks leave the backlog.
    for grant in &grants {
        if let Some(context) = table.get_mut(grant.client) {
            let bits = link.transport_block_bits(grant.mcs, grant.units, direction);
            context.drain(direction, bits / 8);
        }
    }

    Ok(Assignment {
        assigned: params.available - remaining,
        available: params.available,
        grants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BearerConfig, ClientConfig};
    use crate::link::{FixedLink, Mcs};
    use crate::priority::PriorityClass;
    use crate::scheduler::policy::PolicyKind;

    const BITS_PER_UNIT: u64 = 80; // 10 bytes per unit

    fn table_with(policy: &Policy, clients: &[(u32, u8, u64)]) -> ClientTable {
        let mut table = ClientTable::new();
        for &(id, priority, backlog) in clients {
            let config = ClientConfig::new(
                ClientId(id),
                vec![BearerConfig::new(1, PriorityClass(priority)).with_backlog(backlog, 0)],
            );
            table.attach(policy.create_context(&config)).unwrap();
        }
        table
    }

    fn params(available: u32) -> PassParams {
        PassParams {
            direction: Direction::Downlink,
            available,
            step: 1,
            slot_period: Duration::from_millis(1),
        }
    }

    fn link() -> FixedLink {
        FixedLink::new(Mcs(4), BITS_PER_UNIT)
    }

    fn units_of(assignment: &Assignment, id: u32) -> u32 {
        assignment
            .grants
            .iter()
            .find(|grant| grant.client == ClientId(id))
            .map_or(0, |grant| grant.units)
    }

    #[test]
    fn empty_table_yields_empty_assignment() {
        let policy = Policy::default();
        let mut table = ClientTable::new();
        let result = assign(&mut table, &policy, &link(), params(10)).unwrap();
        assert!(result.grants.is_empty());
        assert_eq!(result.unassigned(), 10);
    }

    #[test]
    fn never_exceeds_demand_and_leaves_rest_unassigned() {
        let policy = Policy::default();
        // 25 bytes -> 3 units, 10 bytes -> 1 unit
        let mut table = table_with(&policy, &[(1, 5, 25), (2, 5, 10)]);
        let result = assign(&mut table, &policy, &link(), params(10)).unwrap();
        assert_eq!(units_of(&result, 1), 3);
        assert_eq!(units_of(&result, 2), 1);
        assert_eq!(result.assigned, 4);
        assert_eq!(table.get(ClientId(1)).unwrap().backlog_bytes(Direction::Downlink), 0);
    }

    #[test]
    fn work_conserving_when_backlog_exceeds_capacity() {
        let policy = Policy::new(PolicyKind::ProportionalFair, 1.0, 99.0).unwrap();
        let mut table = table_with(&policy, &[(1, 5, 1000), (2, 5, 1000), (3, 5, 1000)]);
        let result = assign(&mut table, &policy, &link(), params(17)).unwrap();
        assert_eq!(result.assigned, 17);
    }

    #[test]
    fn equal_backlogs_split_within_one_unit() {
        let policy = Policy::new(PolicyKind::ProportionalFair, 0.0, 99.0).unwrap();
        let mut table = table_with(
            &policy,
            &[(1, 5, 1000), (2, 5, 1000), (3, 5, 1000), (4, 5, 1000)],
        );
        let result = assign(&mut table, &policy, &link(), params(23)).unwrap();
        let shares: Vec<u32> = (1..=4).map(|id| units_of(&result, id)).collect();
        let max = *shares.iter().max().unwrap();
        let min = *shares.iter().min().unwrap();
        assert!(max - min <= 1, "shares {shares:?}");
        assert_eq!(shares.iter().sum::<u32>(), 23);
    }

    #[test]
    fn qos_serves_urgent_class_first() {
        let policy = Policy::new(PolicyKind::QosWeighted, 1.0, 99.0).unwrap();
        let mut table = table_with(&policy, &[(1, 9, 1000), (2, 1, 30)]);
        let result = assign(&mut table, &policy, &link(), params(5)).unwrap();
        assert_eq!(result.grants[0].client, ClientId(2));
        assert_eq!(units_of(&result, 2), 3);
        assert_eq!(units_of(&result, 1), 2);
    }

    #[test]
    fn zero_units_still_updates_every_average() {
        let policy = Policy::default();
        let mut table = table_with(&policy, &[(1, 5, 1000), (2, 5, 0)]);
        assign(&mut table, &policy, &link(), params(5)).unwrap();
        let before: Vec<f64> = table
            .iter()
            .map(|ctx| ctx.metric(Direction::Downlink).average())
            .collect();
        assert!(before[0] > 0.0);
        let result = assign(&mut table, &policy, &link(), params(0)).unwrap();
        assert!(result.grants.is_empty());
        let after = table.get(ClientId(1)).unwrap().metric(Direction::Downlink).average();
        assert!(after < before[0]);
    }

    #[test]
    fn zero_bit_link_with_backlog_is_rejected_untouched() {
        let policy = Policy::default();
        let mut table = table_with(&policy, &[(1, 5, 0), (2, 5, 1000)]);
        let dead = FixedLink::new(Mcs(0), 0);
        assert_eq!(
            assign(&mut table, &policy, &dead, params(25)),
            Err(SchedulerError::ZeroCapacityLink {
                client: ClientId(2),
                direction: Direction::Downlink,
                mcs: Mcs(0),
            })
        );
        let ctx = table.get(ClientId(2)).unwrap();
        assert_eq!(ctx.backlog_bytes(Direction::Downlink), 1000);
        assert_eq!(ctx.metric(Direction::Downlink).bits_per_unit(), 0);

        // no backlog, nothing to serve: an idle pass is fine
        let mut idle = table_with(&policy, &[(1, 5, 0)]);
        assert!(assign(&mut idle, &policy, &dead, params(25)).is_ok());
    }

    #[test]
    fn round_robin_rotates_across_slots() {
        let policy = Policy::new(PolicyKind::RoundRobin, 0.0, 99.0).unwrap();
        let mut table = table_with(&policy, &[(1, 5, 1000), (2, 5, 1000), (3, 5, 1000)]);
        let first = assign(&mut table, &policy, &link(), params(1)).unwrap();
        let second = assign(&mut table, &policy, &link(), params(1)).unwrap();
        let third = assign(&mut table, &policy, &link(), params(1)).unwrap();
        let served: Vec<ClientId> = [first, second, third]
            .iter()
            .map(|a| a.grants[0].client)
            .collect();
        assert_eq!(served, vec![ClientId(1), ClientId(2), ClientId(3)]);
    }
}
