// Property tests for the assignment engine

use proptest::prelude::*;
use slot_scheduler::scheduler::engine::{assign, PassParams};
use slot_scheduler::{
    BearerConfig, ClientConfig, ClientId, ClientTable, Direction, FixedLink, LinkQuality, Mcs,
    McsTableLink, Policy, PolicyKind, PriorityClass, SchedulerConfig,
};
use std::time::Duration;

const BITS_PER_UNIT: u64 = 96;

fn policy_kind() -> impl Strategy<Value = PolicyKind> {
    prop_oneof![
        Just(PolicyKind::RoundRobin),
        Just(PolicyKind::ProportionalFair),
        Just(PolicyKind::QosWeighted),
    ]
}

fn demand_units(backlog: u64) -> u32 {
    (backlog * 8).div_ceil(BITS_PER_UNIT) as u32
}

proptest! {
    /// Property: a pass never hands out more than capacity or more than any client asked for,
    /// and stops short of capacity only when every demand is met.
    #[test]
    fn assignment_is_bounded_and_work_conserving(
        clients in prop::collection::vec((0u8..12, 0u64..4000), 0..12),
        available in 0u32..80,
        step in 1u32..5,
        kind in policy_kind(),
        alpha in 0.0f64..2.0,
    ) {
        let policy = Policy::new(kind, alpha, 99.0).unwrap();
        let mut table = ClientTable::new();
        for (id, &(priority, backlog)) in clients.iter().enumerate() {
            let config = ClientConfig::new(
                ClientId(id as u32),
                vec![BearerConfig::new(1, PriorityClass(priority)).with_backlog(backlog, 0)],
            );
            table.attach(policy.create_context(&config)).unwrap();
        }
        let params = PassParams {
            direction: Direction::Downlink,
            available,
            step,
            slot_period: Duration::from_micros(500),
        };
        let link = FixedLink::new(Mcs(10), BITS_PER_UNIT);

        let result = assign(&mut table, &policy, &link, params).unwrap();

        let granted: u32 = result.grants.iter().map(|grant| grant.units).sum();
        prop_assert_eq!(granted, result.assigned);
        prop_assert!(result.assigned <= available);

        let total_demand: u32 = clients.iter().map(|&(_, backlog)| demand_units(backlog)).sum();
        prop_assert_eq!(result.assigned, available.min(total_demand));

        for grant in &result.grants {
            let (_, backlog) = clients[grant.client.0 as usize];
            prop_assert!(grant.units > 0);
            prop_assert!(grant.units <= demand_units(backlog));
        }
        let mut served: Vec<ClientId> = result.grants.iter().map(|grant| grant.client).collect();
        served.sort();
        served.dedup();
        prop_assert_eq!(served.len(), result.grants.len());
    }

    /// Property: a unit size that passes validation carries data at every MCS, so a client with
    /// backlog always has nonzero demand.
    #[test]
    fn validated_unit_size_carries_bits_at_every_mcs(
        resource_elements in 0u64..64,
        mcs in 0u8..40,
    ) {
        let mut config = SchedulerConfig::default();
        config.resources.resource_elements_per_unit = resource_elements;
        let link = McsTableLink::new(resource_elements, Mcs(mcs));
        let bits = link.bits_per_unit(Mcs(mcs), Direction::Uplink);
        if config.validate().is_ok() {
            prop_assert!(bits > 0);
        } else {
            prop_assert_eq!(link.min_bits_per_unit(), 0);
        }
    }

    /// Property: with a zero fairness exponent and equal backlogs, proportional fair splits
    /// capacity within one unit.
    #[test]
    fn equal_clients_split_evenly(count in 1usize..8, available in 0u32..64) {
        let policy = Policy::new(PolicyKind::ProportionalFair, 0.0, 99.0).unwrap();
        let mut table = ClientTable::new();
        for id in 0..count {
            let config = ClientConfig::new(
                ClientId(id as u32),
                vec![BearerConfig::new(1, PriorityClass::default()).with_backlog(100_000, 0)],
            );
            table.attach(policy.create_context(&config)).unwrap();
        }
        let params = PassParams {
            direction: Direction::Downlink,
            available,
            step: 1,
            slot_period: Duration::from_millis(1),
        };
        let link = FixedLink::new(Mcs(3), BITS_PER_UNIT);
        let result = assign(&mut table, &policy, &link, params).unwrap();
        let shares: Vec<u32> = (0..count)
            .map(|id| {
                result
                    .grants
                    .iter()
                    .find(|grant| grant.client == ClientId(id as u32))
                    .map_or(0, |grant| grant.units)
            })
            .collect();
        let max = shares.iter().copied().max().unwrap_or(0);
        let min = shares.iter().copied().min().unwrap_or(0);
        prop_assert!(max - min <= 1, "shares {:?}", shares);
    }
}
