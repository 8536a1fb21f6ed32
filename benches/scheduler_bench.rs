use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use slot_scheduler::scheduler::engine::{assign, PassParams};
use slot_scheduler::{
    BearerConfig, ClientConfig, ClientId, ClientTable, ControlDelayLine, ControlMessage,
    Direction, DirectionTable, FixedLink, InstanceId, Mcs, Numerology, Policy, PolicyKind,
    PriorityClass, SchedulerConfig, SlotAllocationQueue, SlotAllocationRecord, SlotKey,
    SlotScheduler,
};

fn client(id: u32) -> ClientConfig {
    ClientConfig::new(
        ClientId(id),
        vec![BearerConfig::new(1, PriorityClass((id % 10) as u8)).with_backlog(u64::MAX / 16, 0)],
    )
}

fn bench_assignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("assignment");
    let link = FixedLink::new(Mcs(12), 300);

    for kind in [
        PolicyKind::RoundRobin,
        PolicyKind::ProportionalFair,
        PolicyKind::QosWeighted,
    ] {
        for clients in [8u32, 64] {
            let policy = Policy::new(kind, 1.0, 99.0).unwrap();
            let mut table = ClientTable::new();
            for id in 0..clients {
                table.attach(policy.create_context(&client(id))).unwrap();
            }
            let params = PassParams {
                direction: Direction::Downlink,
                available: 100,
                step: 1,
                slot_period: Duration::from_micros(500),
            };
            group.bench_with_input(
                BenchmarkId::new(kind.to_string(), clients),
                &params,
                |b, params| {
                    b.iter(|| assign(&mut table, &policy, &link, black_box(*params)).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn bench_schedule_slot(c: &mut Criterion) {
    c.bench_function("schedule_slot_32_clients", |b| {
        let mut scheduler =
            SlotScheduler::new(SchedulerConfig::default(), FixedLink::new(Mcs(12), 300)).unwrap();
        for id in 0..32 {
            scheduler.attach(&client(id)).unwrap();
        }
        let numerology = scheduler.config().numerology;
        let mut index = 0u64;
        b.iter(|| {
            let now = numerology.key_at(index);
            scheduler.pop_control(now);
            if scheduler.allocations().exists(now) {
                black_box(scheduler.allocations_mut().retrieve(now).unwrap());
            }
            scheduler.schedule_slot(now).unwrap();
            index += 1;
        });
    });
}

fn bench_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("queues");
    let numerology = Numerology::from_mu(1);

    group.bench_function("allocation_push_retrieve", |b| {
        let mut queue = SlotAllocationQueue::new(numerology);
        let mut index = 0u64;
        b.iter(|| {
            let key = numerology.key_at(index);
            queue
                .push_back(SlotAllocationRecord::new(key, DirectionTable::splat(25)))
                .unwrap();
            black_box(queue.retrieve_head().unwrap());
            index += 1;
        });
    });

    group.bench_function("delay_line_enqueue_pop", |b| {
        let mut line = ControlDelayLine::new(numerology, 2, InstanceId(0), SlotKey::default());
        let mut index = 0u64;
        b.iter(|| {
            let origin = numerology.key_at(index);
            for id in 0..8 {
                line.enqueue(
                    ControlMessage::SchedulingRequest {
                        client: ClientId(id),
                    },
                    origin,
                );
            }
            black_box(line.pop_current_slot_messages(origin));
            index += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_assignment, bench_schedule_slot, bench_queues);
criterion_main!(benches);
