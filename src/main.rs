//! Slot scheduler simulation driver.
//!
//! Runs one scheduler instance against a synthetic execution layer for a fixed number of slots:
//! every slot the driver collects the control messages and the allocation due now, answers grants
//! with HARQ feedback, injects traffic arrivals and uplink requests, then asks the scheduler for
//! the decision `scheduling_lead` slots ahead. Halfway through, the last client's downlink channel
//! fades to a low MCS. A JSON summary is printed at the end.

// Import error context helpers for the binary
use anyhow::{Context, Result};
// Import command-line parsing derives
use clap::{Parser, ValueEnum};
// Import serde derive for the JSON summary
use serde::Serialize;
// Import fairness index for the summary
use slot_scheduler::metrics::jain_index;
// Import scheduler, configuration and message types
use slot_scheduler::{
    BandwidthPartRouter, BearerConfig, ClientConfig, ClientId, ClientReport, ControlEnvelope,
    ControlMessage, Direction, HarqFeedback, Mcs, McsTableLink, Numerology, PolicyKind,
    PriorityClass, PriorityRouter, SchedulerConfig, SchedulerStats, SlotScheduler,
};
// Import owned path type for the config argument
use std::path::PathBuf;
// Import logging macros
use tracing::{debug, info, warn};
// Import subscriber builder and RUST_LOG filter
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logical channel every synthetic client uses for its traffic.
const DATA_LCID: u8 = 1;
/// Bytes arriving per downlink burst.
const DOWNLINK_BURST_BYTES: u64 = 1500;
/// Bytes reported per uplink buffer status.
const UPLINK_REPORT_BYTES: u64 = 600;
/// Every n-th transport block is negatively acknowledged.
const NACK_EVERY: u64 = 10;
/// Downlink MCS of the last client after its channel fades halfway through the run.
const FADED_MCS: Mcs = Mcs(2);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Rr,
    Pf,
    Qos,
}

impl From<PolicyArg> for PolicyKind {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Rr => PolicyKind::RoundRobin,
            PolicyArg::Pf => PolicyKind::ProportionalFair,
            PolicyArg::Qos => PolicyKind::QosWeighted,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "slot-sim", about = "Drive a slot scheduler with synthetic traffic")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(long, env = "SLOT_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Number of slots to simulate.
    #[arg(long, default_value_t = 1000)]
    slots: u64,

    /// Number of synthetic clients.
    #[arg(long, default_value_t = 4)]
    clients: u32,

    /// Override the configured numerology index (slots per subframe = 2^mu).
    #[arg(long)]
    mu: Option<u8>,

    /// Override the configured policy.
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Override the configured fairness exponent.
    #[arg(long)]
    fairness_exponent: Option<f64>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    policy: PolicyKind,
    slots: u64,
    allocations_executed: u64,
    control_delivered: u64,
    downlink_fairness: f64,
    stats: &'a SchedulerStats,
    clients: Vec<ClientReport>,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &Args) -> Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if let Some(mu) = args.mu {
        config.numerology = Numerology::try_from_mu(mu)?;
    }
    if let Some(policy) = args.policy {
        config.policy.kind = policy.into();
    }
    if let Some(exponent) = args.fairness_exponent {
        config.policy.fairness_exponent = exponent;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Client 0 carries urgent traffic; the rest are best effort with staggered channel quality.
fn client_config(index: u32) -> ClientConfig {
    let priority = if index == 0 {
        PriorityClass(1)
    } else {
        PriorityClass::default()
    };
    ClientConfig::new(
        ClientId(index),
        vec![BearerConfig::new(DATA_LCID, priority)],
    )
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs);
    let config = load_config(&args)?;

    let mut link = McsTableLink::new(config.resources.resource_elements_per_unit, Mcs(9));
    for index in 0..args.clients {
        let mcs = Mcs((4 + 3 * index).min(u32::from(McsTableLink::max_mcs().0)) as u8);
        link.set_mcs(ClientId(index), Direction::Downlink, mcs);
        link.set_mcs(ClientId(index), Direction::Uplink, mcs);
    }

    let numerology = config.numerology;
    let mut router = PriorityRouter::new(config.instance);
    let mut scheduler = SlotScheduler::new(config, link)?;
    for index in 0..args.clients {
        let client = client_config(index);
        for bearer in &client.bearers {
            router.register_bearer(client.id, bearer.lcid, bearer.priority);
        }
        scheduler.attach(&client)?;
    }

    info!(
        slots = args.slots,
        clients = args.clients,
        slot_period_us = numerology.slot_period().as_micros() as u64,
        "starting simulation"
    );

    let mut allocations_executed = 0u64;
    let mut control_delivered = 0u64;
    let mut transport_blocks = 0u64;
    for index in 0..args.slots {
        let now = numerology.key_at(index);
        if index == args.slots / 2 && args.clients > 0 {
            let faded = ClientId(args.clients - 1);
            scheduler
                .link_mut()
                .set_mcs(faded, Direction::Downlink, FADED_MCS);
            info!(slot = %now, client = %faded, mcs = %FADED_MCS, "channel faded");
        }

        // Execution layer: consume what is due now.
        let mut feedback = Vec::new();
        for envelope in scheduler.pop_control(now) {
            control_delivered += 1;
            let (client, direction) = match envelope.message {
                ControlMessage::DownlinkGrant { client, .. } => (client, Direction::Downlink),
                ControlMessage::UplinkGrant { client, .. } => (client, Direction::Uplink),
                _ => continue,
            };
            transport_blocks += 1;
            feedback.push(HarqFeedback {
                client,
                process: (transport_blocks % 16) as u8,
                direction,
                ack: transport_blocks % NACK_EVERY != 0,
                instance: envelope.instance,
            });
        }
        if scheduler.allocations().exists(now) {
            let record = scheduler.allocations_mut().retrieve(now)?;
            allocations_executed += 1;
            debug!(
                slot = %now,
                dl = record.assigned(Direction::Downlink),
                ul = record.assigned(Direction::Uplink),
                "executing allocation"
            );
        }

        // Inbound signalling back to the scheduler.
        let mut inbound: Vec<ControlEnvelope> = feedback
            .into_iter()
            .map(|harq| ControlEnvelope {
                instance: router.route_inbound_feedback(&harq),
                message: ControlMessage::HarqFeedback(harq),
                origin: now,
                delivery: now,
            })
            .collect();
        for id in 0..args.clients {
            let client = ClientId(id);
            if (index + u64::from(id)) % 5 != 0 {
                continue;
            }
            let idle = scheduler
                .client(client)
                .is_some_and(|context| context.backlog_bytes(Direction::Uplink) == 0);
            let message = if idle && index % 10 == 0 {
                ControlMessage::SchedulingRequest { client }
            } else {
                ControlMessage::BufferStatus {
                    client,
                    lcid: DATA_LCID,
                    bytes: UPLINK_REPORT_BYTES,
                }
            };
            inbound.push(ControlEnvelope {
                instance: router.route_outbound_control(&message, scheduler.instance()),
                message,
                origin: now,
                delivery: now,
            });
        }
        for envelope in inbound {
            if let Err(err) = scheduler.accept_control(envelope) {
                warn!(slot = %now, error = %err, "control message rejected");
            }
        }

        // Downlink arrivals: client n receives a burst every n + 1 slots.
        for id in 0..args.clients {
            if index % u64::from(id + 1) != 0 {
                continue;
            }
            let client = ClientId(id);
            let queued = scheduler
                .client(client)
                .and_then(|context| context.channel(DATA_LCID))
                .map_or(0, |channel| channel.backlog[Direction::Downlink]);
            scheduler.report_backlog(
                client,
                DATA_LCID,
                Direction::Downlink,
                queued + DOWNLINK_BURST_BYTES,
            )?;
        }

        scheduler.schedule_slot(now)?;
    }

    let clients = scheduler.client_reports();
    let delivered: Vec<f64> = clients
        .iter()
        .map(|report| report.delivered_bits[Direction::Downlink] as f64)
        .collect();
    let summary = Summary {
        policy: scheduler.policy().kind(),
        slots: args.slots,
        allocations_executed,
        control_delivered,
        downlink_fairness: jain_index(&delivered),
        stats: scheduler.stats(),
        clients,
    };
    info!(
        dl_utilization = scheduler.stats().utilization(Direction::Downlink),
        ul_utilization = scheduler.stats().utilization(Direction::Uplink),
        "simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
