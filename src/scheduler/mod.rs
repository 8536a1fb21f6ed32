//! Slot scheduler: owns the client table, the policy, the allocation queue and the control delay
//! line of one scheduler instance, and runs one allocation pass per clock tick.
//!
//! The external clock calls [`SlotScheduler::schedule_slot`] once per slot. The decision for clock
//! slot `S` is stored under `S + scheduling_lead`, and one grant message per served client is
//! emitted with origin `S`, so it reaches the execution layer `control_latency` slots later. The
//! execution layer drains both by slot key through [`SlotScheduler::allocations_mut`] and
//! [`SlotScheduler::pop_control`].

pub mod engine;
pub mod policy;

// Import allocation queue and records built per slot
use crate::allocation::{SlotAllocationQueue, SlotAllocationRecord};
// Import instance configuration
use crate::config::SchedulerConfig;
// Import client table and attach inputs
use crate::context::{ClientConfig, ClientContext, ClientId, ClientTable, Lcid};
// Import delay line carrying grants and responses
use crate::control::{ControlDelayLine, ControlEnvelope, ControlMessage};
// Import crate error type
use crate::error::{Result, SchedulerError};
// Import link model trait the scheduler is generic over
use crate::link::LinkQuality;
// Import counters and reports
use crate::metrics::{ClientReport, SchedulerStats};
// Import direction and bearer priority classes
use crate::priority::{Direction, PriorityClass};
// Import instance identity checked on inbound envelopes
use crate::routing::InstanceId;
// Import slot keys
use crate::slot::SlotKey;
// Import the per-direction assignment pass
use engine::{assign, PassParams};
// Import the configured policy
use policy::Policy;
// Import logging macros
use tracing::{debug, info, warn};

/// One scheduler instance (one bandwidth part).
pub struct SlotScheduler<L: LinkQuality> {
    config: SchedulerConfig,
    policy: Policy,
    link: L,
    clients: ClientTable,
    allocations: SlotAllocationQueue,
    control: ControlDelayLine,
    stats: SchedulerStats,
}

impl<L: LinkQuality> SlotScheduler<L> {
    /// Build a scheduler from validated configuration and a link-quality model.
    ///
    /// # Errors
    /// `InvalidConfig` when the configuration fails [`SchedulerConfig::validate`].
    pub fn new(config: SchedulerConfig, link: L) -> Result<Self> {
        config.validate()?;
        let policy = config.policy.build()?;
        let allocations = SlotAllocationQueue::new(config.numerology);
        let control = ControlDelayLine::new(
            config.numerology,
            config.control_latency,
            config.instance,
            SlotKey::default(),
        );
        info!(
            instance = %config.instance,
            policy = %policy.kind(),
            fairness_exponent = policy.fairness_exponent(),
            time_window = policy.time_window(),
            control_latency = config.control_latency,
            "scheduler instance created"
        );
        Ok(Self {
            config,
            policy,
            link,
            clients: ClientTable::new(),
            allocations,
            control,
            stats: SchedulerStats::default(),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn instance(&self) -> InstanceId {
        self.config.instance
    }

    /// Mutable access to the link model, e.g. to update channel estimates between slots.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Attach a client. The returned id is the only handle collaborators keep.
    pub fn attach(&mut self, config: &ClientConfig) -> Result<ClientId> {
        let context = self.policy.create_context(config);
        let id = self.clients.attach(context)?;
        info!(
            instance = %self.config.instance,
            client = %id,
            bearers = config.bearers.len(),
            "client attached"
        );
        Ok(id)
    }

    /// Detach a client and destroy its context.
    pub fn detach(&mut self, id: ClientId) -> Result<()> {
        self.clients.detach(id)?;
        info!(instance = %self.config.instance, client = %id, "client detached");
        Ok(())
    }

    /// Read-only view of a client's context.
    pub fn client(&self, id: ClientId) -> Option<&ClientContext> {
        self.clients.get(id)
    }

    /// Snapshot of every attached client.
    pub fn client_reports(&self) -> Vec<ClientReport> {
        self.clients.iter().map(ClientReport::from_context).collect()
    }

    /// Add a logical channel to an attached client, or change its priority class.
    pub fn configure_bearer(
        &mut self,
        id: ClientId,
        lcid: Lcid,
        priority: PriorityClass,
    ) -> Result<()> {
        let context = self
            .clients
            .get_mut(id)
            .ok_or(SchedulerError::UnknownClient(id))?;
        context.upsert_channel(lcid, priority);
        Ok(())
    }

    /// Replace the queued byte count of one logical channel (buffer status report).
    ///
    /// Reports for a logical channel the client never configured are ignored with a warning.
    pub fn report_backlog(
        &mut self,
        id: ClientId,
        lcid: Lcid,
        direction: Direction,
        bytes: u64,
    ) -> Result<()> {
        let context = self
            .clients
            .get_mut(id)
            .ok_or(SchedulerError::UnknownClient(id))?;
        if !context.set_backlog(lcid, direction, bytes) {
            warn!(client = %id, lcid, %direction, "backlog report for unknown logical channel");
        }
        Ok(())
    }

    /// Run the allocation pass for clock slot `now`.
    ///
    /// Returns the key under which the decision was queued (`now + scheduling_lead`).
    ///
    /// # Errors
    /// `DuplicateRecord` / `OutOfOrderRecord` when the target slot is not after the newest queued
    /// record, `ZeroCapacityLink` when a client with queued data cannot be served by the link.
    /// Nothing is mutated in either case.
    pub fn schedule_slot(&mut self, now: SlotKey) -> Result<SlotKey> {
        let numerology = self.config.numerology;
        let target = numerology.advance(now, u64::from(self.config.scheduling_lead));
        self.allocations.accepts(target)?;
        for direction in Direction::ALL {
            engine::check_link(&self.clients, &self.link, direction)?;
        }
        self.control.set_current_slot(now);

        let available = self.config.resources.units();
        let mut record = SlotAllocationRecord::new(target, available.clone());
        for direction in Direction::ALL {
            let assignment = assign(
                &mut self.clients,
                &self.policy,
                &self.link,
                PassParams {
                    direction,
                    available: available[direction],
                    step: self.config.resources.min_assignable_units,
                    slot_period: numerology.slot_period(),
                },
            )?;
            record.set_grants(direction, assignment.grants)?;
        }

        for direction in Direction::ALL {
            for grant in record.grants(direction) {
                let message = match direction {
                    Direction::Downlink => ControlMessage::DownlinkGrant {
                        client: grant.client,
                        slot: target,
                        units: grant.units,
                        mcs: grant.mcs,
                    },
                    Direction::Uplink => ControlMessage::UplinkGrant {
                        client: grant.client,
                        slot: target,
                        units: grant.units,
                        mcs: grant.mcs,
                    },
                };
                self.control.enqueue(message, now);
                self.stats.control_emitted += 1;
            }
        }

        self.stats.record_slot(&record);
        debug!(
            instance = %self.config.instance,
            now = %now,
            target = %target,
            dl_assigned = record.assigned(Direction::Downlink),
            dl_available = record.available(Direction::Downlink),
            ul_assigned = record.assigned(Direction::Uplink),
            ul_available = record.available(Direction::Uplink),
            "slot scheduled"
        );
        self.allocations.push_back(record)?;
        Ok(target)
    }

    /// Answer a random-access preamble immediately.
    ///
    /// The response is delivered in the current slot, or in the next one when the execution layer
    /// already drained the current slot through [`Self::pop_control`].
    ///
    /// # Returns
    /// The delivery slot of the response.
    pub fn respond_to_access(&mut self, preamble: u8, client: ClientId) -> SlotKey {
        self.stats.control_emitted += 1;
        self.control
            .enqueue_now(ControlMessage::RachResponse { preamble, client })
    }

    /// Process a control message routed to this instance.
    ///
    /// HARQ feedback is counted, buffer status replaces the uplink backlog of the reported
    /// channel, and a scheduling request gives a client with no reported uplink data a small
    /// backlog on its most urgent channel so it receives a grant.
    ///
    /// # Errors
    /// `MisroutedMessage` if the envelope belongs to another instance, `UnknownClient` if the
    /// message names a client that is not attached.
    pub fn accept_control(&mut self, envelope: ControlEnvelope) -> Result<()> {
        let local = self.config.instance;
        if envelope.instance != local {
            self.stats.control_rejected += 1;
            warn!(
                target_instance = %envelope.instance,
                local = %local,
                "rejecting misrouted control message"
            );
            return Err(SchedulerError::MisroutedMessage {
                target: envelope.instance,
                local,
            });
        }
        let client = envelope.message.client();
        if !self.clients.contains(client) {
            self.stats.control_rejected += 1;
            return Err(SchedulerError::UnknownClient(client));
        }
        match envelope.message {
            ControlMessage::HarqFeedback(feedback) => {
                if feedback.ack {
                    self.stats.harq_acks += 1;
                } else {
                    self.stats.harq_nacks += 1;
                    debug!(
                        client = %feedback.client,
                        process = feedback.process,
                        direction = %feedback.direction,
                        "harq nack"
                    );
                }
            }
            ControlMessage::BufferStatus { client, lcid, bytes } => {
                self.report_backlog(client, lcid, Direction::Uplink, bytes)?;
            }
            ControlMessage::SchedulingRequest { client } => {
                let bytes = self.config.scheduling_request_bytes;
                if let Some(context) = self.clients.get_mut(client) {
                    if context.backlog_bytes(Direction::Uplink) == 0 {
                        let lcid = context
                            .channels()
                            .min_by_key(|channel| (channel.priority, channel.lcid))
                            .map(|channel| channel.lcid);
                        match lcid {
                            Some(lcid) => {
                                context.set_backlog(lcid, Direction::Uplink, bytes);
                            }
                            None => warn!(
                                client = %client,
                                "scheduling request from client without bearers"
                            ),
                        }
                    }
                }
            }
            ControlMessage::DownlinkGrant { .. }
            | ControlMessage::UplinkGrant { .. }
            | ControlMessage::RachResponse { .. } => {
                debug!(client = %client, "ignoring scheduler-originated message on inbound path");
            }
        }
        self.stats.control_accepted += 1;
        Ok(())
    }

    /// Queue of decided slots; the execution layer retrieves records from here.
    pub fn allocations(&self) -> &SlotAllocationQueue {
        &self.allocations
    }

    pub fn allocations_mut(&mut self) -> &mut SlotAllocationQueue {
        &mut self.allocations
    }

    pub fn control_mut(&mut self) -> &mut ControlDelayLine {
        &mut self.control
    }

    /// Drain the control messages due in `slot`.
    pub fn pop_control(&mut self, slot: SlotKey) -> Vec<ControlEnvelope> {
        self.control.pop_current_slot_messages(slot)
    }
}
