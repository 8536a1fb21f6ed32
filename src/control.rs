//! Control messages and the fixed-latency delay line delivering them.
//!
//! Control signalling produced at decision time (grants, feedback, access responses) must reach
//! the execution layer exactly `latency` slots later. The [`ControlDelayLine`] is a ring of
//! per-slot FIFO buckets indexed by `delivery_slot mod depth`:
//!
//! 1. `enqueue` stamps the envelope with `delivery = origin + latency` and appends it to its bucket
//! 2. `enqueue_now` targets the current slot's bucket, bypassing the latency
//! 3. `pop_current_slot_messages` drains only the envelopes due in the requested slot, in enqueue
//!    order, and leaves later deliveries sharing the bucket untouched
//!
//! A slot is drained once. Anything addressed to a slot that was already drained (an immediate
//! message issued after the execution layer collected the current slot) is delivered in the first
//! slot after the last drain instead, so every envelope is handed out exactly once.

// Import client and logical channel identifiers carried by messages
use crate::context::{ClientId, Lcid};
// Import modulation index carried by grants
use crate::link::Mcs;
// Import direction of HARQ feedback
use crate::priority::Direction;
// Import instance tag stamped on every envelope
use crate::routing::InstanceId;
// Import slot keys and layout for delivery arithmetic
use crate::slot::{Numerology, SlotKey};
// Import serde derives for message tracing
use serde::{Deserialize, Serialize};
// Import FIFO buckets, one per pending slot
use std::collections::VecDeque;
// Import logging macros
use tracing::{debug, warn};

/// Default number of slots between origination and delivery.
pub const DEFAULT_CONTROL_LATENCY: u32 = 2;

/// HARQ acknowledgement for one transport block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarqFeedback {
    pub client: ClientId,
    pub process: u8,
    pub direction: Direction,
    pub ack: bool,
    /// Instance that issued the grant being acknowledged.
    pub instance: InstanceId,
}

/// Control signalling exchanged between the scheduler and the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Downlink assignment for `slot`.
    DownlinkGrant {
        client: ClientId,
        slot: SlotKey,
        units: u32,
        mcs: Mcs,
    },
    /// Uplink grant for `slot`.
    UplinkGrant {
        client: ClientId,
        slot: SlotKey,
        units: u32,
        mcs: Mcs,
    },
    /// HARQ ACK/NACK.
    HarqFeedback(HarqFeedback),
    /// Queued uplink bytes reported for one logical channel.
    BufferStatus {
        client: ClientId,
        lcid: Lcid,
        bytes: u64,
    },
    /// Client asks for an uplink grant without a detailed report.
    SchedulingRequest { client: ClientId },
    /// Answer to a random-access preamble.
    RachResponse { preamble: u8, client: ClientId },
}

impl ControlMessage {
    /// Client the message concerns.
    pub fn client(&self) -> ClientId {
        match self {
            ControlMessage::DownlinkGrant { client, .. }
            | ControlMessage::UplinkGrant { client, .. }
            | ControlMessage::BufferStatus { client, .. }
            | ControlMessage::SchedulingRequest { client }
            | ControlMessage::RachResponse { client, .. } => *client,
            ControlMessage::HarqFeedback(feedback) => feedback.client,
        }
    }
}

/// A control message stamped with its timing and owning instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEnvelope {
    pub message: ControlMessage,
    pub origin: SlotKey,
    pub delivery: SlotKey,
    pub instance: InstanceId,
}

/// Fixed-latency delivery queue for control messages.
#[derive(Debug, Clone)]
pub struct ControlDelayLine {
    numerology: Numerology,
    latency: u32,
    instance: InstanceId,
    current: SlotKey,
    /// Most recent slot handed to [`ControlDelayLine::pop_current_slot_messages`].
    drained: Option<SlotKey>,
    buckets: Vec<VecDeque<ControlEnvelope>>,
}

impl ControlDelayLine {
    /// Delay line whose current slot starts at `start`.
    ///
    /// The ring holds `latency + 1` buckets: one for the current slot and one for each slot a
    /// latency-delayed message can target.
    ///
    /// # Arguments
    /// * `numerology` - frame layout used to turn slot keys into ring positions
    /// * `latency` - slots between origin and delivery for [`Self::enqueue`]
    /// * `instance` - tag stamped on every envelope
    /// * `start` - initial current slot; nothing counts as drained yet
    pub fn new(numerology: Numerology, latency: u32, instance: InstanceId, start: SlotKey) -> Self {
        let depth = latency as usize + 1;
        Self {
            numerology,
            latency,
            instance,
            current: start,
            drained: None,
            buckets: (0..depth).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn current_slot(&self) -> SlotKey {
        self.current
    }

    /// Move the notion of "now" used by [`Self::enqueue_now`].
    pub fn set_current_slot(&mut self, slot: SlotKey) {
        self.current = slot;
    }

    fn bucket_of(&self, slot: SlotKey) -> usize {
        (self.numerology.index(slot) % self.buckets.len() as u64) as usize
    }

    /// Earliest slot that can still be drained.
    fn first_undrained(&self) -> Option<SlotKey> {
        self.drained
            .map(|drained| self.numerology.advance(drained, 1))
    }

    fn push(&mut self, message: ControlMessage, origin: SlotKey, delivery: SlotKey) -> SlotKey {
        let delivery = match self.first_undrained() {
            Some(earliest) if delivery.is_before(&earliest) => {
                debug!(
                    instance = %self.instance,
                    requested = %delivery,
                    delivery = %earliest,
                    "slot already drained, deferring control message"
                );
                earliest
            }
            _ => delivery,
        };
        let bucket = self.bucket_of(delivery);
        self.buckets[bucket].push_back(ControlEnvelope {
            message,
            origin,
            delivery,
            instance: self.instance,
        });
        delivery
    }

    /// Store `message` for delivery `latency` slots after `origin`.
    ///
    /// # Arguments
    /// * `message` - control message to deliver
    /// * `origin` - slot in which the message was produced
    ///
    /// # Returns
    /// The slot in which [`Self::pop_current_slot_messages`] will hand the message out:
    /// `origin + latency`, or the first undrained slot if that one was already collected.
    pub fn enqueue(&mut self, message: ControlMessage, origin: SlotKey) -> SlotKey {
        let delivery = self.numerology.advance(origin, u64::from(self.latency));
        self.push(message, origin, delivery)
    }

    /// Store `message` for delivery in the current slot, bypassing the latency.
    ///
    /// When the current slot was already drained, the message goes out with the next slot.
    ///
    /// # Returns
    /// The delivery slot.
    pub fn enqueue_now(&mut self, message: ControlMessage) -> SlotKey {
        let now = self.current;
        self.push(message, now, now)
    }

    /// Store every message of `messages`, in order, for delivery in the current slot.
    pub fn enqueue_now_batch(&mut self, messages: impl IntoIterator<Item = ControlMessage>) {
        for message in messages {
            self.enqueue_now(message);
        }
    }

    /// Drain the envelopes due in `slot`, in enqueue order.
    ///
    /// Envelopes for later slots that share the bucket stay queued. Envelopes whose delivery slot
    /// already passed were never collected in time; they are dropped with a warning. `slot`
    /// becomes both the current and the last drained slot.
    ///
    /// # Arguments
    /// * `slot` - slot the execution layer is about to run
    ///
    /// # Returns
    /// Every envelope whose delivery slot is `slot`; empty on a second call for the same slot.
    pub fn pop_current_slot_messages(&mut self, slot: SlotKey) -> Vec<ControlEnvelope> {
        self.current = slot;
        self.drained = Some(slot);
        let bucket = self.bucket_of(slot);
        let queued = std::mem::take(&mut self.buckets[bucket]);
        let mut due = Vec::new();
        for envelope in queued {
            if envelope.delivery == slot {
                due.push(envelope);
            } else if envelope.delivery.is_before(&slot) {
                warn!(
                    instance = %self.instance,
                    delivery = %envelope.delivery,
                    now = %slot,
                    "dropping stale control message"
                );
            } else {
                self.buckets[bucket].push_back(envelope);
            }
        }
        due
    }

    /// Whether nothing is due in `slot`.
    ///
    /// # Returns
    /// `true` when [`Self::pop_current_slot_messages`] for `slot` would return an empty vector.
    /// Stale envelopes sharing the bucket do not count.
    pub fn is_empty_for_slot(&self, slot: SlotKey) -> bool {
        !self.buckets[self.bucket_of(slot)]
            .iter()
            .any(|envelope| envelope.delivery == slot)
    }

    /// Whether nothing is queued for any slot.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    /// Number of queued envelopes across all slots.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }
}
