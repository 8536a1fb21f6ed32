//! Client scheduling context and throughput metric model.
//!
//! Every attached client owns one [`ClientContext`]: its logical channels (backlog + priority
//! class) and, per direction, a [`ThroughputMetric`] tracking current, average and potential
//! throughput. Contexts live in a [`ClientTable`], which is their only owner. Collaborators outside
//! the scheduler address a client through its [`ClientId`] and can only read the context.

// Import crate error type for attach/detach failures
use crate::error::{Result, SchedulerError};
// Import modulation index recorded per slot
use crate::link::Mcs;
// Import direction tables and bearer priority classes
use crate::priority::{Direction, DirectionTable, PriorityClass};
// Import serde derives for configs and reports
use serde::{Deserialize, Serialize};
// Import ordered map so iteration follows client id
use std::collections::BTreeMap;
// Import formatting for client ids
use std::fmt;
// Import slot period type for throughput conversion
use std::time::Duration;

/// Averages below this value are treated as this value when used as a divisor.
///
/// Keeps new or starved clients at maximal weight instead of dividing by zero.
pub const AVERAGE_THROUGHPUT_FLOOR: f64 = 1e-9;

/// Default EMA time window, in slots.
pub const DEFAULT_TIME_WINDOW: f64 = 99.0;

/// Stable handle for an attached client.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Logical channel identifier within one client.
pub type Lcid = u8;

/// Bearer configuration supplied at attach time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerConfig {
    pub lcid: Lcid,
    #[serde(default)]
    pub priority: PriorityClass,
    #[serde(default)]
    pub downlink_backlog: u64,
    #[serde(default)]
    pub uplink_backlog: u64,
}

impl BearerConfig {
    pub fn new(lcid: Lcid, priority: PriorityClass) -> Self {
        Self {
            lcid,
            priority,
            downlink_backlog: 0,
            uplink_backlog: 0,
        }
    }

    /// Set the initial backlog, in bytes, for both directions.
    pub fn with_backlog(mut self, downlink: u64, uplink: u64) -> Self {
        self.downlink_backlog = downlink;
        self.uplink_backlog = uplink;
        self
    }
}

/// Per-client attach input: the client handle and its bearers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub id: ClientId,
    #[serde(default)]
    pub bearers: Vec<BearerConfig>,
}

impl ClientConfig {
    pub fn new(id: ClientId, bearers: Vec<BearerConfig>) -> Self {
        Self { id, bearers }
    }
}

/// Queued data of one logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalChannel {
    pub lcid: Lcid,
    pub priority: PriorityClass,
    /// Queued bytes per direction.
    pub backlog: DirectionTable<u64>,
}

/// Exponentially smoothed throughput state for one client in one direction.
///
/// Throughput values are in bits per second. The average is updated from a snapshot taken at the
/// start of the slot (`last_average`), so recomputing it several times inside one slot (once per
/// engine iteration) always yields the value for the slot's cumulative assignment and never
/// compounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputMetric {
    window: f64,
    last_average: f64,
    average: f64,
    current: f64,
    potential: f64,
    assigned_units: u32,
    mcs: Mcs,
    bits_per_unit: u64,
    slot_seconds: f64,
    delivered_bits: u64,
    last_service: Option<u64>,
}

impl ThroughputMetric {
    /// Fresh metric with all throughputs at zero.
    pub fn new(window: f64) -> Self {
        Self {
            window,
            last_average: 0.0,
            average: 0.0,
            current: 0.0,
            potential: 0.0,
            assigned_units: 0,
            mcs: Mcs::default(),
            bits_per_unit: 0,
            slot_seconds: 0.0,
            delivered_bits: 0,
            last_service: None,
        }
    }

    /// Snapshot the average and reset per-slot state.
    pub fn begin_slot(&mut self, mcs: Mcs, bits_per_unit: u64, slot_period: Duration) {
        self.last_average = self.average;
        self.current = 0.0;
        self.potential = 0.0;
        self.assigned_units = 0;
        self.mcs = mcs;
        self.bits_per_unit = bits_per_unit;
        self.slot_seconds = slot_period.as_secs_f64();
    }

    /// Apply the EMA with `current` as this slot's throughput.
    ///
    /// `average = last_average * (1 - 1/W) + current / W`
    pub fn record(&mut self, current: f64) {
        self.current = current;
        self.average = self.last_average * (1.0 - 1.0 / self.window) + current / self.window;
    }

    /// Convert a unit count into throughput for the current slot.
    pub fn throughput_of(&self, units: u32) -> f64 {
        if self.slot_seconds <= 0.0 {
            return 0.0;
        }
        (self.bits_per_unit * u64::from(units)) as f64 / self.slot_seconds
    }

    pub fn average(&self) -> f64 {
        self.average
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn potential(&self) -> f64 {
        self.potential
    }

    pub fn assigned_units(&self) -> u32 {
        self.assigned_units
    }

    pub fn mcs(&self) -> Mcs {
        self.mcs
    }

    pub fn bits_per_unit(&self) -> u64 {
        self.bits_per_unit
    }

    /// Bits carried by every grant since attach.
    pub fn delivered_bits(&self) -> u64 {
        self.delivered_bits
    }

    /// Service stamp of the most recent grant, `None` if never served.
    pub fn last_service(&self) -> Option<u64> {
        self.last_service
    }
}

/// Scheduling state of one attached client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientContext {
    id: ClientId,
    channels: BTreeMap<Lcid, LogicalChannel>,
    metrics: DirectionTable<ThroughputMetric>,
}

impl ClientContext {
    /// Build a context from bearer configuration. Throughputs and averages start at zero.
    pub fn new(config: &ClientConfig, time_window: f64) -> Self {
        let channels = config
            .bearers
            .iter()
            .map(|bearer| {
                (
                    bearer.lcid,
                    LogicalChannel {
                        lcid: bearer.lcid,
                        priority: bearer.priority,
                        backlog: DirectionTable::from_fn(|direction| match direction {
                            Direction::Downlink => bearer.downlink_backlog,
                            Direction::Uplink => bearer.uplink_backlog,
                        }),
                    },
                )
            })
            .collect();
        Self {
            id: config.id,
            channels,
            metrics: DirectionTable::from_fn(|_| ThroughputMetric::new(time_window)),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn channels(&self) -> impl Iterator<Item = &LogicalChannel> {
        self.channels.values()
    }

    pub fn channel(&self, lcid: Lcid) -> Option<&LogicalChannel> {
        self.channels.get(&lcid)
    }

    pub fn metric(&self, direction: Direction) -> &ThroughputMetric {
        &self.metrics[direction]
    }

    /// Total queued bytes in `direction`.
    pub fn backlog_bytes(&self, direction: Direction) -> u64 {
        self.channels
            .values()
            .map(|channel| channel.backlog[direction])
            .sum()
    }

    /// Priority class of the most urgent channel with data queued in `direction`.
    pub fn highest_priority(&self, direction: Direction) -> Option<PriorityClass> {
        self.channels
            .values()
            .filter(|channel| channel.backlog[direction] > 0)
            .map(|channel| channel.priority)
            .min()
    }

    /// Resource units needed to empty the backlog at the current slot's MCS.
    pub fn demand_units(&self, direction: Direction) -> u32 {
        let bits_per_unit = self.metrics[direction].bits_per_unit;
        if bits_per_unit == 0 {
            return 0;
        }
        let bits = self.backlog_bytes(direction).saturating_mul(8);
        u32::try_from(bits.div_ceil(bits_per_unit)).unwrap_or(u32::MAX)
    }

    /// Replace the backlog of one logical channel. Returns `false` for an unknown channel.
    pub(crate) fn set_backlog(&mut self, lcid: Lcid, direction: Direction, bytes: u64) -> bool {
        match self.channels.get_mut(&lcid) {
            Some(channel) => {
                channel.backlog[direction] = bytes;
                true
            }
            None => false,
        }
    }

    /// Add a logical channel, or update the priority of an existing one.
    pub(crate) fn upsert_channel(&mut self, lcid: Lcid, priority: PriorityClass) {
        self.channels
            .entry(lcid)
            .and_modify(|channel| channel.priority = priority)
            .or_insert_with(|| LogicalChannel {
                lcid,
                priority,
                backlog: DirectionTable::default(),
            });
    }

    /// Remove up to `bytes` from the backlog, most urgent channel first (ties by lcid).
    pub(crate) fn drain(&mut self, direction: Direction, mut bytes: u64) {
        let mut order: Vec<(PriorityClass, Lcid)> = self
            .channels
            .values()
            .filter(|channel| channel.backlog[direction] > 0)
            .map(|channel| (channel.priority, channel.lcid))
            .collect();
        order.sort_unstable();
        for (_, lcid) in order {
            if bytes == 0 {
                break;
            }
            if let Some(channel) = self.channels.get_mut(&lcid) {
                let taken = channel.backlog[direction].min(bytes);
                channel.backlog[direction] -= taken;
                bytes -= taken;
            }
        }
    }

    /// Start a new slot in `direction`: snapshot the average and reset per-slot state.
    pub(crate) fn begin_slot(
        &mut self,
        direction: Direction,
        mcs: Mcs,
        bits_per_unit: u64,
        slot_period: Duration,
    ) {
        self.metrics[direction].begin_slot(mcs, bits_per_unit, slot_period);
    }

    /// Estimate the throughput of a minimal grant. Zero when nothing is queued.
    pub fn compute_potential(&mut self, direction: Direction, minimum_units: u32) -> f64 {
        let potential = if self.backlog_bytes(direction) == 0 {
            0.0
        } else {
            self.metrics[direction].throughput_of(minimum_units)
        };
        self.metrics[direction].potential = potential;
        potential
    }

    /// Account `assigned_units` more units this slot and refresh the metric from the slot total.
    pub fn update_metric_after_assignment(&mut self, direction: Direction, assigned_units: u32) {
        let metric = &mut self.metrics[direction];
        metric.assigned_units = metric.assigned_units.saturating_add(assigned_units);
        metric.delivered_bits += metric.bits_per_unit * u64::from(assigned_units);
        let current = metric.throughput_of(metric.assigned_units);
        metric.record(current);
    }

    /// Refresh the metric without a new grant. Current throughput reflects whatever the client
    /// already holds this slot, which is zero for a client that was never served.
    pub fn update_metric_not_assigned(&mut self, direction: Direction) {
        let metric = &mut self.metrics[direction];
        let current = metric.throughput_of(metric.assigned_units);
        metric.record(current);
    }

    pub(crate) fn stamp_service(&mut self, direction: Direction, stamp: u64) {
        self.metrics[direction].last_service = Some(stamp);
    }
}

/// Owner of every attached client's context.
///
/// Iteration is ordered by [`ClientId`] so scheduling passes are reproducible.
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: BTreeMap<ClientId, ClientContext>,
    service_counter: u64,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a context. Fails if its id is already attached.
    pub fn attach(&mut self, context: ClientContext) -> Result<ClientId> {
        let id = context.id();
        if self.clients.contains_key(&id) {
            return Err(SchedulerError::DuplicateClient(id));
        }
        self.clients.insert(id, context);
        Ok(id)
    }

    /// Remove and return a context.
    pub fn detach(&mut self, id: ClientId) -> Result<ClientContext> {
        self.clients
            .remove(&id)
            .ok_or(SchedulerError::UnknownClient(id))
    }

    pub fn get(&self, id: ClientId) -> Option<&ClientContext> {
        self.clients.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ClientId) -> Option<&mut ClientContext> {
        self.clients.get_mut(&id)
    }

    pub(crate) fn contexts_mut(&mut self) -> impl Iterator<Item = &mut ClientContext> {
        self.clients.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientContext> {
        self.clients.values()
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Monotonic stamp recording the order in which grants were made.
    pub(crate) fn next_service_stamp(&mut self) -> u64 {
        self.service_counter += 1;
        self.service_counter
    }
}
