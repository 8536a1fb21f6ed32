//! Scheduling policies: the comparator and metric-update rules plugged into the assignment engine.
//!
//! A [`Policy`] is chosen by configuration when the scheduler is built and never changes after.
//! The engine only ever talks to the policy through five hooks:
//!
//! - [`Policy::create_context`]: build a client context at attach time
//! - [`Policy::before_schedule`]: refresh per-slot inputs (potential throughput)
//! - [`Policy::compare`]: total order deciding which client is served next
//! - [`Policy::on_assigned`] / [`Policy::on_not_assigned`]: metric updates after each iteration
//!
//! Variants:
//! - `RoundRobin`: fewest units this slot first, then least recently served
//! - `ProportionalFair`: highest `potential^alpha / average` first
//! - `QosWeighted`: most urgent bearer priority class first, proportional fair within a class

// Import client contexts and metric constants
use crate::context::{ClientConfig, ClientContext, AVERAGE_THROUGHPUT_FLOOR, DEFAULT_TIME_WINDOW};
// Import crate error type for parameter validation
use crate::error::{Result, SchedulerError};
// Import direction and priority ordering
use crate::priority::{Direction, PriorityClass};
// Import serde derives for the policy kind
use serde::{Deserialize, Serialize};
// Import ordering returned by the comparator
use std::cmp::Ordering;
// Import formatting for log fields
use std::fmt;

/// Which comparator/metric rule set is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RoundRobin,
    ProportionalFair,
    #[default]
    QosWeighted,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyKind::RoundRobin => "round_robin",
            PolicyKind::ProportionalFair => "proportional_fair",
            PolicyKind::QosWeighted => "qos_weighted",
        };
        write!(f, "{label}")
    }
}

/// Immutable policy selected at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    kind: PolicyKind,
    fairness_exponent: f64,
    time_window: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            fairness_exponent: 0.0,
            time_window: DEFAULT_TIME_WINDOW,
        }
    }
}

impl Policy {
    /// Build a policy.
    ///
    /// # Arguments
    /// * `kind` - comparator/metric rule set
    /// * `fairness_exponent` - alpha in `potential^alpha / average`; 0 ignores raw throughput,
    ///   larger values skew toward clients with better links
    /// * `time_window` - EMA horizon in slots; must be at least 1
    ///
    /// # Errors
    /// `InvalidConfig` if the exponent is negative or not finite, or the window is below 1.
    pub fn new(kind: PolicyKind, fairness_exponent: f64, time_window: f64) -> Result<Self> {
        if !fairness_exponent.is_finite() || fairness_exponent < 0.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "fairness exponent must be finite and non-negative, got {fairness_exponent}"
            )));
        }
        if !time_window.is_finite() || time_window < 1.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "time window must be at least one slot, got {time_window}"
            )));
        }
        Ok(Self {
            kind,
            fairness_exponent,
            time_window,
        })
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn fairness_exponent(&self) -> f64 {
        self.fairness_exponent
    }

    pub fn time_window(&self) -> f64 {
        self.time_window
    }

    /// Build the context of a newly attached client.
    pub fn create_context(&self, config: &ClientConfig) -> ClientContext {
        ClientContext::new(config, self.time_window)
    }

    /// Refresh the inputs the comparator reads before the first iteration of a slot.
    pub fn before_schedule(
        &self,
        context: &mut ClientContext,
        direction: Direction,
        minimum_units: u32,
    ) {
        context.compute_potential(direction, minimum_units);
    }

    /// Ranking weight `potential^alpha / max(average, floor)`; zero when nothing can be sent.
    pub fn weight(&self, context: &ClientContext, direction: Direction) -> f64 {
        let metric = context.metric(direction);
        if metric.potential() <= 0.0 {
            return 0.0;
        }
        let average = metric.average().max(AVERAGE_THROUGHPUT_FLOOR);
        metric.potential().powf(self.fairness_exponent) / average
    }

    /// Total order over clients: `Ordering::Less` means `a` is served before `b`.
    ///
    /// Every variant ends with ascending client id so equal inputs always produce the same order.
    pub fn compare(&self, a: &ClientContext, b: &ClientContext, direction: Direction) -> Ordering {
        let ranked = match self.kind {
            PolicyKind::RoundRobin => {
                let (ma, mb) = (a.metric(direction), b.metric(direction));
                ma.assigned_units()
                    .cmp(&mb.assigned_units())
                    .then_with(|| ma.last_service().cmp(&mb.last_service()))
            }
            PolicyKind::ProportionalFair => self.compare_weight(a, b, direction),
            PolicyKind::QosWeighted => {
                let pa = a.highest_priority(direction).unwrap_or(PriorityClass::LOWEST);
                let pb = b.highest_priority(direction).unwrap_or(PriorityClass::LOWEST);
                pa.cmp(&pb)
                    .then_with(|| self.compare_weight(a, b, direction))
            }
        };
        ranked.then_with(|| a.id().cmp(&b.id()))
    }

    /// Descending weight.
    fn compare_weight(
        &self,
        a: &ClientContext,
        b: &ClientContext,
        direction: Direction,
    ) -> Ordering {
        self.weight(b, direction).total_cmp(&self.weight(a, direction))
    }

    /// Metric update for the client that won this iteration.
    pub fn on_assigned(&self, context: &mut ClientContext, direction: Direction, units: u32) {
        context.update_metric_after_assignment(direction, units);
    }

    /// Metric update for a client that did not win this iteration (or was never eligible).
    pub fn on_not_assigned(&self, context: &mut ClientContext, direction: Direction) {
        context.update_metric_not_assigned(direction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BearerConfig, ClientId};
    use crate::link::Mcs;
    use std::time::Duration;

    fn context(policy: &Policy, id: u32, priority: u8, backlog: u64) -> ClientContext {
        let mut ctx = policy.create_context(&ClientConfig::new(
            ClientId(id),
            vec![BearerConfig::new(1, PriorityClass(priority)).with_backlog(backlog, 0)],
        ));
        ctx.begin_slot(Direction::Downlink, Mcs(5), 100, Duration::from_millis(1));
        policy.before_schedule(&mut ctx, Direction::Downlink, 1);
        ctx
    }

    #[test]
    fn qos_prefers_lower_priority_value() {
        let policy = Policy::new(PolicyKind::QosWeighted, 1.0, 99.0).unwrap();
        let urgent = context(&policy, 9, 1, 500);
        let bulk = context(&policy, 1, 8, 500);
        assert_eq!(policy.compare(&urgent, &bulk, Direction::Downlink), Ordering::Less);
    }

    #[test]
    fn equal_inputs_order_by_client_id() {
        for kind in [
            PolicyKind::RoundRobin,
            PolicyKind::ProportionalFair,
            PolicyKind::QosWeighted,
        ] {
            let policy = Policy::new(kind, 1.0, 99.0).unwrap();
            let a = context(&policy, 3, 5, 500);
            let b = context(&policy, 4, 5, 500);
            for _ in 0..3 {
                assert_eq!(policy.compare(&a, &b, Direction::Downlink), Ordering::Less);
                assert_eq!(policy.compare(&b, &a, Direction::Downlink), Ordering::Greater);
            }
        }
    }

    #[test]
    fn starved_client_outranks_served_client() {
        let policy = Policy::new(PolicyKind::ProportionalFair, 1.0, 99.0).unwrap();
        let mut served = context(&policy, 1, 5, 500);
        policy.on_assigned(&mut served, Direction::Downlink, 4);
        let starved = context(&policy, 2, 5, 500);
        assert_eq!(policy.compare(&starved, &served, Direction::Downlink), Ordering::Less);
    }

    #[test]
    fn zero_backlog_has_zero_weight() {
        let policy = Policy::default();
        let idle = context(&policy, 1, 5, 0);
        assert_eq!(policy.weight(&idle, Direction::Downlink), 0.0);
    }

    #[test]
    fn round_robin_prefers_fewer_units() {
        let policy = Policy::new(PolicyKind::RoundRobin, 0.0, 99.0).unwrap();
        let mut first = context(&policy, 1, 5, 500);
        policy.on_assigned(&mut first, Direction::Downlink, 1);
        let second = context(&policy, 2, 5, 500);
        assert_eq!(policy.compare(&second, &first, Direction::Downlink), Ordering::Less);
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(Policy::new(PolicyKind::QosWeighted, -1.0, 99.0).is_err());
        assert!(Policy::new(PolicyKind::QosWeighted, f64::NAN, 99.0).is_err());
        assert!(Policy::new(PolicyKind::QosWeighted, 1.0, 0.5).is_err());
    }
}
