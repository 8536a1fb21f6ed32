//! Scheduler configuration.
//!
//! Everything that shapes scheduling behavior (layout, capacity, policy knobs, latencies) is a
//! field here and threaded through construction. Every section has a `Default` so a partial TOML
//! file only needs the keys it changes.

// Import default EMA horizon
use crate::context::DEFAULT_TIME_WINDOW;
// Import default control latency
use crate::control::DEFAULT_CONTROL_LATENCY;
// Import crate error type for validation failures
use crate::error::{Result, SchedulerError};
// Import MCS table to check that a unit carries data
use crate::link::{Mcs, McsTableLink};
// Import per-direction table for offered units
use crate::priority::{Direction, DirectionTable};
// Import instance identity
use crate::routing::InstanceId;
// Import policy selection and construction
use crate::scheduler::policy::{Policy, PolicyKind};
// Import frame layout
use crate::slot::Numerology;
// Import serde derives for TOML parsing
use serde::{Deserialize, Serialize};
// Import path type for file loading
use std::path::Path;

/// Upper bound on the control latency, in slots. The delay line allocates one bucket per slot.
pub const MAX_CONTROL_LATENCY: u32 = 1024;

/// Resource grid capacity and grant granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Resource units (resource-block groups) offered per downlink slot.
    pub downlink_units: u32,
    /// Resource units offered per uplink slot.
    pub uplink_units: u32,
    /// Units handed out per engine iteration (smaller if the winner needs less).
    pub min_assignable_units: u32,
    /// Data resource elements carried by one unit, used by the MCS table link model.
    pub resource_elements_per_unit: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            downlink_units: 25,
            uplink_units: 25,
            min_assignable_units: 1,
            resource_elements_per_unit: 4 * 12 * 12,
        }
    }
}

impl ResourceConfig {
    /// Offered units as a per-direction table.
    pub fn units(&self) -> DirectionTable<u32> {
        DirectionTable::from_fn(|direction| match direction {
            Direction::Downlink => self.downlink_units,
            Direction::Uplink => self.uplink_units,
        })
    }
}

/// Policy selection and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Alpha in `potential^alpha / average`.
    pub fairness_exponent: f64,
    /// EMA horizon, in slots.
    pub time_window: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::default(),
            fairness_exponent: 0.0,
            time_window: DEFAULT_TIME_WINDOW,
        }
    }
}

impl PolicyConfig {
    /// Build the immutable policy.
    pub fn build(&self) -> Result<Policy> {
        Policy::new(self.kind, self.fairness_exponent, self.time_window)
    }
}

/// Top-level configuration of one scheduler instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub instance: InstanceId,
    pub numerology: Numerology,
    pub resources: ResourceConfig,
    pub policy: PolicyConfig,
    /// Slots between control message origination and delivery.
    pub control_latency: u32,
    /// How many slots ahead of the clock a decision is made.
    pub scheduling_lead: u32,
    /// Uplink bytes assumed for a client that sent a scheduling request with nothing reported.
    pub scheduling_request_bytes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            instance: InstanceId::default(),
            numerology: Numerology::default(),
            resources: ResourceConfig::default(),
            policy: PolicyConfig::default(),
            control_latency: DEFAULT_CONTROL_LATENCY,
            scheduling_lead: DEFAULT_CONTROL_LATENCY,
            scheduling_request_bytes: 64,
        }
    }
}

impl SchedulerConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SchedulerConfig = toml::from_str(contents)
            .map_err(|err| SchedulerError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            SchedulerError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        Numerology::with_layout(
            self.numerology.subframes_per_frame,
            self.numerology.slots_per_subframe,
        )?;
        if self.resources.min_assignable_units == 0 {
            return Err(SchedulerError::InvalidConfig(
                "min_assignable_units must be at least 1".into(),
            ));
        }
        let lowest = McsTableLink::new(self.resources.resource_elements_per_unit, Mcs(0));
        if lowest.min_bits_per_unit() == 0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "resource_elements_per_unit {} carries no bits at the lowest MCS",
                self.resources.resource_elements_per_unit
            )));
        }
        if self.control_latency > MAX_CONTROL_LATENCY {
            return Err(SchedulerError::InvalidConfig(format!(
                "control_latency {} exceeds {MAX_CONTROL_LATENCY}",
                self.control_latency
            )));
        }
        self.policy.build()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.control_latency, 2);
        assert_eq!(config.policy.time_window, 99.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            instance = 3
            control_latency = 4

            [resources]
            downlink_units = 50

            [policy]
            kind = "proportional_fair"
            fairness_exponent = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.instance, InstanceId(3));
        assert_eq!(config.control_latency, 4);
        assert_eq!(config.resources.downlink_units, 50);
        assert_eq!(config.resources.uplink_units, 25);
        assert_eq!(config.policy.kind, PolicyKind::ProportionalFair);
        assert_eq!(config.policy.time_window, 99.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_step = SchedulerConfig {
            resources: ResourceConfig {
                min_assignable_units: 0,
                ..ResourceConfig::default()
            },
            ..SchedulerConfig::default()
        };
        assert!(zero_step.validate().is_err());
        assert!(SchedulerConfig::from_toml_str("[policy]\ntime_window = 0.0").is_err());
        assert!(SchedulerConfig::from_toml_str("[numerology]\nslots_per_subframe = 0").is_err());
        assert!(SchedulerConfig::from_toml_str("control_latency = \"two\"").is_err());
        assert!(SchedulerConfig::from_toml_str(
            "[resources]\nresource_elements_per_unit = 4"
        )
        .is_err());
        assert!(SchedulerConfig::from_toml_str(
            "[resources]\nresource_elements_per_unit = 5"
        )
        .is_ok());
        assert!(matches!(
            SchedulerConfig::load("/nonexistent/slot-scheduler.toml"),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }
}
