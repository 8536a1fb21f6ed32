//! Multi-instance routing contract.
//!
//! Each scheduler instance serves one bandwidth part and owns disjoint state. A router sitting
//! above the instances decides which one receives a piece of feedback or control signalling. The
//! scheduler itself only tags what it emits with its own [`InstanceId`] and refuses envelopes
//! addressed elsewhere.

// Import bearer identifiers used as routing keys
use crate::context::{ClientId, Lcid};
// Import the messages being routed
use crate::control::{ControlMessage, HarqFeedback};
// Import priority class mapped onto instances
use crate::priority::PriorityClass;
// Import serde derives for the instance id
use serde::{Deserialize, Serialize};
// Import maps for class and bearer lookups
use std::collections::{BTreeMap, HashMap};
// Import formatting for instance ids
use std::fmt;

/// Identity of one scheduler instance (bandwidth part).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(pub u8);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bwp{}", self.0)
    }
}

/// Hooks an external router implements to steer traffic between scheduler instances.
pub trait BandwidthPartRouter {
    /// Instance that must receive this HARQ feedback.
    fn route_inbound_feedback(&self, feedback: &HarqFeedback) -> InstanceId;

    /// Instance that must carry an outgoing control message produced on `source`.
    fn route_outbound_control(&self, message: &ControlMessage, source: InstanceId) -> InstanceId;

    /// Instance that must process an incoming control message received on `source`.
    fn route_inbound_control(&self, _message: &ControlMessage, source: InstanceId) -> InstanceId {
        source
    }
}

/// Router mapping bearer priority classes onto instances.
///
/// Bearers are registered with their priority class; each class may be pinned to an instance.
/// Buffer status reports follow their bearer's instance, HARQ feedback returns to the instance
/// that issued the grant, scheduling requests go to the primary instance, and everything else
/// stays where it was produced.
#[derive(Debug, Clone, Default)]
pub struct PriorityRouter {
    primary: InstanceId,
    by_priority: BTreeMap<PriorityClass, InstanceId>,
    bearers: HashMap<(ClientId, Lcid), PriorityClass>,
}

impl PriorityRouter {
    pub fn new(primary: InstanceId) -> Self {
        Self {
            primary,
            ..Self::default()
        }
    }

    /// Serve every bearer of `priority` on `instance`.
    pub fn map_priority(&mut self, priority: PriorityClass, instance: InstanceId) {
        self.by_priority.insert(priority, instance);
    }

    /// Remember the priority class of a client's logical channel.
    pub fn register_bearer(&mut self, client: ClientId, lcid: Lcid, priority: PriorityClass) {
        self.bearers.insert((client, lcid), priority);
    }

    /// Forget every bearer of a detached client.
    pub fn forget_client(&mut self, client: ClientId) {
        self.bearers.retain(|(owner, _), _| *owner != client);
    }

    /// Instance serving a client's logical channel, primary if unknown.
    pub fn instance_for_bearer(&self, client: ClientId, lcid: Lcid) -> InstanceId {
        self.bearers
            .get(&(client, lcid))
            .and_then(|priority| self.by_priority.get(priority))
            .copied()
            .unwrap_or(self.primary)
    }
}

impl BandwidthPartRouter for PriorityRouter {
    fn route_inbound_feedback(&self, feedback: &HarqFeedback) -> InstanceId {
        feedback.instance
    }

    fn route_outbound_control(&self, message: &ControlMessage, source: InstanceId) -> InstanceId {
        match message {
            ControlMessage::BufferStatus { client, lcid, .. } => {
                self.instance_for_bearer(*client, *lcid)
            }
            ControlMessage::SchedulingRequest { .. } => self.primary,
            _ => source,
        }
    }
}
