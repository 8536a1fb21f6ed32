pub mod allocation;
pub mod config;
pub mod context;
pub mod control;
pub mod error;
pub mod link;
pub mod metrics;
pub mod priority;
pub mod routing;
pub mod scheduler;
pub mod slot;

// Re-export the types a driver needs to run an instance
pub use allocation::{Grant, SlotAllocationQueue, SlotAllocationRecord};
pub use config::{PolicyConfig, ResourceConfig, SchedulerConfig};
pub use context::{BearerConfig, ClientConfig, ClientContext, ClientId, ClientTable, Lcid};
pub use control::{ControlDelayLine, ControlEnvelope, ControlMessage, HarqFeedback};
pub use error::{Result, SchedulerError};
pub use link::{FixedLink, LinkQuality, Mcs, McsTableLink};
pub use metrics::{ClientReport, SchedulerStats};
pub use priority::{Direction, DirectionTable, PriorityClass};
pub use routing::{BandwidthPartRouter, InstanceId, PriorityRouter};
pub use scheduler::policy::{Policy, PolicyKind};
pub use scheduler::SlotScheduler;
pub use slot::{Numerology, SlotKey};
