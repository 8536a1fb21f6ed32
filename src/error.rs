//! Error types shared by the scheduler components.
//!
//! Every variant is a precondition violation detected at a component boundary. The offending call
//! returns the error without touching shared state, so a caller that treats these as fatal never
//! observes a half-applied operation. Valid empty states (no clients, no resources, no messages)
//! are never reported as errors.

// Import client handle named by client errors
use crate::context::ClientId;
// Import instance identity named by routing errors
use crate::routing::InstanceId;
// Import slot key named by queue errors
use crate::slot::SlotKey;
// Import derive for Display and Error impls
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors raised by the scheduler, the allocation queue, and the control delay line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// A record was pushed whose key is not strictly after the newest queued key.
    #[error("allocation for {key} pushed out of order (newest queued slot is {newest})")]
    OutOfOrderRecord { key: SlotKey, newest: SlotKey },

    /// A record already exists for this slot.
    #[error("an allocation record already exists for {0}")]
    DuplicateRecord(SlotKey),

    /// No record is queued for the requested slot.
    #[error("no allocation record queued for {0}")]
    MissingRecord(SlotKey),

    /// Head retrieval on an empty allocation queue.
    #[error("allocation queue is empty")]
    EmptyQueue,

    /// The units assigned in one direction exceed what the slot offers.
    #[error("{direction} overcommitted: {assigned} units assigned, {available} available")]
    Overcommit {
        direction: crate::priority::Direction,
        assigned: u32,
        available: u32,
    },

    /// The client handle does not refer to an attached client.
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    /// Attach was requested for an id that is already attached.
    #[error("client {0} is already attached")]
    DuplicateClient(ClientId),

    /// A control message addressed to another scheduler instance reached this one.
    #[error("message for instance {target} delivered to instance {local}")]
    MisroutedMessage { target: InstanceId, local: InstanceId },

    /// A client has queued data but its link carries no bits per resource unit.
    #[error("{client} has {direction} backlog but {mcs} carries no bits per unit")]
    ZeroCapacityLink {
        client: ClientId,
        direction: crate::priority::Direction,
        mcs: crate::link::Mcs,
    },

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
