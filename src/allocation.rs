//! Slot allocation records and the chronological queue holding them until execution.
//!
//! The engine decides a slot several slots ahead of its execution time. Each decision becomes one
//! [`SlotAllocationRecord`] pushed into the [`SlotAllocationQueue`]; the execution layer later
//! removes it by key. The queue is append-only in chronological order, with a single exception:
//! [`SlotAllocationQueue::push_front`] splices a record in ahead of everything queued and shifts
//! the existing records forward by a constant offset.

// Import the client handle named by every grant
use crate::context::ClientId;
// Import crate error type for queue ordering failures
use crate::error::{Result, SchedulerError};
// Import modulation index carried by each grant
use crate::link::Mcs;
// Import per-direction tables for capacity and grants
use crate::priority::{Direction, DirectionTable};
// Import slot keys and the layout used to shift them
use crate::slot::{Numerology, SlotKey};
// Import serde derives so records can be dumped by tooling
use serde::{Deserialize, Serialize};
// Import ordered map keeping records in slot order
use std::collections::BTreeMap;

/// Units granted to one client in one direction for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub client: ClientId,
    pub units: u32,
    pub mcs: Mcs,
}

/// Finalized allocation of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAllocationRecord {
    key: SlotKey,
    available: DirectionTable<u32>,
    grants: DirectionTable<Vec<Grant>>,
}

impl SlotAllocationRecord {
    /// Empty record for `key` with the given capacity per direction.
    pub fn new(key: SlotKey, available: DirectionTable<u32>) -> Self {
        Self {
            key,
            available,
            grants: DirectionTable::default(),
        }
    }

    pub fn key(&self) -> SlotKey {
        self.key
    }

    /// Units offered in `direction`.
    pub fn available(&self, direction: Direction) -> u32 {
        self.available[direction]
    }

    /// Ordered grants for `direction`.
    pub fn grants(&self, direction: Direction) -> &[Grant] {
        &self.grants[direction]
    }

    /// Sum of granted units in `direction`.
    pub fn assigned(&self, direction: Direction) -> u32 {
        self.grants[direction].iter().map(|grant| grant.units).sum()
    }

    /// Units left unassigned in `direction`.
    pub fn unassigned(&self, direction: Direction) -> u32 {
        self.available[direction].saturating_sub(self.assigned(direction))
    }

    /// Whether no unit was granted in either direction.
    pub fn is_empty(&self) -> bool {
        Direction::ALL
            .into_iter()
            .all(|direction| self.grants[direction].is_empty())
    }

    /// Install the grants of one direction.
    ///
    /// # Errors
    /// `Overcommit` if the grants add up to more than the direction offers; the record keeps its
    /// previous grants in that case.
    pub fn set_grants(&mut self, direction: Direction, grants: Vec<Grant>) -> Result<()> {
        let assigned: u64 = grants.iter().map(|grant| u64::from(grant.units)).sum();
        if assigned > u64::from(self.available[direction]) {
            return Err(SchedulerError::Overcommit {
                direction,
                assigned: u32::try_from(assigned).unwrap_or(u32::MAX),
                available: self.available[direction],
            });
        }
        self.grants[direction] = grants;
        Ok(())
    }
}

/// Chronologically ordered store of allocation records awaiting execution.
#[derive(Debug, Clone)]
pub struct SlotAllocationQueue {
    numerology: Numerology,
    records: BTreeMap<SlotKey, SlotAllocationRecord>,
}

impl SlotAllocationQueue {
    pub fn new(numerology: Numerology) -> Self {
        Self {
            numerology,
            records: BTreeMap::new(),
        }
    }

    /// Newest queued key.
    pub fn newest(&self) -> Option<SlotKey> {
        self.records.keys().next_back().copied()
    }

    /// Oldest queued key.
    pub fn oldest(&self) -> Option<SlotKey> {
        self.records.keys().next().copied()
    }

    /// Whether `key` could be appended right now.
    pub fn accepts(&self, key: SlotKey) -> Result<()> {
        match self.newest() {
            Some(newest) if newest == key => Err(SchedulerError::DuplicateRecord(key)),
            Some(newest) if !key.is_after(&newest) => {
                Err(SchedulerError::OutOfOrderRecord { key, newest })
            }
            _ => Ok(()),
        }
    }

    /// Append a record.
    ///
    /// # Arguments
    /// * `record` - finalized slot decision; its key must be newer than every queued key
    ///
    /// # Errors
    /// `DuplicateRecord` or `OutOfOrderRecord` unless the key is strictly after every queued key.
    pub fn push_back(&mut self, record: SlotAllocationRecord) -> Result<()> {
        self.accepts(record.key)?;
        self.records.insert(record.key, record);
        Ok(())
    }

    /// Insert `record` at the head under `new_base`, shifting queued records forward.
    ///
    /// Every queued record moves by the same number of slots, the smallest shift that places the
    /// old head strictly after `new_base`. Relative spacing and order are preserved. When the old
    /// head is already after `new_base` nothing moves.
    ///
    /// # Arguments
    /// * `new_base` - key the spliced record is stored under, overriding its own key
    /// * `record` - record to place at the head
    pub fn push_front(&mut self, new_base: SlotKey, mut record: SlotAllocationRecord) {
        record.key = new_base;
        let shift = match self.oldest() {
            Some(head) => {
                let base_index = self.numerology.index(new_base);
                let head_index = self.numerology.index(head);
                (base_index + 1).saturating_sub(head_index)
            }
            None => 0,
        };
        if shift > 0 {
            let numerology = self.numerology;
            self.records = std::mem::take(&mut self.records)
                .into_values()
                .map(|mut queued| {
                    queued.key = numerology.advance(queued.key, shift);
                    (queued.key, queued)
                })
                .collect();
        }
        self.records.insert(new_base, record);
    }

    /// Whether a record is queued for `key`.
    pub fn exists(&self, key: SlotKey) -> bool {
        self.records.contains_key(&key)
    }

    /// Borrow the record for `key` without removing it.
    ///
    /// # Errors
    /// `MissingRecord` if nothing is queued for `key`.
    pub fn peek(&self, key: SlotKey) -> Result<&SlotAllocationRecord> {
        self.records
            .get(&key)
            .ok_or(SchedulerError::MissingRecord(key))
    }

    /// Borrow the earliest record without removing it.
    pub fn peek_head(&self) -> Result<&SlotAllocationRecord> {
        self.records
            .values()
            .next()
            .ok_or(SchedulerError::EmptyQueue)
    }

    /// Remove and return the record for `key`. Call [`Self::exists`] first; absence is an error.
    ///
    /// # Arguments
    /// * `key` - slot the execution layer is about to run
    ///
    /// # Returns
    /// The record, now owned by the caller. The queue no longer holds it.
    ///
    /// # Errors
    /// `MissingRecord` if nothing is queued for `key`; the queue is unchanged.
    pub fn retrieve(&mut self, key: SlotKey) -> Result<SlotAllocationRecord> {
        self.records
            .remove(&key)
            .ok_or(SchedulerError::MissingRecord(key))
    }

    /// Remove and return the earliest record.
    ///
    /// # Errors
    /// `EmptyQueue` when nothing is queued.
    pub fn retrieve_head(&mut self) -> Result<SlotAllocationRecord> {
        self.records
            .pop_first()
            .map(|(_, record)| record)
            .ok_or(SchedulerError::EmptyQueue)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
