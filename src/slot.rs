//! Slot identity and numerology arithmetic.
//!
//! A [`SlotKey`] names one scheduling quantum as `(frame, subframe, slot)`. Keys compare
//! lexicographically, which matches chronological order as long as `subframe` and `slot` stay
//! inside the ranges fixed by a [`Numerology`]. All offset arithmetic goes through the numerology
//! so carries between slot, subframe and frame are handled in one place.

// Import crate error type for layout validation
use crate::error::{Result, SchedulerError};
// Import serde derives for configuration
use serde::{Deserialize, Serialize};
// Import formatting for slot keys
use std::fmt;
// Import duration for slot and symbol periods
use std::time::Duration;

/// Duration of one subframe; slot timing is derived from it.
const SUBFRAME_PERIOD: Duration = Duration::from_millis(1);
/// Largest numerology index (960 kHz subcarrier spacing, 64 slots per subframe).
pub const MAX_MU: u8 = 6;
/// OFDM symbols per slot with normal cyclic prefix.
pub const SYMBOLS_PER_SLOT: u32 = 14;

/// Identity of one slot: `(frame, subframe, slot)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SlotKey {
    pub frame: u32,
    pub subframe: u8,
    pub slot: u8,
}

impl SlotKey {
    /// Build a key without range checks. Use [`Numerology::key`] for validated construction.
    pub const fn new(frame: u32, subframe: u8, slot: u8) -> Self {
        SlotKey {
            frame,
            subframe,
            slot,
        }
    }

    /// Whether `self` happens strictly before `other`.
    pub fn is_before(&self, other: &SlotKey) -> bool {
        self < other
    }

    /// Whether `self` happens strictly after `other`.
    pub fn is_after(&self, other: &SlotKey) -> bool {
        self > other
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.frame, self.subframe, self.slot)
    }
}

/// Frame layout: how many subframes per frame and slots per subframe.
///
/// The slot period is a pure function of the layout: a subframe always lasts 1 ms and is split
/// evenly into `slots_per_subframe` slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Numerology {
    pub subframes_per_frame: u8,
    pub slots_per_subframe: u8,
}

impl Default for Numerology {
    fn default() -> Self {
        Numerology::from_mu(0)
    }
}

impl Numerology {
    /// Standard layout for numerology `mu`: 10 subframes per frame, `2^mu` slots per subframe.
    ///
    /// # Panics
    /// If `mu` exceeds [`MAX_MU`]. Use [`Numerology::try_from_mu`] for untrusted input.
    pub const fn from_mu(mu: u8) -> Self {
        assert!(mu <= MAX_MU, "numerology mu out of range");
        Numerology {
            subframes_per_frame: 10,
            slots_per_subframe: 1 << mu,
        }
    }

    /// Checked variant of [`Numerology::from_mu`].
    ///
    /// # Errors
    /// `InvalidConfig` if `mu` exceeds [`MAX_MU`].
    pub fn try_from_mu(mu: u8) -> Result<Self> {
        if mu > MAX_MU {
            return Err(SchedulerError::InvalidConfig(format!(
                "numerology mu {mu} outside 0..={MAX_MU}"
            )));
        }
        Ok(Numerology::from_mu(mu))
    }

    /// Arbitrary layout. Both counts must be nonzero.
    pub fn with_layout(subframes_per_frame: u8, slots_per_subframe: u8) -> Result<Self> {
        if subframes_per_frame == 0 || slots_per_subframe == 0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "numerology layout {subframes_per_frame}x{slots_per_subframe} has an empty dimension"
            )));
        }
        Ok(Numerology {
            subframes_per_frame,
            slots_per_subframe,
        })
    }

    /// Slots in one frame.
    pub fn slots_per_frame(&self) -> u64 {
        u64::from(self.subframes_per_frame) * u64::from(self.slots_per_subframe)
    }

    /// Duration of one slot.
    pub fn slot_period(&self) -> Duration {
        SUBFRAME_PERIOD / u32::from(self.slots_per_subframe)
    }

    /// Duration of one OFDM symbol.
    pub fn symbol_period(&self) -> Duration {
        self.slot_period() / SYMBOLS_PER_SLOT
    }

    /// Validated key construction.
    pub fn key(&self, frame: u32, subframe: u8, slot: u8) -> Result<SlotKey> {
        if subframe >= self.subframes_per_frame || slot >= self.slots_per_subframe {
            return Err(SchedulerError::InvalidConfig(format!(
                "slot ({frame},{subframe},{slot}) outside a {}x{} frame layout",
                self.subframes_per_frame, self.slots_per_subframe
            )));
        }
        Ok(SlotKey::new(frame, subframe, slot))
    }

    /// Absolute slot number counted from `(0,0,0)`.
    pub fn index(&self, key: SlotKey) -> u64 {
        u64::from(key.frame) * self.slots_per_frame()
            + u64::from(key.subframe) * u64::from(self.slots_per_subframe)
            + u64::from(key.slot)
    }

    /// Inverse of [`Numerology::index`].
    pub fn key_at(&self, index: u64) -> SlotKey {
        let per_frame = self.slots_per_frame();
        let within = index % per_frame;
        SlotKey {
            // Frames wrap after u32::MAX, far beyond any simulated horizon.
            frame: (index / per_frame) as u32,
            subframe: (within / u64::from(self.slots_per_subframe)) as u8,
            slot: (within % u64::from(self.slots_per_subframe)) as u8,
        }
    }

    /// The key `offset` slots after `key`, carrying into subframe and frame.
    pub fn advance(&self, key: SlotKey, offset: u64) -> SlotKey {
        self.key_at(self.index(key) + offset)
    }
}
