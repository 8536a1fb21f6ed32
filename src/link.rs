//! Link-quality collaborator: maps a client to a modulation/coding choice and converts resource
//! units into transport-block bits.
//!
//! The scheduler never estimates channel quality itself. It asks a [`LinkQuality`] implementation
//! for the current MCS of a client once per slot, and for the number of bits a given number of
//! units would carry at that MCS.

// Import client handle used as link model key
use crate::context::ClientId;
// Import direction; estimates differ per direction
use crate::priority::Direction;
// Import serde derives for the MCS newtype
use serde::{Deserialize, Serialize};
// Import map holding per-client MCS estimates
use std::collections::HashMap;
// Import formatting for MCS values
use std::fmt;

/// Modulation and coding scheme index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mcs(pub u8);

impl fmt::Display for Mcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mcs{}", self.0)
    }
}

/// Supplied link-adaptation function.
pub trait LinkQuality {
    /// MCS currently usable by `client` in `direction`.
    fn mcs(&self, client: ClientId, direction: Direction) -> Mcs;

    /// Bits one resource unit carries at `mcs`.
    fn bits_per_unit(&self, mcs: Mcs, direction: Direction) -> u64;

    /// Transport block size, in bits, of `units` resource units at `mcs`.
    fn transport_block_bits(&self, mcs: Mcs, units: u32, direction: Direction) -> u64 {
        self.bits_per_unit(mcs, direction) * u64::from(units)
    }
}

/// Every client gets the same MCS and every unit carries the same number of bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedLink {
    pub mcs: Mcs,
    pub bits_per_unit: u64,
}

impl FixedLink {
    pub fn new(mcs: Mcs, bits_per_unit: u64) -> Self {
        Self { mcs, bits_per_unit }
    }
}

impl LinkQuality for FixedLink {
    fn mcs(&self, _client: ClientId, _direction: Direction) -> Mcs {
        self.mcs
    }

    fn bits_per_unit(&self, _mcs: Mcs, _direction: Direction) -> u64 {
        self.bits_per_unit
    }
}

/// Approximate spectral efficiency (bits per resource element, x1024) for MCS 0..=27,
/// following the 64QAM MCS table shape.
const EFFICIENCY_X1024: [u32; 28] = [
    240, 314, 393, 513, 615, 754, 897, 1058, 1213, 1397, // QPSK
    1511, 1628, 1841, 2074, 2284, 2520, 2680, // 16QAM
    2814, 3075, 3340, 3604, 3876, 4138, 4405, 4668, 4938, 5118, 5339, // 64QAM
];

/// Spectral-efficiency lookup with per-client MCS overrides.
///
/// Bits per unit are `resource_elements_per_unit * efficiency(mcs)`, where the efficiency comes
/// from a static MCS table. Clients without an override use `default_mcs`.
#[derive(Debug, Clone)]
pub struct McsTableLink {
    resource_elements_per_unit: u64,
    default_mcs: Mcs,
    overrides: HashMap<(ClientId, Direction), Mcs>,
}

impl McsTableLink {
    /// Build a table where one unit holds `resource_elements_per_unit` data resource elements.
    pub fn new(resource_elements_per_unit: u64, default_mcs: Mcs) -> Self {
        Self {
            resource_elements_per_unit,
            default_mcs: Self::clamp(default_mcs),
            overrides: HashMap::new(),
        }
    }

    /// Pin the MCS reported for one client and direction.
    pub fn set_mcs(&mut self, client: ClientId, direction: Direction, mcs: Mcs) {
        self.overrides.insert((client, direction), Self::clamp(mcs));
    }

    /// Largest MCS index the table knows.
    pub fn max_mcs() -> Mcs {
        Mcs((EFFICIENCY_X1024.len() - 1) as u8)
    }

    /// Bits one unit carries at the most robust MCS. Zero means the unit is too small to carry
    /// anything at any MCS the link may pick.
    pub fn min_bits_per_unit(&self) -> u64 {
        self.bits_per_unit(Mcs(0), Direction::Downlink)
    }

    fn clamp(mcs: Mcs) -> Mcs {
        mcs.min(Self::max_mcs())
    }
}

impl LinkQuality for McsTableLink {
    fn mcs(&self, client: ClientId, direction: Direction) -> Mcs {
        self.overrides
            .get(&(client, direction))
            .copied()
            .unwrap_or(self.default_mcs)
    }

    fn bits_per_unit(&self, mcs: Mcs, _direction: Direction) -> u64 {
        let efficiency = u64::from(EFFICIENCY_X1024[usize::from(Self::clamp(mcs).0)]);
        self.resource_elements_per_unit * efficiency / 1024
    }
}
