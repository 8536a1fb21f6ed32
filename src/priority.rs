//! Priority class and link direction definitions used across the scheduler.

// Import serde derives for configuration
use serde::{Deserialize, Serialize};
// Import formatting for log fields
use std::fmt;
// Import indexing traits for direction tables
use std::ops::{Index, IndexMut};

/// Ordinal QoS class of a bearer. Lower values are served first.
///
/// The value mirrors the numeric priority carried by bearer configuration (e.g. `1` for signalling,
/// `9` for default best effort). Comparisons are plain integer comparisons, so `PriorityClass(1)`
/// sorts before `PriorityClass(9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityClass(pub u8);

impl PriorityClass {
    /// Least urgent class representable; ranks clients with no queued bearer last.
    pub const LOWEST: PriorityClass = PriorityClass(u8::MAX);
}

impl Default for PriorityClass {
    fn default() -> Self {
        PriorityClass(9)
    }
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Transmission direction of a resource grant.
///
/// The ordering is stable so per-direction tables can rely on integer indexes instead of branching
/// on the variant. Adding a direction only requires appending it to [`Direction::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Downlink,
    Uplink,
}

impl Direction {
    /// Ordered list of all directions (downlink first) for iteration utilities.
    pub const ALL: [Direction; 2] = [Direction::Downlink, Direction::Uplink];

    /// Stable index for direction based arrays.
    pub const fn index(self) -> usize {
        match self {
            Direction::Downlink => 0,
            Direction::Uplink => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Direction::Downlink => "downlink",
            Direction::Uplink => "uplink",
        };
        write!(f, "{label}")
    }
}

/// Helper structure wrapping a value per [`Direction`].
///
/// Downlink and uplink are scheduled independently but with identical logic, so every piece of
/// per-direction state (available units, metrics, backlog, counters) lives in one of these tables
/// and call sites iterate [`Direction::ALL`] instead of duplicating code paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionTable<T> {
    values: Vec<T>,
}

impl<T> DirectionTable<T> {
    /// Build a table by executing a closure for each direction.
    ///
    /// The closure runs once per direction in [`Direction::ALL`] order.
    ///
    /// # Example
    /// ```
    /// use slot_scheduler::priority::{Direction, DirectionTable};
    ///
    /// let units = DirectionTable::from_fn(|direction| match direction {
    ///     Direction::Downlink => 25,
    ///     Direction::Uplink => 10,
    /// });
    /// assert_eq!(units[Direction::Uplink], 10);
    /// ```
    pub fn from_fn(mut f: impl FnMut(Direction) -> T) -> Self {
        let mut values = Vec::with_capacity(Direction::ALL.len());
        for direction in Direction::ALL {
            values.push(f(direction));
        }
        DirectionTable { values }
    }

    /// Borrow the value for a given direction.
    pub fn get(&self, direction: Direction) -> &T {
        &self.values[direction.index()]
    }

    /// Mutably borrow the value for a given direction.
    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        &mut self.values[direction.index()]
    }

    /// Iterate `(direction, value)` pairs in [`Direction::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, &T)> {
        Direction::ALL.into_iter().zip(self.values.iter())
    }
}

impl<T: Clone> DirectionTable<T> {
    /// Table holding the same value for every direction.
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value.clone())
    }
}

impl<T: Default> Default for DirectionTable<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Direction> for DirectionTable<T> {
    type Output = T;

    fn index(&self, index: Direction) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<Direction> for DirectionTable<T> {
    fn index_mut(&mut self, index: Direction) -> &mut Self::Output {
        self.get_mut(index)
    }
}
