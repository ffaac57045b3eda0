//! Mains phase sequencing from zero-crossing events.
//!
//! A zero-cross sensor reports which conductor just crossed zero; the
//! [`SequenceDetector`] infers the rotation direction from the first valid
//! transition and flags every inconsistency it sees afterwards. Faults are
//! cumulative and cleared only explicitly, so a single glitch stays visible to
//! the protection logic even while the detector keeps tracking.

/// One of the three mains conductors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Unknown,
    A,
    B,
    C,
}

/// Mains rotation direction.
///
/// Locked by the detector on the first valid transition; changes only on
/// [`SequenceDetector::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Unknown,
    Forward,
    Backward,
}

impl Direction {
    /// The opposite rotation; `Unknown` stays `Unknown`.
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
            Self::Unknown => Self::Unknown,
        }
    }
}

/// Cumulative bitmask of sequence inconsistencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceFault(u8);

impl SequenceFault {
    /// Phase A was observed twice in a row; the successor is ambiguous.
    pub const REPEAT_A: Self = Self(1 << 0);
    /// Phase B was observed twice in a row.
    pub const REPEAT_B: Self = Self(1 << 1);
    /// Phase C was observed twice in a row.
    pub const REPEAT_C: Self = Self(1 << 2);
    /// Phase A arrived out of order for the locked direction.
    pub const ORDER_A: Self = Self(1 << 3);
    /// Phase B arrived out of order for the locked direction.
    pub const ORDER_B: Self = Self(1 << 4);
    /// Phase C arrived out of order for the locked direction.
    pub const ORDER_C: Self = Self(1 << 5);
    /// An unrecognized phase was observed.
    pub const INVALID: Self = Self(1 << 6);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    fn repeat_of(phase: Phase) -> Self {
        match phase {
            Phase::A => Self::REPEAT_A,
            Phase::B => Self::REPEAT_B,
            Phase::C => Self::REPEAT_C,
            Phase::Unknown => Self::INVALID,
        }
    }

    fn order_of(phase: Phase) -> Self {
        match phase {
            Phase::A => Self::ORDER_A,
            Phase::B => Self::ORDER_B,
            Phase::C => Self::ORDER_C,
            Phase::Unknown => Self::INVALID,
        }
    }
}

/// The phase that follows `phase` for the given rotation direction.
///
/// Pure 3x2 lookup; `Unknown` in either argument yields `Unknown`.
pub fn next_phase(phase: Phase, direction: Direction) -> Phase {
    match (phase, direction) {
        (Phase::A, Direction::Forward) => Phase::B,
        (Phase::B, Direction::Forward) => Phase::C,
        (Phase::C, Direction::Forward) => Phase::A,
        (Phase::A, Direction::Backward) => Phase::C,
        (Phase::B, Direction::Backward) => Phase::A,
        (Phase::C, Direction::Backward) => Phase::B,
        _ => Phase::Unknown,
    }
}

/// Finite-state detector consuming one zero-crossing event at a time.
#[derive(Debug)]
pub struct SequenceDetector {
    current: Phase,
    direction: Direction,
    faults: SequenceFault,
}

impl SequenceDetector {
    pub const fn new() -> Self {
        Self {
            current: Phase::Unknown,
            direction: Direction::Unknown,
            faults: SequenceFault::empty(),
        }
    }

    /// Consumes one observed zero-crossing.
    pub fn handle(&mut self, phase: Phase) {
        if phase == Phase::Unknown {
            self.faults.insert(SequenceFault::INVALID);
            return;
        }
        let last = self.current;
        if last == Phase::Unknown {
            self.current = phase;
            return;
        }
        if phase == last {
            // The other two phases were not distinguished in between.
            self.faults.insert(SequenceFault::repeat_of(last));
            return;
        }
        // phase is one of the two valid successors of last; the choice
        // implies a candidate direction.
        let candidate = if phase == next_phase(last, Direction::Forward) {
            Direction::Forward
        } else {
            Direction::Backward
        };
        if self.direction == Direction::Unknown {
            self.direction = candidate;
        } else if self.direction != candidate {
            self.faults.insert(SequenceFault::order_of(phase));
        }
        self.current = phase;
    }

    /// Last observed phase.
    pub fn current(&self) -> Phase {
        self.current
    }

    /// Locked rotation direction, `Unknown` until the first valid transition.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn faults(&self) -> SequenceFault {
        self.faults
    }

    /// Forgets the observed phase, the locked direction and all faults.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Clears accumulated faults without unlocking the direction.
    pub fn clear_faults(&mut self) {
        self.faults = SequenceFault::empty();
    }
}

impl Default for SequenceDetector {
    fn default() -> Self {
        Self::new()
    }
}
