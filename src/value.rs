/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Per-value records and safepoints of one method compilation.

use crate::bitset::BitSet;
use crate::{Location, ValueKind};

define_index!(Value, ValueRecords, ValueRecord);
define_index!(Safepoint, Safepoints, SafepointInfo);

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl core::fmt::Display for Safepoint {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "sp{}", self.0)
    }
}

/// What happens to the register file at a safepoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum SafepointKind {
    /// A call: registers that are not preserved across calls are
    /// clobbered, so no live reference may be held in one.
    Call,
    /// A safepoint poll: the trap handler saves the whole register file,
    /// so references may stay in registers.
    Poll,
}

/// A program point at which the collector may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SafepointInfo {
    /// Offset of the safepoint instruction from the start of the method's code.
    pub pc: u32,
    pub kind: SafepointKind,
}

/// A compiler-level value: its kind, where it lives, and the safepoints
/// at which it is live.
///
/// The location is set exactly once, during allocation; afterwards the
/// record is only queried.
#[derive(Clone, Debug)]
pub struct ValueRecord {
    kind: ValueKind,
    location: Location,
    live_at: BitSet,
}

impl ValueRecord {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            location: Location::Unassigned,
            live_at: BitSet::new(),
        }
    }

    /// A record whose location is already known.
    pub fn with_location(kind: ValueKind, location: Location) -> Self {
        Self {
            kind,
            location,
            live_at: BitSet::new(),
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[inline(always)]
    pub fn location(&self) -> Location {
        self.location
    }

    #[inline(always)]
    pub fn is_reference(&self) -> bool {
        self.kind.is_reference()
    }

    /// Set the location. Fails, returning the location already held, if
    /// the value was assigned before.
    pub fn set_location(&mut self, location: Location) -> Result<(), Location> {
        if self.location.is_assigned() {
            return Err(self.location);
        }
        self.location = location;
        Ok(())
    }

    pub fn mark_live(&mut self, safepoint: Safepoint) {
        self.live_at.insert(safepoint.index());
    }

    pub fn is_live_at(&self, safepoint: Safepoint) -> bool {
        self.live_at.contains(safepoint.index())
    }

    /// The safepoints this value is live at, in ascending order.
    pub fn live_at(&self) -> impl Iterator<Item = Safepoint> + '_ {
        self.live_at.iter().map(Safepoint::new)
    }
}

impl ValueRecords {
    /// The records live at `safepoint`, in value order.
    pub fn live_at(
        &self,
        safepoint: Safepoint,
    ) -> impl Iterator<Item = (Value, &ValueRecord)> + '_ {
        self.entries()
            .filter(move |(_, record)| record.is_live_at(safepoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PReg, RegClass};
    use alloc::vec::Vec;

    #[test]
    fn location_is_set_once() {
        let mut record = ValueRecord::new(ValueKind::Reference);
        assert_eq!(record.location(), Location::Unassigned);
        record.set_location(Location::spill(16)).unwrap();
        assert_eq!(
            record.set_location(Location::reg(PReg::new(0, RegClass::Int))),
            Err(Location::spill(16))
        );
        assert_eq!(record.location(), Location::spill(16));
    }

    #[test]
    fn liveness() {
        let mut values = ValueRecords::new();
        let a = values.push(ValueRecord::new(ValueKind::Reference));
        let b = values.push(ValueRecord::new(ValueKind::Int));
        let c = values.push(ValueRecord::new(ValueKind::Reference));
        values[a].mark_live(Safepoint::new(0));
        values[a].mark_live(Safepoint::new(70));
        values[c].mark_live(Safepoint::new(70));

        let at_70: Vec<Value> = values.live_at(Safepoint::new(70)).map(|(v, _)| v).collect();
        assert_eq!(at_70, [a, c]);
        assert_eq!(values.live_at(Safepoint::new(1)).count(), 0);
        assert_eq!(
            values[a].live_at().collect::<Vec<_>>(),
            [Safepoint::new(0), Safepoint::new(70)]
        );
        assert!(!values[b].is_live_at(Safepoint::new(0)));
    }
}
