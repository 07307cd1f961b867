/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Storage locations, ABI descriptors and precise GC reference maps for
//! a multi-target JIT backend.
//!
//! The pieces, leaves first:
//!
//! - [`catalog`]: the physical registers of each target architecture,
//!   with a dense per-class index.
//! - [`Location`]: where a compiled value lives (register, stack slot,
//!   immediate, or not yet assigned).
//! - [`abi`]: per-architecture descriptors resolving register roles,
//!   result locations and frame geometry.
//! - [`value`]: the per-value kind/location/liveness record.
//! - [`refmap`]: the reference-map builder producing one bitmap per
//!   safepoint, and [`table`], the packed per-method table the collector
//!   reads.
//! - [`generator`]: the per-architecture driver tying all of the above
//!   together for one compiled method.

#![allow(dead_code)]
#![no_std]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// Even when trace logging is disabled, the trace macro has a significant
// performance cost so we disable it in release builds.
macro_rules! trace {
    ($($tt:tt)*) => {
        if cfg!(feature = "trace-log") {
            ::log::trace!($($tt)*);
        }
    };
}

macro_rules! trace_enabled {
    () => {
        cfg!(feature = "trace-log") && ::log::log_enabled!(::log::Level::Trace)
    };
}

use alloc::string::String;
use core::hash::BuildHasherDefault;
use rustc_hash::FxHasher;

type FxHashSet<V> = hashbrown::HashSet<V, BuildHasherDefault<FxHasher>>;

#[macro_use]
mod index;

pub mod abi;
pub mod arch;
pub(crate) mod bitset;
pub mod catalog;
pub mod checker;
pub mod generator;
pub mod refmap;
pub mod table;
pub mod value;

#[cfg(feature = "enable-serde")]
pub mod serialize;

#[cfg(feature = "fuzzing")]
pub mod fuzzing;

pub use abi::{AbiDescriptor, AbiError, Role};
pub use arch::Target;
pub use catalog::{Architecture, RegisterCatalog};
pub use checker::{CheckerError, CheckerErrors};
pub use generator::{CompiledMethod, Generator, MethodCompilation};
pub use refmap::{FrameLayout, RefMapError, ReferenceBitmap, ReferenceMap, ReferenceMapBuilder};
pub use table::{ReferenceMapTable, ReferenceMapView};
pub use value::{
    Safepoint, SafepointInfo, SafepointKind, Safepoints, Value, ValueRecord, ValueRecords,
};

/// Register classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum RegClass {
    Int = 0,
    Float = 1,
}

impl RegClass {
    pub const ALL: [RegClass; 2] = [RegClass::Int, RegClass::Float];
}

/// A physical register. Contains a physical register number and a class.
///
/// The `hw_enc` field contains the physical register number and is in
/// a logically separate index space per class; in other words, Int
/// register 0 is different than Float register 0. Within a class the
/// encodings of a target's registers are dense from zero, which is what
/// makes them usable directly as bit positions in the register half of a
/// reference map.
///
/// The value returned by `index()`, in contrast, is in a single index
/// space shared by both classes, in order to enable uniform reasoning
/// about physical registers: indices 0..31 are the integer registers and
/// indices 32..63 are the float registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PReg {
    hw_enc: u8,
    class: RegClass,
}

impl PReg {
    pub const MAX_BITS: usize = 5;
    pub const MAX: usize = (1 << Self::MAX_BITS) - 1;
    pub const MAX_INDEX: usize = 1 << (Self::MAX_BITS + 1); // including RegClass bit

    /// Create a new PReg. The `hw_enc` range is 5 bits.
    #[inline(always)]
    pub const fn new(hw_enc: usize, class: RegClass) -> Self {
        assert!(hw_enc <= PReg::MAX);
        PReg {
            hw_enc: hw_enc as u8,
            class,
        }
    }

    /// The physical register number, as encoded by the ISA for the particular register class.
    #[inline(always)]
    pub const fn hw_enc(self) -> usize {
        self.hw_enc as usize
    }

    /// The register class.
    #[inline(always)]
    pub const fn class(self) -> RegClass {
        self.class
    }

    /// Get an index into the (not necessarily contiguous) index space of
    /// all physical registers. Allows one to maintain an array of data for
    /// all PRegs and index it efficiently.
    #[inline(always)]
    pub const fn index(self) -> usize {
        ((self.class as u8 as usize) << Self::MAX_BITS) | (self.hw_enc as usize)
    }

    #[inline(always)]
    pub const fn from_index(index: usize) -> Self {
        let class = match (index >> Self::MAX_BITS) & 1 {
            0 => RegClass::Int,
            _ => RegClass::Float,
        };
        PReg::new(index & Self::MAX, class)
    }

    #[inline(always)]
    pub const fn invalid() -> Self {
        PReg::new(Self::MAX, RegClass::Int)
    }
}

impl core::fmt::Debug for PReg {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "PReg(hw = {}, class = {:?}, index = {})",
            self.hw_enc(),
            self.class(),
            self.index()
        )
    }
}

impl core::fmt::Display for PReg {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let class = match self.class() {
            RegClass::Int => "i",
            RegClass::Float => "f",
        };
        write!(f, "p{}{}", self.hw_enc(), class)
    }
}

/// A set of physical registers, one bit per `PReg::index()`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PRegSet {
    bits: u64,
}

impl PRegSet {
    /// Create an empty set.
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Build a set from a list of registers.
    pub const fn from_slice(regs: &[PReg]) -> Self {
        let mut set = Self::empty();
        let mut i = 0;
        while i < regs.len() {
            set = set.with(regs[i]);
            i += 1;
        }
        set
    }

    /// Returns whether the given register is part of the set.
    pub const fn contains(&self, reg: PReg) -> bool {
        self.bits & (1u64 << reg.index()) != 0
    }

    /// Add a physical register to the set, returning the new value.
    pub const fn with(self, reg: PReg) -> Self {
        Self {
            bits: self.bits | (1u64 << reg.index()),
        }
    }

    /// Add a physical register to the set.
    pub fn add(&mut self, reg: PReg) {
        self.bits |= 1u64 << reg.index();
    }

    /// Remove a physical register from the set.
    pub fn remove(&mut self, reg: PReg) {
        self.bits &= !(1u64 << reg.index());
    }

    /// Add all of the registers in one set to this one.
    pub fn union_from(&mut self, other: PRegSet) {
        self.bits |= other.bits;
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Iterate over the registers in ascending `PReg::index()` order.
    pub fn iter(&self) -> PRegSetIter {
        PRegSetIter { bits: self.bits }
    }
}

impl core::fmt::Debug for PRegSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<PReg> for PRegSet {
    fn from_iter<T: IntoIterator<Item = PReg>>(iter: T) -> Self {
        let mut set = PRegSet::empty();
        for reg in iter {
            set.add(reg);
        }
        set
    }
}

impl IntoIterator for PRegSet {
    type Item = PReg;
    type IntoIter = PRegSetIter;
    fn into_iter(self) -> PRegSetIter {
        self.iter()
    }
}

pub struct PRegSetIter {
    bits: u64,
}

impl Iterator for PRegSetIter {
    type Item = PReg;
    fn next(&mut self) -> Option<PReg> {
        if self.bits == 0 {
            None
        } else {
            let index = self.bits.trailing_zeros();
            self.bits &= self.bits - 1;
            Some(PReg::from_index(index as usize))
        }
    }
}

/// The kind of a compiler-level value. Only `Reference` values are of
/// interest to the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum ValueKind {
    Reference = 0,
    Word = 1,
    Int = 2,
    Long = 3,
    Float = 4,
    Double = 5,
}

impl ValueKind {
    pub const COUNT: usize = 6;
    pub const ALL: [ValueKind; Self::COUNT] = [
        ValueKind::Reference,
        ValueKind::Word,
        ValueKind::Int,
        ValueKind::Long,
        ValueKind::Float,
        ValueKind::Double,
    ];

    #[inline(always)]
    pub const fn is_reference(self) -> bool {
        matches!(self, ValueKind::Reference)
    }

    /// The register class a value of this kind is allocated in.
    #[inline(always)]
    pub const fn class(self) -> RegClass {
        match self {
            ValueKind::Float | ValueKind::Double => RegClass::Float,
            _ => RegClass::Int,
        }
    }

    /// Size in bytes of a value of this kind on a target with the given
    /// word size.
    pub const fn size_in_bytes(self, word_size: u32) -> u32 {
        match self {
            ValueKind::Reference | ValueKind::Word => word_size,
            ValueKind::Int | ValueKind::Float => 4,
            ValueKind::Long | ValueKind::Double => 8,
        }
    }
}

impl core::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let name = match self {
            ValueKind::Reference => "ref",
            ValueKind::Word => "word",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
        };
        f.write_str(name)
    }
}

/// Who owns a stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum SlotPurpose {
    /// An incoming argument. The slot lives in the caller's frame and
    /// the caller reports it.
    Parameter,
    /// A slot in the method's own spill area.
    Spill,
}

/// A stack slot, addressed by a signed byte offset from the frame base.
///
/// For spill slots the offset is measured from the end of the ABI's
/// minimum frame, so the first spill slot has offset zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct StackSlot {
    pub offset: i32,
    pub purpose: SlotPurpose,
}

impl StackSlot {
    #[inline(always)]
    pub const fn spill(offset: i32) -> Self {
        StackSlot {
            offset,
            purpose: SlotPurpose::Spill,
        }
    }

    #[inline(always)]
    pub const fn parameter(offset: i32) -> Self {
        StackSlot {
            offset,
            purpose: SlotPurpose::Parameter,
        }
    }
}

impl core::fmt::Display for StackSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let purpose = match self.purpose {
            SlotPurpose::Parameter => "param",
            SlotPurpose::Spill => "spill",
        };
        write!(f, "{}[{:+}]", purpose, self.offset)
    }
}

/// Where a compiled value lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Location {
    Register(PReg),
    Stack(StackSlot),
    Immediate(i64),
    /// Only valid until allocation has completed.
    Unassigned,
}

impl Location {
    #[inline(always)]
    pub const fn reg(preg: PReg) -> Location {
        Location::Register(preg)
    }

    #[inline(always)]
    pub const fn spill(offset: i32) -> Location {
        Location::Stack(StackSlot::spill(offset))
    }

    #[inline(always)]
    pub const fn parameter(offset: i32) -> Location {
        Location::Stack(StackSlot::parameter(offset))
    }

    #[inline(always)]
    pub fn is_assigned(self) -> bool {
        self != Location::Unassigned
    }

    #[inline(always)]
    pub fn as_register(self) -> Option<PReg> {
        match self {
            Location::Register(preg) => Some(preg),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_stack(self) -> Option<StackSlot> {
        match self {
            Location::Stack(slot) => Some(slot),
            _ => None,
        }
    }

    /// The register class of a register location. Stack slots hold
    /// either class; immediates and unassigned locations have none.
    pub fn class(self) -> Option<RegClass> {
        match self {
            Location::Register(preg) => Some(preg.class()),
            Location::Stack(_) | Location::Immediate(_) | Location::Unassigned => None,
        }
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Location::Register(preg) => write!(f, "{}", preg),
            Location::Stack(slot) => write!(f, "{}", slot),
            Location::Immediate(bits) => write!(f, "#{}", bits),
            Location::Unassigned => f.write_str("unassigned"),
        }
    }
}

/// An error that aborts code generation for one method.
#[derive(Clone, Debug)]
pub enum CodegenError {
    /// The ABI could not answer a question code generation depends on.
    Abi(AbiError),
    /// Reference-map construction hit an invalid location.
    RefMap(RefMapError),
    /// The allocation contract was violated at one or more safepoints.
    Checker(CheckerErrors),
    /// A value's location was set a second time.
    LocationReassigned {
        value: Value,
        previous: Location,
        attempted: Location,
    },
    /// A location that cannot hold a value of the given kind.
    InvalidLocation {
        value: Value,
        kind: ValueKind,
        location: Location,
    },
    /// Two safepoints were registered at the same code offset.
    DuplicateSafepoint { pc: u32 },
    /// A value was marked live at a safepoint the method does not have.
    UnknownSafepoint { value: Value, index: u32 },
    /// The register acting as exception result is not where the ABI
    /// returns references.
    InconsistentCatchParameter { role: PReg, result: Location },
}

impl core::fmt::Display for CodegenError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            CodegenError::Abi(e) => write!(f, "{}", e),
            CodegenError::RefMap(e) => write!(f, "{}", e),
            CodegenError::Checker(e) => write!(f, "{}", e),
            CodegenError::LocationReassigned {
                value,
                previous,
                attempted,
            } => write!(
                f,
                "{} already assigned to {}, cannot move it to {}",
                value, previous, attempted
            ),
            CodegenError::InvalidLocation {
                value,
                kind,
                location,
            } => write!(f, "{} of kind {} cannot live in {}", value, kind, location),
            CodegenError::DuplicateSafepoint { pc } => {
                write!(f, "more than one safepoint at pc offset {:#x}", pc)
            }
            CodegenError::UnknownSafepoint { value, index } => {
                write!(f, "{} is live at unknown safepoint sp{}", value, index)
            }
            CodegenError::InconsistentCatchParameter { role, result } => write!(
                f,
                "exception result register {} differs from reference result location {}",
                role, result
            ),
        }
    }
}

impl From<AbiError> for CodegenError {
    fn from(e: AbiError) -> Self {
        CodegenError::Abi(e)
    }
}

impl From<RefMapError> for CodegenError {
    fn from(e: RefMapError) -> Self {
        CodegenError::RefMap(e)
    }
}

impl From<CheckerErrors> for CodegenError {
    fn from(e: CheckerErrors) -> Self {
        CodegenError::Checker(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CodegenError {}

/// A [`CodegenError`] together with the method and target it aborted.
#[derive(Clone, Debug)]
pub struct CompileError {
    pub method: String,
    pub arch: Architecture,
    pub kind: CodegenError,
}

impl core::fmt::Display for CompileError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "compiling {} for {}: {}", self.method, self.arch, self.kind)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn preg_index_roundtrip() {
        for index in 0..PReg::MAX_INDEX {
            assert_eq!(PReg::from_index(index).index(), index);
        }
        assert_eq!(PReg::new(3, RegClass::Float).index(), 35);
    }

    #[test]
    fn pregset_ops() {
        let a = PReg::new(1, RegClass::Int);
        let b = PReg::new(31, RegClass::Int);
        let c = PReg::new(0, RegClass::Float);
        let mut set = PRegSet::from_slice(&[a, c]);
        assert!(set.contains(a));
        assert!(!set.contains(b));
        set.add(b);
        assert_eq!(set.len(), 3);
        set.remove(a);
        assert_eq!(set.iter().collect::<Vec<_>>(), [b, c]);
    }

    #[test]
    fn location_equality_is_structural() {
        assert_eq!(Location::spill(8), Location::spill(8));
        assert_ne!(Location::spill(8), Location::parameter(8));
        assert_ne!(
            Location::reg(PReg::new(0, RegClass::Int)),
            Location::reg(PReg::new(0, RegClass::Float))
        );
        assert_eq!(Location::Unassigned.class(), None);
        assert!(!Location::Unassigned.is_assigned());
    }
}
