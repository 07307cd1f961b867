/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Reference-map construction.
//!
//! Given the values live at one safepoint, the builder produces a
//! [`ReferenceMap`]: a bitmap over the method's frame, with bit *i* set
//! iff stack slot *i* holds a live reference, and a bitmap over the
//! general-purpose registers for references the collector has to find in
//! the saved register file.
//!
//! Frame bit indices are counted in stack slots from the bottom of the
//! frame, which includes the ABI's minimum frame. A spill slot at byte
//! offset `o` therefore maps to bit `(o + minimum_frame_size) /
//! stack_slot_width`. Registers that the ABI spills to a fixed place in
//! the minimum frame (register windows) are reported through that
//! place's bit.
//!
//! The result is a pure function of the *set* of live values: it does not
//! depend on the order they are presented in, and when several values are
//! invalid the error names the lowest-numbered one.

use crate::abi::AbiDescriptor;
use crate::bitset::BitSet;
use crate::value::{Value, ValueRecord};
use crate::{Location, PReg, RegClass, SlotPurpose, StackSlot};
use alloc::vec;
use alloc::vec::Vec;

/// The shape of one method's frame, as far as reference maps care.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FrameLayout {
    /// Bytes of spill area above the ABI's minimum frame.
    frame_size: u32,
    stack_slot_width: u32,
}

impl FrameLayout {
    pub fn new(frame_size: u32, stack_slot_width: u32) -> Self {
        assert!(stack_slot_width > 0);
        Self {
            frame_size,
            stack_slot_width,
        }
    }

    /// A layout using the ABI's stack slot width.
    pub fn for_abi(abi: &AbiDescriptor, frame_size: u32) -> Self {
        Self::new(frame_size, abi.stack_slot_size())
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn stack_slot_width(&self) -> u32 {
        self.stack_slot_width
    }
}

/// A live reference whose location cannot be described by a reference
/// map. Each of these is a bug upstream (allocation did not complete, or
/// produced a location no reference may occupy) and aborts the
/// compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefMapError {
    UnassignedReference {
        value: Value,
    },
    ImmediateReference {
        value: Value,
        bits: i64,
    },
    /// The slot offset plus the minimum frame is not a whole number of
    /// slots. Truncating division would silently report the neighbouring
    /// slot, so this is rejected rather than rounded down.
    MisalignedStackSlot {
        value: Value,
        slot: StackSlot,
    },
    SlotOutOfRange {
        value: Value,
        slot: StackSlot,
        bit: i64,
        frame_bits: usize,
    },
    /// Not a general-purpose register of the target.
    ForeignRegister {
        value: Value,
        preg: PReg,
    },
}

impl RefMapError {
    /// The offending value.
    pub fn value(&self) -> Value {
        match *self {
            RefMapError::UnassignedReference { value }
            | RefMapError::ImmediateReference { value, .. }
            | RefMapError::MisalignedStackSlot { value, .. }
            | RefMapError::SlotOutOfRange { value, .. }
            | RefMapError::ForeignRegister { value, .. } => value,
        }
    }
}

impl core::fmt::Display for RefMapError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            RefMapError::UnassignedReference { value } => {
                write!(f, "reference {} is live at a safepoint but has no location", value)
            }
            RefMapError::ImmediateReference { value, bits } => {
                write!(f, "reference {} is an immediate ({:#x})", value, bits)
            }
            RefMapError::MisalignedStackSlot { value, slot } => {
                write!(f, "reference {} is in misaligned stack slot {}", value, slot)
            }
            RefMapError::SlotOutOfRange {
                value,
                slot,
                bit,
                frame_bits,
            } => write!(
                f,
                "reference {} in {} maps to bit {} outside a {}-slot frame",
                value, slot, bit, frame_bits
            ),
            RefMapError::ForeignRegister { value, preg } => write!(
                f,
                "reference {} is in {}, which is not a general-purpose register of the target",
                value, preg
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RefMapError {}

/// A fixed-length bit vector.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReferenceBitmap {
    bits: BitSet,
    len: usize,
}

impl ReferenceBitmap {
    /// An all-clear bitmap of `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            bits: BitSet::with_capacity(len),
            len,
        }
    }

    /// Decode `len` bits stored least-significant bit first.
    pub fn from_bytes(bytes: &[u8], len: usize) -> Self {
        assert!(bytes.len() * 8 >= len);
        let mut bitmap = Self::new(len);
        for i in 0..len {
            if bytes[i / 8] & (1 << (i % 8)) != 0 {
                bitmap.set(i);
            }
        }
        bitmap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bits.contains(index)
    }

    pub(crate) fn set(&mut self, index: usize) {
        assert!(index < self.len, "bit {} of a {}-bit map", index, self.len);
        self.bits.insert(index);
    }

    /// The number of set bits.
    pub fn count(&self) -> usize {
        self.bits.count()
    }

    /// The set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter()
    }

    /// Encode as `ceil(len / 8)` bytes, least-significant bit first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; (self.len + 7) / 8];
        self.write_bytes(&mut bytes);
        bytes
    }

    pub(crate) fn write_bytes(&self, bytes: &mut [u8]) {
        debug_assert!(bytes.len() * 8 >= self.len);
        for i in self.iter() {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
}

impl core::fmt::Debug for ReferenceBitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}{:?}", self.len, self.bits)
    }
}

/// The reference map of one safepoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReferenceMap {
    frame: ReferenceBitmap,
    registers: ReferenceBitmap,
}

impl ReferenceMap {
    pub(crate) fn new(frame: ReferenceBitmap, registers: ReferenceBitmap) -> Self {
        Self { frame, registers }
    }

    /// Bit *i* set: stack slot *i* holds a live reference.
    pub fn frame(&self) -> &ReferenceBitmap {
        &self.frame
    }

    /// Bit *i* set: the general-purpose register with catalog index *i*
    /// holds a live reference.
    pub fn registers(&self) -> &ReferenceBitmap {
        &self.registers
    }

    pub fn has_references(&self) -> bool {
        self.frame.count() + self.registers.count() != 0
    }
}

enum MapBit {
    Frame(usize),
    Register(usize),
}

/// Builds the reference maps of one method.
pub struct ReferenceMapBuilder<'a> {
    abi: &'a AbiDescriptor,
    frame: FrameLayout,
    frame_bits: usize,
    len: usize,
    register_bits: usize,
}

impl<'a> ReferenceMapBuilder<'a> {
    pub fn new(abi: &'a AbiDescriptor, frame: FrameLayout) -> Self {
        let frame_bits =
            ((abi.minimum_frame_size() + frame.frame_size()) / frame.stack_slot_width()) as usize;
        Self {
            abi,
            frame,
            frame_bits,
            len: frame_bits.max(abi.spill_index_space()),
            register_bits: abi.catalog().reference_register_count(),
        }
    }

    /// Length of every frame bitmap this builder produces.
    pub fn frame_bitmap_len(&self) -> usize {
        self.len
    }

    /// Length of every register bitmap this builder produces.
    pub fn register_bitmap_len(&self) -> usize {
        self.register_bits
    }

    /// Build the reference map for a safepoint at which exactly the given
    /// values are live.
    pub fn build<'v, I>(&self, live: I) -> Result<ReferenceMap, RefMapError>
    where
        I: IntoIterator<Item = (Value, &'v ValueRecord)>,
    {
        let mut frame = ReferenceBitmap::new(self.len);
        let mut registers = ReferenceBitmap::new(self.register_bits);
        let mut first_error: Option<RefMapError> = None;

        for (value, record) in live {
            if !record.is_reference() {
                continue;
            }
            match self.locate(value, record.location()) {
                Ok(Some(MapBit::Frame(bit))) => {
                    trace!("  {} in {} -> frame bit {}", value, record.location(), bit);
                    frame.set(bit);
                }
                Ok(Some(MapBit::Register(bit))) => {
                    trace!("  {} in {} -> register bit {}", value, record.location(), bit);
                    registers.set(bit);
                }
                Ok(None) => {}
                Err(e) => {
                    if first_error.map_or(true, |prev| e.value() < prev.value()) {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(ReferenceMap::new(frame, registers)),
        }
    }

    fn locate(&self, value: Value, location: Location) -> Result<Option<MapBit>, RefMapError> {
        match location {
            Location::Stack(slot) => match slot.purpose {
                // The caller reports its own outgoing arguments.
                SlotPurpose::Parameter => Ok(None),
                SlotPurpose::Spill => self.stack_slot_bit(value, slot).map(|bit| Some(MapBit::Frame(bit))),
            },
            Location::Register(preg) => {
                let catalog = self.abi.catalog();
                if preg.class() != RegClass::Int || !catalog.contains(preg) {
                    return Err(RefMapError::ForeignRegister { value, preg });
                }
                match self.abi.register_spill_index(preg) {
                    Some(bit) => Ok(Some(MapBit::Frame(bit))),
                    None => Ok(Some(MapBit::Register(catalog.index_of(preg)))),
                }
            }
            Location::Immediate(bits) => Err(RefMapError::ImmediateReference { value, bits }),
            Location::Unassigned => Err(RefMapError::UnassignedReference { value }),
        }
    }

    fn stack_slot_bit(&self, value: Value, slot: StackSlot) -> Result<usize, RefMapError> {
        let width = i64::from(self.frame.stack_slot_width());
        let biased = i64::from(slot.offset) + i64::from(self.abi.minimum_frame_size());
        if biased % width != 0 {
            return Err(RefMapError::MisalignedStackSlot { value, slot });
        }
        let bit = biased / width;
        if bit < 0 || bit >= self.frame_bits as i64 {
            return Err(RefMapError::SlotOutOfRange {
                value,
                slot,
                bit,
                frame_bits: self.frame_bits,
            });
        }
        Ok(bit as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{amd64, sparc};
    use crate::catalog::Architecture;
    use crate::value::ValueRecords;
    use crate::ValueKind;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn abi(minimum_frame_size: u32) -> AbiDescriptor {
        AbiDescriptor::new(Architecture::Amd64, 8, minimum_frame_size)
    }

    fn records(values: &[(ValueKind, Location)]) -> ValueRecords {
        let mut records = ValueRecords::new();
        for &(kind, location) in values {
            records.push(ValueRecord::with_location(kind, location));
        }
        records
    }

    fn build(
        abi: &AbiDescriptor,
        frame_size: u32,
        values: &[(ValueKind, Location)],
    ) -> Result<ReferenceMap, RefMapError> {
        let records = records(values);
        ReferenceMapBuilder::new(abi, FrameLayout::for_abi(abi, frame_size)).build(records.entries())
    }

    fn frame_bits(map: &ReferenceMap) -> Vec<usize> {
        map.frame().iter().collect()
    }

    #[test]
    fn offset_includes_minimum_frame() {
        let abi = abi(92);
        let map = build(&abi, 64, &[(ValueKind::Reference, Location::spill(4))]).unwrap();
        assert_eq!(frame_bits(&map), [12]);
        assert_eq!(map.frame().len(), (92 + 64) / 8);
    }

    #[test]
    fn spill_and_parameter() {
        let abi = abi(0);
        let map = build(
            &abi,
            16,
            &[
                (ValueKind::Reference, Location::spill(0)),
                (ValueKind::Reference, Location::parameter(0)),
            ],
        )
        .unwrap();
        assert_eq!(frame_bits(&map), [0]);
        assert_eq!(map.registers().count(), 0);
    }

    #[test]
    fn parameters_never_set_bits() {
        let abi = abi(16);
        for offset in -64..=256 {
            let map = build(&abi, 32, &[(ValueKind::Reference, Location::parameter(offset))])
                .unwrap();
            assert!(!map.has_references(), "offset {}", offset);
        }
    }

    #[test]
    fn register_with_spill_index_sets_exactly_that_bit() {
        let abi = abi(64).with_spill_index(amd64::RBX, 5);
        let map = build(&abi, 64, &[(ValueKind::Reference, Location::reg(amd64::RBX))]).unwrap();
        assert_eq!(frame_bits(&map), [5]);
        assert_eq!(map.registers().count(), 0);
    }

    #[test]
    fn spill_index_space_extends_the_bitmap() {
        // A descriptor whose spill indices lie beyond its frame still
        // gets a bitmap wide enough to hold them.
        let abi = abi(0).with_spill_index(amd64::R12, 9);
        let map = build(&abi, 16, &[(ValueKind::Reference, Location::reg(amd64::R12))]).unwrap();
        assert_eq!(map.frame().len(), 10);
        assert_eq!(frame_bits(&map), [9]);
    }

    #[test]
    fn register_without_spill_index_goes_to_register_map() {
        let abi = abi(0);
        let map = build(&abi, 0, &[(ValueKind::Reference, Location::reg(amd64::R13))]).unwrap();
        assert_eq!(map.frame().count(), 0);
        assert_eq!(map.registers().len(), 16);
        assert_eq!(map.registers().iter().collect::<Vec<_>>(), [13]);
    }

    #[test]
    fn non_references_are_ignored() {
        let abi = abi(0);
        let locations = [
            Location::spill(0),
            Location::spill(3),
            Location::parameter(8),
            Location::reg(amd64::RAX),
            Location::reg(amd64::XMM0),
            Location::Immediate(42),
            Location::Unassigned,
        ];
        for kind in ValueKind::ALL {
            if kind.is_reference() {
                continue;
            }
            for &location in &locations {
                let map = build(&abi, 8, &[(kind, location)]).unwrap();
                assert!(!map.has_references(), "{} in {}", kind, location);
            }
        }
    }

    #[test]
    fn unassigned_reference_is_fatal() {
        let abi = abi(0);
        let err = build(
            &abi,
            16,
            &[
                (ValueKind::Reference, Location::spill(0)),
                (ValueKind::Reference, Location::Unassigned),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RefMapError::UnassignedReference {
                value: Value::new(1)
            }
        );
    }

    #[test]
    fn immediate_reference_is_fatal() {
        let abi = abi(0);
        let err = build(&abi, 16, &[(ValueKind::Reference, Location::Immediate(0))]).unwrap_err();
        assert!(matches!(err, RefMapError::ImmediateReference { .. }));
    }

    #[test]
    fn float_register_reference_is_fatal() {
        let abi = abi(0);
        let err = build(&abi, 16, &[(ValueKind::Reference, Location::reg(amd64::XMM0))])
            .unwrap_err();
        assert_eq!(
            err,
            RefMapError::ForeignRegister {
                value: Value::new(0),
                preg: amd64::XMM0
            }
        );
    }

    #[test]
    fn bad_slots_are_fatal() {
        let abi = abi(0);
        let err = build(&abi, 16, &[(ValueKind::Reference, Location::spill(4))]).unwrap_err();
        assert!(matches!(err, RefMapError::MisalignedStackSlot { .. }));
        let err = build(&abi, 16, &[(ValueKind::Reference, Location::spill(16))]).unwrap_err();
        assert!(matches!(err, RefMapError::SlotOutOfRange { bit: 2, .. }));
        let err = build(&abi, 16, &[(ValueKind::Reference, Location::spill(-8))]).unwrap_err();
        assert!(matches!(err, RefMapError::SlotOutOfRange { bit: -1, .. }));
    }

    #[test]
    fn lowest_offending_value_is_reported() {
        let abi = abi(0);
        let records = records(&[
            (ValueKind::Reference, Location::Immediate(1)),
            (ValueKind::Reference, Location::spill(0)),
            (ValueKind::Reference, Location::Unassigned),
        ]);
        let builder = ReferenceMapBuilder::new(&abi, FrameLayout::for_abi(&abi, 8));
        let forward = builder.build(records.entries()).unwrap_err();
        let mut reversed: Vec<_> = records.entries().collect();
        reversed.reverse();
        let backward = builder.build(reversed).unwrap_err();
        assert_eq!(forward, backward);
        assert_eq!(forward.value(), Value::new(0));
    }

    #[test]
    fn sparc_window_registers() {
        let abi = &sparc::ABI;
        let map = build(
            abi,
            16,
            &[
                (ValueKind::Reference, Location::reg(sparc::L0)),
                (ValueKind::Reference, Location::reg(sparc::I0)),
                (ValueKind::Reference, Location::reg(sparc::O0)),
                (ValueKind::Reference, Location::spill(8)),
            ],
        )
        .unwrap();
        assert_eq!(map.frame().len(), 24);
        assert_eq!(frame_bits(&map), [0, 8, 23]);
        assert_eq!(map.registers().iter().collect::<Vec<_>>(), [8]);
    }

    #[test]
    fn build_ignores_input_order() {
        let abi = abi(32).with_spill_index(amd64::RBX, 1).with_spill_index(amd64::R12, 2);
        let frame_size = 512;
        let registers = [amd64::RAX, amd64::RBX, amd64::R12, amd64::R15, amd64::RSI];
        let mut rng = ChaCha8Rng::seed_from_u64(0x5afe_9017);

        for _ in 0..20 {
            let mut values = Vec::new();
            for _ in 0..rng.gen_range(0..100) {
                let kind = ValueKind::ALL[rng.gen_range(0..ValueKind::COUNT)];
                let location = match rng.gen_range(0..3) {
                    0 => Location::spill(8 * rng.gen_range(0..(frame_size as i32 / 8))),
                    1 => Location::parameter(8 * rng.gen_range(0..8)),
                    _ => Location::reg(registers[rng.gen_range(0..registers.len())]),
                };
                let location = match (kind.class(), location) {
                    (RegClass::Float, Location::Register(_)) => Location::reg(amd64::XMM0),
                    (_, location) => location,
                };
                values.push((kind, location));
            }

            let records = records(&values);
            let builder = ReferenceMapBuilder::new(&abi, FrameLayout::for_abi(&abi, frame_size));
            let expected = builder.build(records.entries()).unwrap();

            let mut shuffled: Vec<_> = records.entries().collect();
            for _ in 0..16 {
                shuffled.shuffle(&mut rng);
                assert_eq!(builder.build(shuffled.iter().copied()).unwrap(), expected);
            }
        }
    }

    #[test]
    fn bitmap_bytes() {
        let mut bitmap = ReferenceBitmap::new(11);
        bitmap.set(0);
        bitmap.set(9);
        assert_eq!(bitmap.to_bytes(), [0b0000_0001, 0b0000_0010]);
        assert_eq!(ReferenceBitmap::from_bytes(&bitmap.to_bytes(), 11), bitmap);
        assert!(!bitmap.get(200));
        assert_eq!(ReferenceBitmap::new(0).to_bytes(), []);
    }
}
