/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The packed reference-map table of one compiled method.
//!
//! Entries are sorted by code offset. Each entry is `frame_bytes +
//! register_bytes` bytes of bitmap, frame bitmap first, each bitmap
//! padded to whole bytes and stored least-significant bit first. All
//! entries of a method have the same bitmap lengths, so the table is one
//! flat byte vector plus the sorted offsets.

use crate::refmap::{ReferenceBitmap, ReferenceMap};
use crate::CodegenError;
use alloc::vec::Vec;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ReferenceMapTable {
    frame_bits: usize,
    register_bits: usize,
    pcs: Vec<u32>,
    data: Vec<u8>,
}

impl ReferenceMapTable {
    /// An empty table whose entries will hold the given bitmap lengths.
    pub fn new(frame_bits: usize, register_bits: usize) -> Self {
        Self {
            frame_bits,
            register_bits,
            pcs: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Pack per-safepoint maps, in any order, into a table. Every map must
    /// have the given bitmap lengths.
    pub fn from_maps(
        frame_bits: usize,
        register_bits: usize,
        mut maps: Vec<(u32, ReferenceMap)>,
    ) -> Result<Self, CodegenError> {
        maps.sort_unstable_by_key(|(pc, _)| *pc);
        if let Some(pair) = maps.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(CodegenError::DuplicateSafepoint { pc: pair[0].0 });
        }

        let mut table = Self::new(frame_bits, register_bits);
        let stride = table.stride();
        let frame_bytes = table.frame_bytes();
        table.pcs.reserve(maps.len());
        table.data.resize(maps.len() * stride, 0);
        for (i, (pc, map)) in maps.iter().enumerate() {
            assert_eq!(map.frame().len(), frame_bits);
            assert_eq!(map.registers().len(), register_bits);
            table.pcs.push(*pc);
            let entry = &mut table.data[i * stride..(i + 1) * stride];
            let (frame, registers) = entry.split_at_mut(frame_bytes);
            map.frame().write_bytes(frame);
            map.registers().write_bytes(registers);
        }
        Ok(table)
    }

    fn frame_bytes(&self) -> usize {
        (self.frame_bits + 7) / 8
    }

    fn register_bytes(&self) -> usize {
        (self.register_bits + 7) / 8
    }

    fn stride(&self) -> usize {
        self.frame_bytes() + self.register_bytes()
    }

    /// Number of safepoints in the table.
    pub fn len(&self) -> usize {
        self.pcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pcs.is_empty()
    }

    pub fn frame_bits(&self) -> usize {
        self.frame_bits
    }

    pub fn register_bits(&self) -> usize {
        self.register_bits
    }

    /// The code offsets of all safepoints, ascending.
    pub fn pcs(&self) -> &[u32] {
        &self.pcs
    }

    /// The raw bitmap bytes, one fixed-size entry per safepoint.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The map of the safepoint at code offset `pc`.
    pub fn lookup(&self, pc: u32) -> Option<ReferenceMapView<'_>> {
        self.pcs.binary_search(&pc).ok().map(|i| self.entry(i))
    }

    /// All entries in code-offset order.
    pub fn iter(&self) -> impl Iterator<Item = ReferenceMapView<'_>> + '_ {
        (0..self.len()).map(move |i| self.entry(i))
    }

    fn entry(&self, i: usize) -> ReferenceMapView<'_> {
        let entry = &self.data[i * self.stride()..(i + 1) * self.stride()];
        let (frame, registers) = entry.split_at(self.frame_bytes());
        ReferenceMapView {
            pc: self.pcs[i],
            frame,
            registers,
            frame_bits: self.frame_bits,
            register_bits: self.register_bits,
        }
    }
}

/// One entry of a [`ReferenceMapTable`], read in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceMapView<'a> {
    pc: u32,
    frame: &'a [u8],
    registers: &'a [u8],
    frame_bits: usize,
    register_bits: usize,
}

fn bit(bytes: &[u8], len: usize, i: usize) -> bool {
    i < len && bytes[i / 8] & (1 << (i % 8)) != 0
}

fn set_bits(bytes: &[u8], len: usize) -> impl Iterator<Item = usize> + '_ {
    (0..len).filter(move |&i| bit(bytes, len, i))
}

impl<'a> ReferenceMapView<'a> {
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Whether stack slot `slot` (counted from the bottom of the frame)
    /// holds a live reference.
    pub fn is_frame_slot_reference(&self, slot: usize) -> bool {
        bit(self.frame, self.frame_bits, slot)
    }

    /// Whether the general-purpose register with catalog index `index`
    /// holds a live reference.
    pub fn is_register_reference(&self, index: usize) -> bool {
        bit(self.registers, self.register_bits, index)
    }

    pub fn frame_slots(&self) -> impl Iterator<Item = usize> + 'a {
        set_bits(self.frame, self.frame_bits)
    }

    pub fn registers(&self) -> impl Iterator<Item = usize> + 'a {
        set_bits(self.registers, self.register_bits)
    }

    pub fn frame_bytes(&self) -> &'a [u8] {
        self.frame
    }

    pub fn register_bytes(&self) -> &'a [u8] {
        self.registers
    }

    /// Unpack into an owned map.
    pub fn to_map(&self) -> ReferenceMap {
        ReferenceMap::new(
            ReferenceBitmap::from_bytes(self.frame, self.frame_bits),
            ReferenceBitmap::from_bytes(self.registers, self.register_bits),
        )
    }
}
