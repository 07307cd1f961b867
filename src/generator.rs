/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! The per-architecture driver.
//!
//! A [`Generator`] binds the ABI and register catalog of one target. For
//! each method it hands out a [`MethodCompilation`], through which the
//! allocator records value kinds, locations, safepoints and liveness.
//! [`MethodCompilation::finish`] then checks the allocation, builds one
//! reference map per safepoint and packs them into the immutable table
//! of the [`CompiledMethod`].

use crate::abi::{AbiDescriptor, Role};
use crate::arch::Target;
use crate::catalog::{Architecture, RegisterCatalog};
use crate::checker::Checker;
use crate::refmap::{FrameLayout, ReferenceMapBuilder};
use crate::table::ReferenceMapTable;
use crate::value::{
    Safepoint, SafepointInfo, SafepointKind, Safepoints, Value, ValueRecord, ValueRecords,
};
use crate::{CodegenError, CompileError, Location, RegClass, SlotPurpose, ValueKind};
use alloc::string::String;
use alloc::vec::Vec;
use core::marker::PhantomData;

/// Code generation support for the target `T`.
#[derive(Clone, Copy, Debug)]
pub struct Generator<T: Target> {
    catch_parameter: Location,
    _target: PhantomData<T>,
}

impl<T: Target> Generator<T> {
    /// Bind the target's ABI. Fails if the ABI cannot say where an
    /// exception handler finds the thrown object.
    pub fn new() -> Result<Self, CodegenError> {
        let abi = T::abi();
        let role = abi.register_acting_as(Role::ExceptionResult, RegClass::Int)?;
        let result = abi.result_location(ValueKind::Reference)?;
        if result != Location::reg(role) {
            return Err(CodegenError::InconsistentCatchParameter { role, result });
        }
        trace!(
            "generator for {}: catch parameter in {}",
            T::ARCH,
            T::catalog().name(role)
        );
        Ok(Self {
            catch_parameter: result,
            _target: PhantomData,
        })
    }

    pub fn arch(&self) -> Architecture {
        T::ARCH
    }

    pub fn abi(&self) -> &'static AbiDescriptor {
        T::abi()
    }

    pub fn catalog(&self) -> &'static RegisterCatalog {
        T::catalog()
    }

    /// Where an exception handler finds the thrown object on entry.
    pub fn catch_parameter_location(&self) -> Location {
        self.catch_parameter
    }

    pub fn begin_method(&self, name: impl Into<String>) -> MethodCompilation<'static> {
        MethodCompilation::new(name.into(), T::abi())
    }
}

/// The bookkeeping of one method being compiled.
#[derive(Clone, Debug)]
pub struct MethodCompilation<'a> {
    name: String,
    abi: &'a AbiDescriptor,
    values: ValueRecords,
    safepoints: Safepoints,
    /// Bytes of spill area in use, above the ABI's minimum frame.
    frame_size: u32,
}

impl<'a> MethodCompilation<'a> {
    pub fn new(name: String, abi: &'a AbiDescriptor) -> Self {
        Self {
            name,
            abi,
            values: ValueRecords::new(),
            safepoints: Safepoints::new(),
            frame_size: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> Architecture {
        self.abi.arch()
    }

    /// A new value without a location.
    pub fn new_value(&mut self, kind: ValueKind) -> Value {
        self.values.push(ValueRecord::new(kind))
    }

    /// A new value materialized as an immediate.
    pub fn constant(&mut self, kind: ValueKind, bits: i64) -> Value {
        self.values
            .push(ValueRecord::with_location(kind, Location::Immediate(bits)))
    }

    /// Set the location of `value`. A value is assigned exactly once.
    ///
    /// A spill slot above the current frame grows the frame to cover it.
    pub fn assign(&mut self, value: Value, location: Location) -> Result<(), CodegenError> {
        let kind = self.values[value].kind();
        let valid = match location {
            Location::Register(preg) => {
                preg.class() == kind.class() && self.abi.catalog().contains(preg)
            }
            Location::Stack(_) | Location::Immediate(_) => true,
            Location::Unassigned => false,
        };
        if !valid {
            return Err(CodegenError::InvalidLocation {
                value,
                kind,
                location,
            });
        }

        self.values[value]
            .set_location(location)
            .map_err(|previous| CodegenError::LocationReassigned {
                value,
                previous,
                attempted: location,
            })?;
        trace!("{}: {} := {}", self.name, value, location);

        if let Location::Stack(slot) = location {
            if slot.purpose == SlotPurpose::Spill && slot.offset >= 0 {
                let end = slot.offset as u32 + self.slot_bytes(kind);
                self.frame_size = self.frame_size.max(end);
            }
        }
        Ok(())
    }

    /// Bytes occupied by a value of `kind`, rounded up to whole stack slots.
    fn slot_bytes(&self, kind: ValueKind) -> u32 {
        let slot = self.abi.stack_slot_size();
        let size = kind.size_in_bytes(self.abi.arch().word_size());
        (size + slot - 1) / slot * slot
    }

    /// Allocate a fresh spill slot for a value of `kind` at the top of
    /// the frame.
    pub fn new_spill_slot(&mut self, kind: ValueKind) -> Location {
        let offset = self.frame_size;
        self.frame_size += self.slot_bytes(kind);
        Location::spill(offset as i32)
    }

    /// Grow the spill area to at least `bytes`.
    pub fn reserve_frame(&mut self, bytes: u32) {
        self.frame_size = self.frame_size.max(bytes);
    }

    /// The incoming argument at `offset` in the caller's frame.
    pub fn parameter_slot(&self, offset: i32) -> Location {
        Location::parameter(offset)
    }

    pub fn add_safepoint(&mut self, pc: u32, kind: SafepointKind) -> Safepoint {
        self.safepoints.push(SafepointInfo { pc, kind })
    }

    pub fn mark_live(&mut self, value: Value, safepoint: Safepoint) {
        debug_assert!(safepoint.index() < self.safepoints.len());
        self.values[value].mark_live(safepoint);
    }

    pub fn value(&self, value: Value) -> &ValueRecord {
        &self.values[value]
    }

    pub fn values(&self) -> &ValueRecords {
        &self.values
    }

    pub fn safepoint(&self, safepoint: Safepoint) -> &SafepointInfo {
        &self.safepoints[safepoint]
    }

    pub fn safepoints(&self) -> &Safepoints {
        &self.safepoints
    }

    /// The values live at `safepoint`, in value order.
    pub fn live_values(
        &self,
        safepoint: Safepoint,
    ) -> impl Iterator<Item = (Value, &ValueRecord)> + '_ {
        self.values.live_at(safepoint)
    }

    /// Bytes of spill area in use, above the ABI's minimum frame.
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn frame_layout(&self) -> FrameLayout {
        FrameLayout::for_abi(self.abi, self.frame_size)
    }

    /// Check the allocation and build the method's reference maps.
    pub fn finish(self) -> Result<CompiledMethod, CompileError> {
        match self.build_table() {
            Ok(maps) => {
                let compiled = CompiledMethod {
                    name: self.name,
                    arch: self.abi.arch(),
                    frame_size: self.frame_size,
                    maps,
                };
                if trace_enabled!() {
                    trace!("{}", compiled);
                }
                Ok(compiled)
            }
            Err(kind) => Err(CompileError {
                method: self.name,
                arch: self.abi.arch(),
                kind,
            }),
        }
    }

    fn build_table(&self) -> Result<ReferenceMapTable, CodegenError> {
        Checker::new(self.abi).run(&self.values, &self.safepoints)?;

        let builder = ReferenceMapBuilder::new(self.abi, self.frame_layout());
        let mut maps = Vec::with_capacity(self.safepoints.len());
        for (safepoint, info) in self.safepoints.entries() {
            trace!("{}: {} at {:#x}", self.name, safepoint, info.pc);
            maps.push((info.pc, builder.build(self.values.live_at(safepoint))?));
        }
        ReferenceMapTable::from_maps(
            builder.frame_bitmap_len(),
            builder.register_bitmap_len(),
            maps,
        )
    }
}

/// The GC metadata of a compiled method.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct CompiledMethod {
    name: String,
    arch: Architecture,
    frame_size: u32,
    maps: ReferenceMapTable,
}

impl CompiledMethod {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    /// Bytes of spill area above the ABI's minimum frame.
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn reference_maps(&self) -> &ReferenceMapTable {
        &self.maps
    }
}

impl core::fmt::Display for CompiledMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let catalog = self.arch.catalog();
        writeln!(
            f,
            "{} ({}, frame {} bytes, {} safepoint(s))",
            self.name,
            self.arch,
            self.frame_size,
            self.maps.len()
        )?;
        for view in self.maps.iter() {
            write!(f, "  {:#06x}: frame [", view.pc())?;
            for (i, slot) in view.frame_slots().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", slot)?;
            }
            f.write_str("] regs [")?;
            for (i, index) in view.registers().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                f.write_str(catalog.name(catalog.registers(RegClass::Int)[index]))?;
            }
            f.write_str("]\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::AbiError;
    use crate::arch::{aarch64, amd64, ia32, sparc};
    use crate::refmap::RefMapError;
    use crate::PReg;
    use alloc::string::ToString;

    #[test]
    fn catch_parameter_per_architecture() {
        assert_eq!(
            Generator::<amd64::Amd64>::new().unwrap().catch_parameter_location(),
            Location::reg(amd64::RAX)
        );
        assert_eq!(
            Generator::<aarch64::Aarch64>::new().unwrap().catch_parameter_location(),
            Location::reg(aarch64::X0)
        );
        assert_eq!(
            Generator::<ia32::Ia32>::new().unwrap().catch_parameter_location(),
            Location::reg(ia32::EAX)
        );
        assert_eq!(
            Generator::<sparc::Sparc>::new().unwrap().catch_parameter_location(),
            Location::reg(sparc::O0)
        );
    }

    #[cfg(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "x86",
        target_arch = "sparc64"
    ))]
    #[test]
    fn host_target_generator() {
        let generator = Generator::<crate::arch::HostTarget>::new().unwrap();
        assert_eq!(generator.abi().arch(), generator.arch());
    }

    static MISMATCHED: AbiDescriptor = AbiDescriptor::new(Architecture::Amd64, 8, 0)
        .with_role(Role::ExceptionResult, amd64::RDX)
        .with_result(ValueKind::Reference, Location::reg(amd64::RAX));

    static UNBOUND: AbiDescriptor = AbiDescriptor::new(Architecture::Amd64, 8, 0)
        .with_result(ValueKind::Reference, Location::reg(amd64::RAX));

    struct Mismatched;
    impl Target for Mismatched {
        const ARCH: Architecture = Architecture::Amd64;
        fn abi() -> &'static AbiDescriptor {
            &MISMATCHED
        }
    }

    struct Unbound;
    impl Target for Unbound {
        const ARCH: Architecture = Architecture::Amd64;
        fn abi() -> &'static AbiDescriptor {
            &UNBOUND
        }
    }

    #[test]
    fn catch_parameter_must_match_reference_result() {
        assert!(matches!(
            Generator::<Mismatched>::new(),
            Err(CodegenError::InconsistentCatchParameter {
                role: amd64::RDX,
                ..
            })
        ));
        assert!(matches!(
            Generator::<Unbound>::new(),
            Err(CodegenError::Abi(AbiError::UnboundRole {
                role: Role::ExceptionResult,
                ..
            }))
        ));
    }

    #[test]
    fn end_to_end() {
        let generator = Generator::<amd64::Amd64>::new().unwrap();
        let mut m = generator.begin_method("Foo.bar");

        let spilled = m.new_value(ValueKind::Reference);
        let param = m.new_value(ValueKind::Reference);
        let saved = m.new_value(ValueKind::Reference);
        let polled = m.new_value(ValueKind::Reference);
        let count = m.new_value(ValueKind::Int);

        let slot = m.new_spill_slot(ValueKind::Reference);
        assert_eq!(slot, Location::spill(0));
        m.assign(spilled, slot).unwrap();
        m.assign(param, m.parameter_slot(0)).unwrap();
        m.assign(saved, Location::reg(amd64::RBX)).unwrap();
        m.assign(polled, Location::reg(amd64::RCX)).unwrap();
        m.assign(count, Location::reg(amd64::RDX)).unwrap();

        let call = m.add_safepoint(0x30, SafepointKind::Call);
        let poll = m.add_safepoint(0x10, SafepointKind::Poll);
        for v in [spilled, param, saved, count] {
            m.mark_live(v, call);
        }
        for v in [spilled, polled, count] {
            m.mark_live(v, poll);
        }
        assert_eq!(m.live_values(poll).count(), 3);
        assert_eq!(m.frame_layout(), FrameLayout::new(8, 8));

        let method = m.finish().unwrap();
        assert_eq!(method.name(), "Foo.bar");
        assert_eq!(method.frame_size(), 8);
        let maps = method.reference_maps();
        assert_eq!(maps.pcs(), [0x10, 0x30]);

        let at_call = maps.lookup(0x30).unwrap();
        assert_eq!(at_call.frame_slots().collect::<Vec<_>>(), [0]);
        assert_eq!(at_call.registers().collect::<Vec<_>>(), [3]);

        let at_poll = maps.lookup(0x10).unwrap();
        assert_eq!(at_poll.frame_slots().collect::<Vec<_>>(), [0]);
        assert_eq!(at_poll.registers().collect::<Vec<_>>(), [1]);

        let listing = method.to_string();
        assert!(listing.contains("0x0030: frame [0] regs [rbx]"), "{}", listing);
    }

    #[test]
    fn spill_slots_grow_the_frame() {
        let generator = Generator::<ia32::Ia32>::new().unwrap();
        let mut m = generator.begin_method("m");
        assert_eq!(m.new_spill_slot(ValueKind::Reference), Location::spill(0));
        assert_eq!(m.new_spill_slot(ValueKind::Long), Location::spill(4));
        assert_eq!(m.new_spill_slot(ValueKind::Int), Location::spill(12));
        assert_eq!(m.frame_layout(), FrameLayout::new(16, 4));

        // An explicitly chosen slot above the frame extends it.
        let v = m.new_value(ValueKind::Double);
        m.assign(v, Location::spill(40)).unwrap();
        assert_eq!(m.frame_layout().frame_size(), 48);

        // Reserving never shrinks the frame.
        m.reserve_frame(32);
        assert_eq!(m.frame_size(), 48);
        m.reserve_frame(64);
        assert_eq!(m.frame_size(), 64);
        assert_eq!(m.new_spill_slot(ValueKind::Reference), Location::spill(64));
    }

    #[test]
    fn assignment_errors() {
        let generator = Generator::<amd64::Amd64>::new().unwrap();
        let mut m = generator.begin_method("m");
        let r = m.new_value(ValueKind::Reference);
        let d = m.new_value(ValueKind::Double);

        assert!(matches!(
            m.assign(r, Location::reg(amd64::XMM0)),
            Err(CodegenError::InvalidLocation { .. })
        ));
        assert!(matches!(
            m.assign(r, Location::reg(PReg::new(20, RegClass::Int))),
            Err(CodegenError::InvalidLocation { .. })
        ));
        assert!(matches!(
            m.assign(d, Location::Unassigned),
            Err(CodegenError::InvalidLocation { .. })
        ));

        m.assign(r, Location::spill(0)).unwrap();
        match m.assign(r, Location::spill(8)) {
            Err(CodegenError::LocationReassigned {
                value,
                previous,
                attempted,
            }) => {
                assert_eq!(value, r);
                assert_eq!(previous, Location::spill(0));
                assert_eq!(attempted, Location::spill(8));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(m.value(r).location(), Location::spill(0));
    }

    #[test]
    fn finish_errors_carry_context() {
        let generator = Generator::<sparc::Sparc>::new().unwrap();

        let mut m = generator.begin_method("unassigned");
        let v = m.new_value(ValueKind::Reference);
        let sp = m.add_safepoint(4, SafepointKind::Poll);
        m.mark_live(v, sp);
        let err = m.finish().unwrap_err();
        assert_eq!(err.method, "unassigned");
        assert_eq!(err.arch, Architecture::SparcV9);
        assert!(matches!(err.kind, CodegenError::Checker(_)));

        let mut m = generator.begin_method("misaligned");
        let v = m.new_value(ValueKind::Reference);
        m.assign(v, Location::spill(4)).unwrap();
        let sp = m.add_safepoint(4, SafepointKind::Call);
        m.mark_live(v, sp);
        let err = m.finish().unwrap_err();
        assert!(matches!(
            err.kind,
            CodegenError::RefMap(RefMapError::MisalignedStackSlot { .. })
        ));

        let mut m = generator.begin_method("duplicate");
        m.add_safepoint(8, SafepointKind::Call);
        m.add_safepoint(8, SafepointKind::Poll);
        let err = m.finish().unwrap_err();
        assert!(matches!(err.kind, CodegenError::DuplicateSafepoint { pc: 8 }));
    }

    #[test]
    fn constants() {
        let generator = Generator::<amd64::Amd64>::new().unwrap();
        let mut m = generator.begin_method("constants");
        let n = m.constant(ValueKind::Long, -1);
        let null = m.constant(ValueKind::Reference, 0);
        assert_eq!(m.value(n).location(), Location::Immediate(-1));
        let sp = m.add_safepoint(0x10, SafepointKind::Poll);
        m.mark_live(n, sp);
        let ok = m.clone().finish().unwrap();
        assert!(!ok.reference_maps().lookup(0x10).unwrap().to_map().has_references());

        m.mark_live(null, sp);
        let err = m.finish().unwrap_err();
        assert!(matches!(err.kind, CodegenError::Checker(_)));
    }

    #[test]
    fn sparc_window_register_across_call() {
        let generator = Generator::<sparc::Sparc>::new().unwrap();
        let mut m = generator.begin_method("windowed");
        let v = m.new_value(ValueKind::Reference);
        m.assign(v, Location::reg(sparc::I0)).unwrap();
        let w = m.new_value(ValueKind::Reference);
        let slot = m.new_spill_slot(ValueKind::Reference);
        m.assign(w, slot).unwrap();
        let sp = m.add_safepoint(0x100, SafepointKind::Call);
        m.mark_live(v, sp);
        m.mark_live(w, sp);

        let method = m.finish().unwrap();
        let view = method.reference_maps().lookup(0x100).unwrap();
        // %i0 reports through save-area word 8; the first spill slot
        // follows the 22-word minimum frame.
        assert_eq!(view.frame_slots().collect::<Vec<_>>(), [8, 22]);
        assert_eq!(view.registers().count(), 0);
    }
}
