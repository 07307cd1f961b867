/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! ABI descriptors.
//!
//! An [`AbiDescriptor`] answers every architecture-specific question the
//! rest of the backend asks: which register plays a given role, where a
//! result of a given kind is returned, how wide a stack slot is, how
//! much of the frame is reserved below the first spill slot, which
//! registers the allocator may use and which of those survive a call.
//!
//! The per-architecture descriptors in [`crate::arch`] are `static`
//! items built with the `const` builder methods below. During bootstrap
//! a descriptor can also be completed incrementally with the `bind_*`
//! methods; roles that were never bound report
//! [`AbiError::UnboundRole`].

use crate::catalog::{Architecture, RegisterCatalog};
use crate::{Location, PReg, PRegSet, RegClass, ValueKind};

/// An abstract register role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Role {
    StackPointer = 0,
    FramePointer = 1,
    /// Where a result of the role's class is returned.
    Result = 2,
    /// Reserved for code sequences that need a temporary; never allocated.
    Scratch = 3,
    /// Holds the address polled at safepoints; never allocated.
    SafepointLatch = 4,
    /// Where a thrown object is delivered on an exception edge.
    ExceptionResult = 5,
}

impl Role {
    pub const COUNT: usize = 6;
    pub const ALL: [Role; Self::COUNT] = [
        Role::StackPointer,
        Role::FramePointer,
        Role::Result,
        Role::Scratch,
        Role::SafepointLatch,
        Role::ExceptionResult,
    ];

    /// Roles whose register must never be handed to the allocator.
    pub const fn is_reserved(self) -> bool {
        matches!(
            self,
            Role::StackPointer | Role::FramePointer | Role::Scratch | Role::SafepointLatch
        )
    }
}

/// A question the ABI could not answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbiError {
    /// The architecture cannot return a value of this kind directly; the
    /// caller has to decompose it first.
    UnsupportedKind { arch: Architecture, kind: ValueKind },
    /// No register was ever bound to this role.
    UnboundRole {
        arch: Architecture,
        role: Role,
        class: RegClass,
    },
    /// `validate` found an internal inconsistency.
    Malformed {
        arch: Architecture,
        what: &'static str,
    },
}

impl core::fmt::Display for AbiError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            AbiError::UnsupportedKind { arch, kind } => {
                write!(f, "{} cannot return a {} value directly", arch, kind)
            }
            AbiError::UnboundRole { arch, role, class } => write!(
                f,
                "{} has no {:?} register bound to role {:?}",
                arch, class, role
            ),
            AbiError::Malformed { arch, what } => {
                write!(f, "malformed {} ABI descriptor: {}", arch, what)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AbiError {}

/// The calling convention and frame geometry of one architecture.
#[derive(Clone, Debug)]
pub struct AbiDescriptor {
    arch: Architecture,
    stack_slot_size: u32,
    minimum_frame_size: u32,
    allocatable_by_class: [&'static [PReg]; 2],
    callee_saved: PRegSet,
    roles: [[Option<PReg>; 2]; Role::COUNT],
    results: [Option<Location>; ValueKind::COUNT],
    spill_indices: [Option<u16>; PReg::MAX_INDEX],
}

impl AbiDescriptor {
    /// An empty descriptor: no allocatable registers, no roles, no
    /// result locations.
    pub const fn new(arch: Architecture, stack_slot_size: u32, minimum_frame_size: u32) -> Self {
        AbiDescriptor {
            arch,
            stack_slot_size,
            minimum_frame_size,
            allocatable_by_class: [&[], &[]],
            callee_saved: PRegSet::empty(),
            roles: [[None; 2]; Role::COUNT],
            results: [None; ValueKind::COUNT],
            spill_indices: [None; PReg::MAX_INDEX],
        }
    }

    pub const fn with_allocatable(mut self, class: RegClass, regs: &'static [PReg]) -> Self {
        self.allocatable_by_class[class as usize] = regs;
        self
    }

    pub const fn with_callee_saved(mut self, regs: PRegSet) -> Self {
        self.callee_saved = regs;
        self
    }

    pub const fn with_role(mut self, role: Role, preg: PReg) -> Self {
        self.roles[role as usize][preg.class() as usize] = Some(preg);
        self
    }

    pub const fn with_result(mut self, kind: ValueKind, location: Location) -> Self {
        self.results[kind as usize] = Some(location);
        self
    }

    /// Declare that the value of `preg` is found at bit `index` of the
    /// frame reference map while the method is suspended at a safepoint.
    pub const fn with_spill_index(mut self, preg: PReg, index: u16) -> Self {
        self.spill_indices[preg.index()] = Some(index);
        self
    }

    pub fn bind_role(&mut self, role: Role, preg: PReg) {
        self.roles[role as usize][preg.class() as usize] = Some(preg);
    }

    pub fn bind_result(&mut self, kind: ValueKind, location: Location) {
        self.results[kind as usize] = Some(location);
    }

    pub fn bind_spill_index(&mut self, preg: PReg, index: u16) {
        self.spill_indices[preg.index()] = Some(index);
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn catalog(&self) -> &'static RegisterCatalog {
        self.arch.catalog()
    }

    /// Width in bytes of one stack slot; the architecture's word size.
    pub fn stack_slot_size(&self) -> u32 {
        self.stack_slot_size
    }

    /// Bytes reserved at the bottom of every frame before the first
    /// spill slot.
    pub fn minimum_frame_size(&self) -> u32 {
        self.minimum_frame_size
    }

    /// Where a value of `kind` is returned.
    pub fn result_location(&self, kind: ValueKind) -> Result<Location, AbiError> {
        self.results[kind as usize].ok_or(AbiError::UnsupportedKind {
            arch: self.arch,
            kind,
        })
    }

    /// The register of `class` that plays `role`.
    pub fn register_acting_as(&self, role: Role, class: RegClass) -> Result<PReg, AbiError> {
        self.roles[role as usize][class as usize].ok_or(AbiError::UnboundRole {
            arch: self.arch,
            role,
            class,
        })
    }

    /// Registers the allocator may use, in preference order.
    pub fn allocatable(&self, class: RegClass) -> &'static [PReg] {
        self.allocatable_by_class[class as usize]
    }

    pub fn callee_saved(&self) -> PRegSet {
        self.callee_saved
    }

    /// Whether a value held in `preg` survives a call.
    pub fn is_preserved_across_call(&self, preg: PReg) -> bool {
        self.callee_saved.contains(preg)
    }

    /// The reference-map bit at which the collector finds the value of
    /// `preg`, if the register is spilled to a fixed place in the frame
    /// while suspended.
    pub fn register_spill_index(&self, preg: PReg) -> Option<usize> {
        self.spill_indices[preg.index()].map(usize::from)
    }

    /// One past the largest register spill index, or zero.
    pub fn spill_index_space(&self) -> usize {
        self.spill_indices
            .iter()
            .filter_map(|index| index.map(|i| i as usize + 1))
            .max()
            .unwrap_or(0)
    }

    /// Check the descriptor for internal consistency.
    pub fn validate(&self) -> Result<(), AbiError> {
        let malformed = |what| {
            Err(AbiError::Malformed {
                arch: self.arch,
                what,
            })
        };
        let catalog = self.catalog();

        if self.stack_slot_size != self.arch.word_size() {
            return malformed("stack slot size differs from the word size");
        }
        if self.minimum_frame_size % self.stack_slot_size != 0 {
            return malformed("minimum frame size is not a whole number of slots");
        }

        for class in RegClass::ALL {
            for &preg in self.allocatable(class) {
                if preg.class() != class || !catalog.contains(preg) {
                    return malformed("allocatable register outside the catalog");
                }
                for role in Role::ALL {
                    if role.is_reserved() && self.roles[role as usize][class as usize] == Some(preg)
                    {
                        return malformed("reserved register is allocatable");
                    }
                }
            }
        }

        for (preg_index, spill_index) in self.spill_indices.iter().enumerate() {
            if let Some(spill_index) = spill_index {
                let preg = PReg::from_index(preg_index);
                if preg.class() != RegClass::Int || !catalog.contains(preg) {
                    return malformed("spill index for a register outside the catalog");
                }
                // Spilled registers must land in the reserved area, below
                // the first spill slot.
                let reserved_slots = self.minimum_frame_size / self.stack_slot_size;
                if u32::from(*spill_index) >= reserved_slots {
                    return malformed("register spill index overlaps the spill area");
                }
            }
        }

        for kind in ValueKind::ALL {
            match self.results[kind as usize] {
                Some(Location::Register(preg)) => {
                    if preg.class() != kind.class() || !catalog.contains(preg) {
                        return malformed("result register of the wrong class");
                    }
                }
                Some(Location::Stack(_)) | None => {}
                Some(Location::Immediate(_)) | Some(Location::Unassigned) => {
                    return malformed("result location is not storage");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::amd64;

    #[test]
    fn builtin_descriptors_validate() {
        for arch in Architecture::ALL {
            let abi = arch.abi();
            assert_eq!(abi.arch(), arch);
            abi.validate().unwrap();
        }
    }

    #[test]
    fn role_resolution_is_pure() {
        for arch in Architecture::ALL {
            let abi = arch.abi();
            for role in Role::ALL {
                for class in RegClass::ALL {
                    assert_eq!(
                        abi.register_acting_as(role, class),
                        abi.register_acting_as(role, class)
                    );
                }
            }
            for kind in ValueKind::ALL {
                assert_eq!(abi.result_location(kind), abi.result_location(kind));
            }
        }
    }

    #[test]
    fn all_integer_roles_are_bound() {
        for arch in Architecture::ALL {
            for role in Role::ALL {
                arch.abi().register_acting_as(role, RegClass::Int).unwrap();
            }
        }
    }

    #[test]
    fn partial_descriptor_reports_unbound_role() {
        let mut abi = AbiDescriptor::new(Architecture::Amd64, 8, 0);
        assert_eq!(
            abi.register_acting_as(Role::SafepointLatch, RegClass::Int),
            Err(AbiError::UnboundRole {
                arch: Architecture::Amd64,
                role: Role::SafepointLatch,
                class: RegClass::Int,
            })
        );
        abi.bind_role(Role::SafepointLatch, amd64::R14);
        assert_eq!(
            abi.register_acting_as(Role::SafepointLatch, RegClass::Int),
            Ok(amd64::R14)
        );
        assert!(abi
            .register_acting_as(Role::SafepointLatch, RegClass::Float)
            .is_err());
    }

    #[test]
    fn unsupported_result_kind() {
        let abi = AbiDescriptor::new(Architecture::Amd64, 8, 0)
            .with_result(ValueKind::Reference, Location::reg(amd64::RAX));
        assert_eq!(
            abi.result_location(ValueKind::Double),
            Err(AbiError::UnsupportedKind {
                arch: Architecture::Amd64,
                kind: ValueKind::Double,
            })
        );
        assert_eq!(
            abi.result_location(ValueKind::Reference),
            Ok(Location::reg(amd64::RAX))
        );
    }

    #[test]
    fn validate_rejects_reserved_allocatable() {
        static REGS: [PReg; 2] = [amd64::RAX, amd64::RSP];
        let abi = AbiDescriptor::new(Architecture::Amd64, 8, 0)
            .with_allocatable(RegClass::Int, &REGS)
            .with_role(Role::StackPointer, amd64::RSP);
        assert!(matches!(abi.validate(), Err(AbiError::Malformed { .. })));
    }

    #[test]
    fn validate_rejects_wrong_slot_size() {
        let abi = AbiDescriptor::new(Architecture::Amd64, 4, 0);
        assert!(matches!(abi.validate(), Err(AbiError::Malformed { .. })));
    }

    #[test]
    fn spill_index_space() {
        let abi = AbiDescriptor::new(Architecture::Amd64, 8, 32)
            .with_spill_index(amd64::RBX, 3)
            .with_spill_index(amd64::R12, 1);
        assert_eq!(abi.spill_index_space(), 4);
        assert_eq!(abi.register_spill_index(amd64::RBX), Some(3));
        assert_eq!(abi.register_spill_index(amd64::RAX), None);
        abi.validate().unwrap();
        assert_eq!(Architecture::Amd64.abi().spill_index_space(), 0);
    }
}
