/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Allocation contract checker.
//!
//! Before any reference map is built, the checker verifies that the
//! locations handed out by the allocator are ones the collector can work
//! with. At every safepoint, each live reference must be:
//!
//!   - assigned, and not an immediate;
//!   - if in a register, a general-purpose register of the target;
//!   - at a call, in a stack slot or in a register the ABI preserves
//!     across calls. A caller-saved register is clobbered by the callee,
//!     and the collector would find garbage in it.
//!
//! At a poll, the trap handler saves the entire register file, so any
//! general-purpose register is acceptable.
//!
//! Unlike reference-map construction, which stops at the first bad
//! value, the checker collects every violation so that an allocator bug
//! can be diagnosed from a single run. Location errors that do not depend
//! on the safepoint are reported once per value.

use crate::abi::AbiDescriptor;
use crate::value::{Safepoint, SafepointKind, Safepoints, Value, ValueRecords};
use crate::{FxHashSet, Location, PReg, RegClass};
use alloc::vec::Vec;
use smallvec::SmallVec;

/// A set of errors detected by the allocation checker.
#[derive(Clone, Debug)]
pub struct CheckerErrors {
    errors: Vec<CheckerError>,
}

impl CheckerErrors {
    pub fn errors(&self) -> &[CheckerError] {
        &self.errors
    }
}

impl core::fmt::Display for CheckerErrors {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{} allocation error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {}", error)?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CheckerErrors {}

/// A single error detected by the allocation checker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckerError {
    ClobberedReference {
        value: Value,
        safepoint: Safepoint,
        pc: u32,
        preg: PReg,
    },
    UnassignedReference {
        value: Value,
        safepoint: Safepoint,
    },
    ImmediateReference {
        value: Value,
        safepoint: Safepoint,
    },
    ForeignRegister {
        value: Value,
        safepoint: Safepoint,
        preg: PReg,
    },
}

impl CheckerError {
    pub fn value(&self) -> Value {
        match *self {
            CheckerError::ClobberedReference { value, .. }
            | CheckerError::UnassignedReference { value, .. }
            | CheckerError::ImmediateReference { value, .. }
            | CheckerError::ForeignRegister { value, .. } => value,
        }
    }
}

impl core::fmt::Display for CheckerError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            CheckerError::ClobberedReference {
                value,
                safepoint,
                pc,
                preg,
            } => write!(
                f,
                "{}: reference {} is live across the call at {:#x} in caller-saved {}",
                safepoint, value, pc, preg
            ),
            CheckerError::UnassignedReference { value, safepoint } => {
                write!(f, "{}: reference {} has no location", safepoint, value)
            }
            CheckerError::ImmediateReference { value, safepoint } => {
                write!(f, "{}: reference {} is an immediate", safepoint, value)
            }
            CheckerError::ForeignRegister {
                value,
                safepoint,
                preg,
            } => write!(
                f,
                "{}: reference {} is in {}, which cannot hold a reference",
                safepoint, value, preg
            ),
        }
    }
}

pub struct Checker<'a> {
    abi: &'a AbiDescriptor,
}

impl<'a> Checker<'a> {
    pub fn new(abi: &'a AbiDescriptor) -> Checker<'a> {
        Checker { abi }
    }

    /// Check every safepoint, returning all violations found.
    pub fn run(&self, values: &ValueRecords, safepoints: &Safepoints) -> Result<(), CheckerErrors> {
        let catalog = self.abi.catalog();
        let mut errors = Vec::new();
        let mut reported: FxHashSet<Value> = FxHashSet::default();

        for (safepoint, info) in safepoints.entries() {
            let refs: SmallVec<[(Value, Location); 16]> = values
                .live_at(safepoint)
                .filter(|(_, record)| record.is_reference())
                .map(|(value, record)| (value, record.location()))
                .collect();
            trace!(
                "checker: {} ({:?} at {:#x}): {} live reference(s)",
                safepoint,
                info.kind,
                info.pc,
                refs.len()
            );

            for (value, location) in refs {
                trace!("  {} in {}", value, location);
                match location {
                    Location::Stack(_) => {}
                    Location::Register(preg) => {
                        if preg.class() != RegClass::Int || !catalog.contains(preg) {
                            if reported.insert(value) {
                                errors.push(CheckerError::ForeignRegister {
                                    value,
                                    safepoint,
                                    preg,
                                });
                            }
                        } else if info.kind == SafepointKind::Call
                            && !self.abi.is_preserved_across_call(preg)
                        {
                            errors.push(CheckerError::ClobberedReference {
                                value,
                                safepoint,
                                pc: info.pc,
                                preg,
                            });
                        }
                    }
                    Location::Immediate(_) => {
                        if reported.insert(value) {
                            errors.push(CheckerError::ImmediateReference { value, safepoint });
                        }
                    }
                    Location::Unassigned => {
                        if reported.insert(value) {
                            errors.push(CheckerError::UnassignedReference { value, safepoint });
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            trace!("checker: {} error(s)", errors.len());
            Err(CheckerErrors { errors })
        }
    }
}
