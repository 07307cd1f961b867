/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Arbitrary method compilations that honor the allocation contract.

use super::arbitrary::{Arbitrary, Result, Unstructured};
use crate::{
    Architecture, Location, MethodCompilation, PReg, RegClass, Safepoint, SafepointKind,
    ValueKind,
};
use alloc::format;
use alloc::vec::Vec;

#[derive(Clone, Debug)]
pub struct Options {
    pub max_safepoints: usize,
    pub max_values: usize,
    /// Put some references in incoming parameter slots.
    pub parameters: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_safepoints: 16,
            max_values: 64,
            parameters: true,
        }
    }
}

/// A method whose locations and liveness the reference-map builder and
/// the checker must both accept.
#[derive(Clone, Debug)]
pub struct FuzzMethod {
    compilation: MethodCompilation<'static>,
}

impl FuzzMethod {
    pub fn compilation(&self) -> &MethodCompilation<'static> {
        &self.compilation
    }

    pub fn into_compilation(self) -> MethodCompilation<'static> {
        self.compilation
    }

    pub fn arbitrary_with_options(u: &mut Unstructured, opts: &Options) -> Result<FuzzMethod> {
        let arch = *u.choose(&Architecture::ALL)?;
        let abi = arch.abi();
        let slot_size = abi.stack_slot_size() as i32;
        let mut m = MethodCompilation::new(format!("fuzz_{}", arch), abi);

        let mut safepoints: Vec<(Safepoint, SafepointKind)> = Vec::new();
        let mut pc = 0u32;
        for _ in 0..u.int_in_range(0..=opts.max_safepoints)? {
            pc += u.int_in_range(1..=64)?;
            let kind = if bool::arbitrary(u)? {
                SafepointKind::Call
            } else {
                SafepointKind::Poll
            };
            safepoints.push((m.add_safepoint(pc, kind), kind));
        }

        let preserved: Vec<PReg> = abi
            .allocatable(RegClass::Int)
            .iter()
            .copied()
            .filter(|&preg| abi.is_preserved_across_call(preg))
            .collect();

        for _ in 0..u.int_in_range(0..=opts.max_values)? {
            let kind = *u.choose(&ValueKind::ALL)?;
            let value = m.new_value(kind);
            let location = match u.int_in_range(0..=4u8)? {
                0 if opts.parameters => m.parameter_slot(slot_size * u.int_in_range(-4..=16)?),
                0 | 1 => m.new_spill_slot(kind),
                2 if !preserved.is_empty() && kind.class() == RegClass::Int => {
                    Location::reg(*u.choose(&preserved)?)
                }
                4 if !kind.is_reference() => Location::Immediate(i64::arbitrary(u)?),
                _ => Location::reg(*u.choose(abi.allocatable(kind.class()))?),
            };
            m.assign(value, location)
                .expect("generated location is valid for its kind");

            // A reference in a register the callee clobbers may only be
            // live at polls.
            let clobbered = kind.is_reference()
                && location
                    .as_register()
                    .map_or(false, |preg| !abi.is_preserved_across_call(preg));
            for &(safepoint, sp_kind) in &safepoints {
                if clobbered && sp_kind == SafepointKind::Call {
                    continue;
                }
                if bool::arbitrary(u)? {
                    m.mark_live(value, safepoint);
                }
            }
        }

        Ok(FuzzMethod { compilation: m })
    }
}

impl Arbitrary<'_> for FuzzMethod {
    fn arbitrary(u: &mut Unstructured) -> Result<FuzzMethod> {
        FuzzMethod::arbitrary_with_options(u, &Options::default())
    }
}
