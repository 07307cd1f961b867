/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! AArch64.
//!
//! `x26` is the safepoint latch and must be callee-saved by every C ABI
//! in use; `x16` (ip0) is the scratch register. `x17`, `x18`, the frame
//! pointer and the link register are never allocated. Encoding 31 is
//! catalogued as `sp`.

use super::Target;
use crate::abi::{AbiDescriptor, Role};
use crate::catalog::{sequential, Architecture, RegisterCatalog};
use crate::{Location, PReg, PRegSet, RegClass, ValueKind};

const fn x(n: usize) -> PReg {
    PReg::new(n, RegClass::Int)
}

const fn v(n: usize) -> PReg {
    PReg::new(n, RegClass::Float)
}

pub const X0: PReg = x(0);
pub const X16: PReg = x(16);
pub const X19: PReg = x(19);
pub const X26: PReg = x(26);
pub const X29: PReg = x(29);
pub const X30: PReg = x(30);
pub const SP: PReg = x(31);

pub const V0: PReg = v(0);
pub const V31: PReg = v(31);

static XREGS: [PReg; 32] = sequential(RegClass::Int);
static VREGS: [PReg; 32] = sequential(RegClass::Float);

static XREG_NAMES: [&str; 32] = [
    "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12", "x13", "x14",
    "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27",
    "x28", "x29", "x30", "sp",
];
static VREG_NAMES: [&str; 32] = [
    "v0", "v1", "v2", "v3", "v4", "v5", "v6", "v7", "v8", "v9", "v10", "v11", "v12", "v13", "v14",
    "v15", "v16", "v17", "v18", "v19", "v20", "v21", "v22", "v23", "v24", "v25", "v26", "v27",
    "v28", "v29", "v30", "v31",
];

pub static CATALOG: RegisterCatalog = RegisterCatalog::new(
    Architecture::Aarch64,
    [&XREGS, &VREGS],
    [&XREG_NAMES, &VREG_NAMES],
);

static ALLOCATABLE_XREGS: [PReg; 25] = [
    x(0),
    x(1),
    x(2),
    x(3),
    x(4),
    x(5),
    x(6),
    x(7),
    x(8),
    x(9),
    x(10),
    x(11),
    x(12),
    x(13),
    x(14),
    x(15),
    x(19),
    x(20),
    x(21),
    x(22),
    x(23),
    x(24),
    x(25),
    x(27),
    x(28),
];

static ALLOCATABLE_VREGS: [PReg; 31] = {
    let mut regs = [V0; 31];
    let mut i = 0;
    while i < 31 {
        regs[i] = v(i);
        i += 1;
    }
    regs
};

// AAPCS64 preserves x19-x28 and the low halves of v8-v15; the latch
// register is excluded since it is never allocated.
static CALLEE_SAVED: [PReg; 17] = [
    x(19),
    x(20),
    x(21),
    x(22),
    x(23),
    x(24),
    x(25),
    x(27),
    x(28),
    v(8),
    v(9),
    v(10),
    v(11),
    v(12),
    v(13),
    v(14),
    v(15),
];

pub static ABI: AbiDescriptor = AbiDescriptor::new(Architecture::Aarch64, 8, 0)
    .with_allocatable(RegClass::Int, &ALLOCATABLE_XREGS)
    .with_allocatable(RegClass::Float, &ALLOCATABLE_VREGS)
    .with_callee_saved(PRegSet::from_slice(&CALLEE_SAVED))
    .with_role(Role::StackPointer, SP)
    .with_role(Role::FramePointer, X29)
    .with_role(Role::Result, X0)
    .with_role(Role::Result, V0)
    .with_role(Role::Scratch, X16)
    .with_role(Role::Scratch, V31)
    .with_role(Role::SafepointLatch, X26)
    .with_role(Role::ExceptionResult, X0)
    .with_result(ValueKind::Reference, Location::reg(X0))
    .with_result(ValueKind::Word, Location::reg(X0))
    .with_result(ValueKind::Int, Location::reg(X0))
    .with_result(ValueKind::Long, Location::reg(X0))
    .with_result(ValueKind::Float, Location::reg(V0))
    .with_result(ValueKind::Double, Location::reg(V0));

/// The AArch64 target.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aarch64;

impl Target for Aarch64 {
    const ARCH: Architecture = Architecture::Aarch64;
}
