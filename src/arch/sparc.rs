/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! SPARC V9 (64-bit).
//!
//! Every frame starts with the 16-word register-window save area
//! followed by six words into which a callee may dump its register
//! arguments, so the first spill slot is 176 bytes above `%sp`. When a
//! window is flushed, `%l0`-`%l7` land in words 0-7 of the save area and
//! `%i0`-`%i7` in words 8-15; a reference held in one of those registers
//! at a safepoint is therefore reported through its save-area word.
//! Windowed registers survive calls, globals and outs do not.

use super::Target;
use crate::abi::{AbiDescriptor, Role};
use crate::catalog::{sequential, Architecture, RegisterCatalog};
use crate::{Location, PReg, PRegSet, RegClass, ValueKind};

const fn g(n: usize) -> PReg {
    PReg::new(n, RegClass::Int)
}
const fn o(n: usize) -> PReg {
    PReg::new(8 + n, RegClass::Int)
}
const fn l(n: usize) -> PReg {
    PReg::new(16 + n, RegClass::Int)
}
const fn i(n: usize) -> PReg {
    PReg::new(24 + n, RegClass::Int)
}
const fn f(n: usize) -> PReg {
    PReg::new(n, RegClass::Float)
}

pub const G1: PReg = g(1);
pub const G2: PReg = g(2);
pub const O0: PReg = o(0);
pub const O6: PReg = o(6);
pub const L0: PReg = l(0);
pub const I0: PReg = i(0);
pub const I6: PReg = i(6);
pub const I7: PReg = i(7);
pub const F0: PReg = f(0);
pub const F30: PReg = f(30);

/// Size of the register-window save area plus the argument dump area.
pub const MIN_FRAME_SIZE: u32 = (16 + 6) * 8;

static GPRS: [PReg; 32] = sequential(RegClass::Int);
static FPRS: [PReg; 32] = sequential(RegClass::Float);

static GPR_NAMES: [&str; 32] = [
    "%g0", "%g1", "%g2", "%g3", "%g4", "%g5", "%g6", "%g7", "%o0", "%o1", "%o2", "%o3", "%o4",
    "%o5", "%o6", "%o7", "%l0", "%l1", "%l2", "%l3", "%l4", "%l5", "%l6", "%l7", "%i0", "%i1",
    "%i2", "%i3", "%i4", "%i5", "%i6", "%i7",
];
static FPR_NAMES: [&str; 32] = [
    "%f0", "%f1", "%f2", "%f3", "%f4", "%f5", "%f6", "%f7", "%f8", "%f9", "%f10", "%f11", "%f12",
    "%f13", "%f14", "%f15", "%f16", "%f17", "%f18", "%f19", "%f20", "%f21", "%f22", "%f23",
    "%f24", "%f25", "%f26", "%f27", "%f28", "%f29", "%f30", "%f31",
];

pub static CATALOG: RegisterCatalog = RegisterCatalog::new(
    Architecture::SparcV9,
    [&GPRS, &FPRS],
    [&GPR_NAMES, &FPR_NAMES],
);

static ALLOCATABLE_GPRS: [PReg; 22] = [
    o(0),
    o(1),
    o(2),
    o(3),
    o(4),
    o(5),
    g(3),
    g(4),
    l(0),
    l(1),
    l(2),
    l(3),
    l(4),
    l(5),
    l(6),
    l(7),
    i(0),
    i(1),
    i(2),
    i(3),
    i(4),
    i(5),
];

static ALLOCATABLE_FPRS: [PReg; 30] = {
    let mut regs = [F0; 30];
    let mut n = 0;
    while n < 30 {
        regs[n] = f(n);
        n += 1;
    }
    regs
};

static WINDOWED: [PReg; 14] = [
    l(0),
    l(1),
    l(2),
    l(3),
    l(4),
    l(5),
    l(6),
    l(7),
    i(0),
    i(1),
    i(2),
    i(3),
    i(4),
    i(5),
];

const fn with_window_spill_indices(mut abi: AbiDescriptor) -> AbiDescriptor {
    let mut n = 0;
    while n < 8 {
        abi = abi
            .with_spill_index(l(n), n as u16)
            .with_spill_index(i(n), 8 + n as u16);
        n += 1;
    }
    abi
}

pub static ABI: AbiDescriptor = with_window_spill_indices(
    AbiDescriptor::new(Architecture::SparcV9, 8, MIN_FRAME_SIZE)
        .with_allocatable(RegClass::Int, &ALLOCATABLE_GPRS)
        .with_allocatable(RegClass::Float, &ALLOCATABLE_FPRS)
        .with_callee_saved(PRegSet::from_slice(&WINDOWED))
        .with_role(Role::StackPointer, O6)
        .with_role(Role::FramePointer, I6)
        .with_role(Role::Result, O0)
        .with_role(Role::Result, F0)
        .with_role(Role::Scratch, G1)
        .with_role(Role::Scratch, F30)
        .with_role(Role::SafepointLatch, G2)
        .with_role(Role::ExceptionResult, O0)
        .with_result(ValueKind::Reference, Location::reg(O0))
        .with_result(ValueKind::Word, Location::reg(O0))
        .with_result(ValueKind::Int, Location::reg(O0))
        .with_result(ValueKind::Long, Location::reg(O0))
        .with_result(ValueKind::Float, Location::reg(F0))
        .with_result(ValueKind::Double, Location::reg(F0)),
);

/// The SPARC V9 target.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sparc;

impl Target for Sparc {
    const ARCH: Architecture = Architecture::SparcV9;
}
