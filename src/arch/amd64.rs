/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! x86-64.
//!
//! Frames are addressed from `rsp`; there is no fixed save area, so the
//! first spill slot is at the frame base. `r14` holds the safepoint latch
//! and `r11` is kept free as a scratch register. The System V
//! callee-saved registers that remain allocatable survive calls.

use super::Target;
use crate::abi::{AbiDescriptor, Role};
use crate::catalog::{sequential, Architecture, RegisterCatalog};
use crate::{Location, PReg, PRegSet, RegClass, ValueKind};

pub const RAX: PReg = PReg::new(0, RegClass::Int);
pub const RCX: PReg = PReg::new(1, RegClass::Int);
pub const RDX: PReg = PReg::new(2, RegClass::Int);
pub const RBX: PReg = PReg::new(3, RegClass::Int);
pub const RSP: PReg = PReg::new(4, RegClass::Int);
pub const RBP: PReg = PReg::new(5, RegClass::Int);
pub const RSI: PReg = PReg::new(6, RegClass::Int);
pub const RDI: PReg = PReg::new(7, RegClass::Int);
pub const R8: PReg = PReg::new(8, RegClass::Int);
pub const R9: PReg = PReg::new(9, RegClass::Int);
pub const R10: PReg = PReg::new(10, RegClass::Int);
pub const R11: PReg = PReg::new(11, RegClass::Int);
pub const R12: PReg = PReg::new(12, RegClass::Int);
pub const R13: PReg = PReg::new(13, RegClass::Int);
pub const R14: PReg = PReg::new(14, RegClass::Int);
pub const R15: PReg = PReg::new(15, RegClass::Int);

pub const XMM0: PReg = PReg::new(0, RegClass::Float);
pub const XMM15: PReg = PReg::new(15, RegClass::Float);

static GPRS: [PReg; 16] = sequential(RegClass::Int);
static XMMS: [PReg; 16] = sequential(RegClass::Float);

static GPR_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];
static XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

pub static CATALOG: RegisterCatalog =
    RegisterCatalog::new(Architecture::Amd64, [&GPRS, &XMMS], [&GPR_NAMES, &XMM_NAMES]);

// Caller-saved registers first so short-lived values do not eat into the
// registers that survive calls.
static ALLOCATABLE_GPRS: [PReg; 12] = [
    RAX, RCX, RDX, RSI, RDI, R8, R9, R10, RBX, R12, R13, R15,
];
static ALLOCATABLE_XMMS: [PReg; 15] = [
    PReg::new(0, RegClass::Float),
    PReg::new(1, RegClass::Float),
    PReg::new(2, RegClass::Float),
    PReg::new(3, RegClass::Float),
    PReg::new(4, RegClass::Float),
    PReg::new(5, RegClass::Float),
    PReg::new(6, RegClass::Float),
    PReg::new(7, RegClass::Float),
    PReg::new(8, RegClass::Float),
    PReg::new(9, RegClass::Float),
    PReg::new(10, RegClass::Float),
    PReg::new(11, RegClass::Float),
    PReg::new(12, RegClass::Float),
    PReg::new(13, RegClass::Float),
    PReg::new(14, RegClass::Float),
];

pub static ABI: AbiDescriptor = AbiDescriptor::new(Architecture::Amd64, 8, 0)
    .with_allocatable(RegClass::Int, &ALLOCATABLE_GPRS)
    .with_allocatable(RegClass::Float, &ALLOCATABLE_XMMS)
    .with_callee_saved(PRegSet::from_slice(&[RBX, R12, R13, R15]))
    .with_role(Role::StackPointer, RSP)
    .with_role(Role::FramePointer, RBP)
    .with_role(Role::Result, RAX)
    .with_role(Role::Result, XMM0)
    .with_role(Role::Scratch, R11)
    .with_role(Role::Scratch, XMM15)
    .with_role(Role::SafepointLatch, R14)
    .with_role(Role::ExceptionResult, RAX)
    .with_result(ValueKind::Reference, Location::reg(RAX))
    .with_result(ValueKind::Word, Location::reg(RAX))
    .with_result(ValueKind::Int, Location::reg(RAX))
    .with_result(ValueKind::Long, Location::reg(RAX))
    .with_result(ValueKind::Float, Location::reg(XMM0))
    .with_result(ValueKind::Double, Location::reg(XMM0));

/// The x86-64 target.
#[derive(Clone, Copy, Debug, Default)]
pub struct Amd64;

impl Target for Amd64 {
    const ARCH: Architecture = Architecture::Amd64;
}
