/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! 32-bit x86 with SSE2.
//!
//! Stack slots are one 32-bit word wide. A `long` does not fit in a
//! single register, so it has no direct result location and callers have
//! to split it into two words. `edx` is the scratch register and `edi`
//! the safepoint latch, which leaves four general-purpose registers
//! (`eax`, `ecx`, `ebx`, `esi`) for the allocator.

use super::Target;
use crate::abi::{AbiDescriptor, Role};
use crate::catalog::{sequential, Architecture, RegisterCatalog};
use crate::{Location, PReg, PRegSet, RegClass, ValueKind};

pub const EAX: PReg = PReg::new(0, RegClass::Int);
pub const ECX: PReg = PReg::new(1, RegClass::Int);
pub const EDX: PReg = PReg::new(2, RegClass::Int);
pub const EBX: PReg = PReg::new(3, RegClass::Int);
pub const ESP: PReg = PReg::new(4, RegClass::Int);
pub const EBP: PReg = PReg::new(5, RegClass::Int);
pub const ESI: PReg = PReg::new(6, RegClass::Int);
pub const EDI: PReg = PReg::new(7, RegClass::Int);

pub const XMM0: PReg = PReg::new(0, RegClass::Float);
pub const XMM7: PReg = PReg::new(7, RegClass::Float);

static GPRS: [PReg; 8] = sequential(RegClass::Int);
static XMMS: [PReg; 8] = sequential(RegClass::Float);

static GPR_NAMES: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];
static XMM_NAMES: [&str; 8] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7",
];

pub static CATALOG: RegisterCatalog =
    RegisterCatalog::new(Architecture::Ia32, [&GPRS, &XMMS], [&GPR_NAMES, &XMM_NAMES]);

static ALLOCATABLE_GPRS: [PReg; 4] = [EAX, ECX, EBX, ESI];
static ALLOCATABLE_XMMS: [PReg; 7] = [
    PReg::new(0, RegClass::Float),
    PReg::new(1, RegClass::Float),
    PReg::new(2, RegClass::Float),
    PReg::new(3, RegClass::Float),
    PReg::new(4, RegClass::Float),
    PReg::new(5, RegClass::Float),
    PReg::new(6, RegClass::Float),
];

pub static ABI: AbiDescriptor = AbiDescriptor::new(Architecture::Ia32, 4, 0)
    .with_allocatable(RegClass::Int, &ALLOCATABLE_GPRS)
    .with_allocatable(RegClass::Float, &ALLOCATABLE_XMMS)
    .with_callee_saved(PRegSet::from_slice(&[EBX, ESI]))
    .with_role(Role::StackPointer, ESP)
    .with_role(Role::FramePointer, EBP)
    .with_role(Role::Result, EAX)
    .with_role(Role::Result, XMM0)
    .with_role(Role::Scratch, EDX)
    .with_role(Role::Scratch, XMM7)
    .with_role(Role::SafepointLatch, EDI)
    .with_role(Role::ExceptionResult, EAX)
    .with_result(ValueKind::Reference, Location::reg(EAX))
    .with_result(ValueKind::Word, Location::reg(EAX))
    .with_result(ValueKind::Int, Location::reg(EAX))
    .with_result(ValueKind::Float, Location::reg(XMM0))
    .with_result(ValueKind::Double, Location::reg(XMM0));

/// The 32-bit x86 target.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ia32;

impl Target for Ia32 {
    const ARCH: Architecture = Architecture::Ia32;
}
