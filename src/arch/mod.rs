/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Supported targets.
//!
//! Each module defines the register constants, the static
//! [`RegisterCatalog`] and the static [`AbiDescriptor`] of one
//! architecture, plus a zero-sized [`Target`] type. Code that is generic
//! over `T: Target` is specialized at build time; [`HostTarget`] names the
//! target the crate is being built for.

use crate::abi::AbiDescriptor;
use crate::catalog::{Architecture, RegisterCatalog};

pub mod aarch64;
pub mod amd64;
pub mod ia32;
pub mod sparc;

/// A statically selected target architecture.
pub trait Target {
    const ARCH: Architecture;

    fn abi() -> &'static AbiDescriptor {
        Self::ARCH.abi()
    }

    fn catalog() -> &'static RegisterCatalog {
        Self::ARCH.catalog()
    }
}

#[cfg(target_arch = "x86_64")]
pub type HostTarget = amd64::Amd64;

#[cfg(target_arch = "aarch64")]
pub type HostTarget = aarch64::Aarch64;

#[cfg(target_arch = "x86")]
pub type HostTarget = ia32::Ia32;

#[cfg(target_arch = "sparc64")]
pub type HostTarget = sparc::Sparc;
