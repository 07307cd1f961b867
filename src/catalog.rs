/*
 * Released under the terms of the Apache 2.0 license with LLVM
 * exception. See `LICENSE` for details.
 */

//! Register catalogs: the physical registers of each supported target.
//!
//! A catalog is a `static` table. Its registers are numbered densely
//! from zero within each class, in hardware-encoding order, so the
//! encoding of a register doubles as its catalog index and as its bit
//! position in the register half of a reference map.

use crate::abi::AbiDescriptor;
use crate::arch::{aarch64, amd64, ia32, sparc};
use crate::{PReg, RegClass};
use core::str::FromStr;

/// The supported target instruction set architectures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "enable-serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Architecture {
    Amd64,
    Aarch64,
    Ia32,
    SparcV9,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::Amd64,
        Architecture::Aarch64,
        Architecture::Ia32,
        Architecture::SparcV9,
    ];

    /// The static register catalog of this architecture.
    pub fn catalog(self) -> &'static RegisterCatalog {
        match self {
            Architecture::Amd64 => &amd64::CATALOG,
            Architecture::Aarch64 => &aarch64::CATALOG,
            Architecture::Ia32 => &ia32::CATALOG,
            Architecture::SparcV9 => &sparc::CATALOG,
        }
    }

    /// The static ABI descriptor of this architecture.
    pub fn abi(self) -> &'static AbiDescriptor {
        match self {
            Architecture::Amd64 => &amd64::ABI,
            Architecture::Aarch64 => &aarch64::ABI,
            Architecture::Ia32 => &ia32::ABI,
            Architecture::SparcV9 => &sparc::ABI,
        }
    }

    /// The natural word size in bytes.
    pub const fn word_size(self) -> u32 {
        match self {
            Architecture::Ia32 => 4,
            Architecture::Amd64 | Architecture::Aarch64 | Architecture::SparcV9 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Aarch64 => "aarch64",
            Architecture::Ia32 => "ia32",
            Architecture::SparcV9 => "sparcv9",
        }
    }
}

impl core::fmt::Display for Architecture {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when parsing the name of an architecture we do not support.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownArchitecture(pub alloc::string::String);

impl core::fmt::Display for UnknownArchitecture {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "unknown architecture `{}`", self.0)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UnknownArchitecture {}

impl FromStr for Architecture {
    type Err = UnknownArchitecture;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" | "x86_64" | "x86-64" => Ok(Architecture::Amd64),
            "aarch64" | "arm64" => Ok(Architecture::Aarch64),
            "ia32" | "x86" | "i686" => Ok(Architecture::Ia32),
            "sparcv9" | "sparc64" | "sparc" => Ok(Architecture::SparcV9),
            other => Err(UnknownArchitecture(other.into())),
        }
    }
}

/// Build the registers `0..N` of a class, in encoding order.
pub(crate) const fn sequential<const N: usize>(class: RegClass) -> [PReg; N] {
    let mut regs = [PReg::invalid(); N];
    let mut i = 0;
    while i < N {
        regs[i] = PReg::new(i, class);
        i += 1;
    }
    regs
}

/// The registers of one architecture.
#[derive(Debug)]
pub struct RegisterCatalog {
    arch: Architecture,
    regs_by_class: [&'static [PReg]; 2],
    names_by_class: [&'static [&'static str]; 2],
}

impl RegisterCatalog {
    pub(crate) const fn new(
        arch: Architecture,
        regs_by_class: [&'static [PReg]; 2],
        names_by_class: [&'static [&'static str]; 2],
    ) -> Self {
        let mut class = 0;
        while class < 2 {
            let regs = regs_by_class[class];
            assert!(regs.len() == names_by_class[class].len());
            let mut i = 0;
            while i < regs.len() {
                // Dense, encoding-ordered numbering is what `index_of` relies on.
                assert!(regs[i].hw_enc() == i);
                assert!(regs[i].class() as usize == class);
                i += 1;
            }
            class += 1;
        }
        RegisterCatalog {
            arch,
            regs_by_class,
            names_by_class,
        }
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    /// All registers of a class, in index order.
    pub fn registers(&self, class: RegClass) -> &'static [PReg] {
        self.regs_by_class[class as usize]
    }

    pub fn contains(&self, preg: PReg) -> bool {
        preg.hw_enc() < self.registers(preg.class()).len()
    }

    /// The dense index of `preg` within its class.
    ///
    /// Panics if `preg` is not a register of this architecture.
    pub fn index_of(&self, preg: PReg) -> usize {
        assert!(
            self.contains(preg),
            "{} is not a register of {}",
            preg,
            self.arch
        );
        preg.hw_enc()
    }

    /// The assembler name of `preg`.
    ///
    /// Panics if `preg` is not a register of this architecture.
    pub fn name(&self, preg: PReg) -> &'static str {
        let index = self.index_of(preg);
        self.names_by_class[preg.class() as usize][index]
    }

    /// Look a register up by its assembler name.
    pub fn by_name(&self, name: &str) -> Option<PReg> {
        RegClass::ALL.iter().find_map(|&class| {
            self.names_by_class[class as usize]
                .iter()
                .position(|n| *n == name)
                .map(|i| self.registers(class)[i])
        })
    }

    /// The number of general-purpose registers: the width of the register
    /// half of a reference map.
    pub fn reference_register_count(&self) -> usize {
        self.registers(RegClass::Int).len()
    }
}
