use core::fmt;

use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

use crate::arch::{aarch64::Aarch64, amd64::Amd64, ia32::Ia32, sparc::Sparc, Target};
use crate::{
    Architecture, CodegenError, CompileError, CompiledMethod, Generator, Location, MethodCompilation,
    SafepointInfo, ValueKind,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ValueData {
    kind: ValueKind,
    location: Location,
    /// Indices into `SerializableMethod::safepoints`.
    live_at: Vec<u32>,
}

/// A method compilation, before reference maps are built, in a form that
/// can be serialized and deserialized.
///
/// The serialized form of this structure is not stable: it is intended to be
/// deserialized with the exact same version of gcmap as the one that it
/// was created with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableMethod {
    name: String,
    arch: Architecture,
    /// Spill area in bytes, including slots no value was assigned to.
    frame_size: u32,
    values: Vec<ValueData>,
    safepoints: Vec<SafepointInfo>,
}

impl SerializableMethod {
    /// Captures the values and safepoints recorded so far in `method`.
    pub fn new(method: &MethodCompilation<'_>) -> Self {
        Self {
            name: method.name().into(),
            arch: method.arch(),
            frame_size: method.frame_size(),
            values: method
                .values()
                .iter()
                .map(|record| ValueData {
                    kind: record.kind(),
                    location: record.location(),
                    live_at: record.live_at().map(|sp| sp.index() as u32).collect(),
                })
                .collect(),
            safepoints: method.safepoints().iter().copied().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    /// Replays the method through the generator of its architecture and
    /// builds its reference maps.
    pub fn compile(&self) -> Result<CompiledMethod, CompileError> {
        match self.arch {
            Architecture::Amd64 => self.compile_for::<Amd64>(),
            Architecture::Aarch64 => self.compile_for::<Aarch64>(),
            Architecture::Ia32 => self.compile_for::<Ia32>(),
            Architecture::SparcV9 => self.compile_for::<Sparc>(),
        }
    }

    fn compile_for<T: Target>(&self) -> Result<CompiledMethod, CompileError> {
        let error = |kind| CompileError {
            method: self.name.clone(),
            arch: self.arch,
            kind,
        };
        let generator = Generator::<T>::new().map_err(error)?;
        let mut method = generator.begin_method(self.name.clone());
        method.reserve_frame(self.frame_size);

        let safepoints: Vec<_> = self
            .safepoints
            .iter()
            .map(|info| method.add_safepoint(info.pc, info.kind))
            .collect();
        for data in &self.values {
            let value = method.new_value(data.kind);
            if data.location.is_assigned() {
                method.assign(value, data.location).map_err(error)?;
            }
            for &index in &data.live_at {
                let safepoint = *safepoints
                    .get(index as usize)
                    .ok_or(CodegenError::UnknownSafepoint { value, index })
                    .map_err(error)?;
                method.mark_live(value, safepoint);
            }
        }

        method.finish()
    }
}

impl fmt::Display for SerializableMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let catalog = self.arch.catalog();
        writeln!(
            f,
            "method {} ({}, frame {} bytes) {{",
            self.name, self.arch, self.frame_size
        )?;
        for (i, info) in self.safepoints.iter().enumerate() {
            let kind = match info.kind {
                crate::SafepointKind::Call => "call",
                crate::SafepointKind::Poll => "poll",
            };
            writeln!(f, "  sp{}: {} at {:#x}", i, kind, info.pc)?;
        }
        for (i, data) in self.values.iter().enumerate() {
            write!(f, "  v{}: {} in ", i, data.kind)?;
            match data.location {
                Location::Register(preg) if catalog.contains(preg) => {
                    f.write_str(catalog.name(preg))?
                }
                location => write!(f, "{}", location)?,
            }
            if !data.live_at.is_empty() {
                f.write_str(", live at")?;
                for sp in &data.live_at {
                    write!(f, " sp{}", sp)?;
                }
            }
            writeln!(f)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::aarch64;
    use crate::SafepointKind;
    use alloc::string::ToString;

    #[test]
    fn replay_matches_direct_compilation() {
        let generator = Generator::<Aarch64>::new().unwrap();
        let mut m = generator.begin_method("replayed");
        let call = m.add_safepoint(0x24, SafepointKind::Call);
        let poll = m.add_safepoint(0x08, SafepointKind::Poll);
        let a = m.new_value(ValueKind::Reference);
        let b = m.new_value(ValueKind::Reference);
        let c = m.new_value(ValueKind::Double);
        let slot = m.new_spill_slot(ValueKind::Reference);
        // Allocated but never assigned; it still widens the frame.
        let _unused = m.new_spill_slot(ValueKind::Reference);
        m.assign(a, slot).unwrap();
        m.assign(b, Location::reg(aarch64::X19)).unwrap();
        m.assign(c, Location::reg(aarch64::V0)).unwrap();
        m.mark_live(a, call);
        m.mark_live(b, call);
        m.mark_live(b, poll);
        m.mark_live(c, poll);

        let serialized = SerializableMethod::new(&m);
        assert_eq!(serialized.arch(), Architecture::Aarch64);
        let listing = serialized.to_string();
        assert!(listing.contains("v1: ref in x19, live at sp0 sp1"), "{}", listing);

        assert!(listing.contains("frame 16 bytes"), "{}", listing);

        let replayed = serialized.compile().unwrap();
        let direct = m.finish().unwrap();
        assert_eq!(replayed.frame_size(), 16);
        assert_eq!(
            replayed.reference_maps().frame_bits(),
            direct.reference_maps().frame_bits()
        );
        assert_eq!(replayed, direct);
    }

    #[test]
    fn replay_rejects_unknown_safepoint() {
        let generator = Generator::<Aarch64>::new().unwrap();
        let mut m = generator.begin_method("dangling");
        let call = m.add_safepoint(0x10, SafepointKind::Call);
        let a = m.new_value(ValueKind::Reference);
        m.assign(a, Location::reg(aarch64::X19)).unwrap();
        m.mark_live(a, call);

        let mut serialized = SerializableMethod::new(&m);
        serialized.values[0].live_at.push(99);
        let err = serialized.compile().unwrap_err();
        assert_eq!(err.method, "dangling");
        assert!(
            matches!(err.kind, CodegenError::UnknownSafepoint { index: 99, .. }),
            "{}",
            err
        );
    }
}
