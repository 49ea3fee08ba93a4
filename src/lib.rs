//! Extracts Objective-C runtime metadata (classes, categories, protocols,
//! methods, ivars, properties) from Mach-O images and renders it as
//! Objective-C declaration text.
//!
//! Entry points: [`parse`] for an in-memory image, [`parse_path`] to read a
//! file from disk first. Both detect fat vs. thin images, pick an
//! architecture slice, and return an assembled [`Abi`].

#![allow(dead_code)]

pub mod abi;
pub mod container;
pub mod entities;
pub mod error;
pub mod fat;
pub mod flags;
pub mod header;
pub mod helpers;
pub mod machine;
pub mod records;
pub mod render;
pub mod segment;
pub mod stream;
pub mod typeenc;

pub use abi::Abi;
pub use entities::{Category, Class, IVar, Method, Protocol, Property};
pub use error::{AbiError, AbiErrorKind, AbiResult};
pub use render::Declaration;

use std::fs;
use std::path::Path;

use container::{FatMachO, MachO};
use machine::CpuType;
use stream::{AddressSpace, ContentStream};

/// Preferred architecture order when a fat binary carries more than one
/// slice: the modern arm64 slice first, falling back to the x86_64 slice
/// (Mac Catalyst / simulator builds, or older Intel-only binaries).
const ARCH_PREFERENCE: [CpuType; 2] = [CpuType::Arm64, CpuType::X86_64];

/// Read `path` and parse it as a Mach-O (or fat Mach-O) image.
pub fn parse_path<P: AsRef<Path>>(path: P) -> AbiResult<Abi> {
    let bytes = fs::read(path.as_ref()).map_err(|e| AbiError::open(e.to_string()))?;
    parse(&bytes)
}

/// Parse an in-memory Mach-O (or fat Mach-O) image and assemble its
/// Objective-C metadata. For a fat image, the first slice matching
/// [`ARCH_PREFERENCE`] is selected.
pub fn parse(bytes: &[u8]) -> AbiResult<Abi> {
    let slice = if FatMachO::is_fat_magic(bytes) {
        let fat = FatMachO::parse(bytes)?;
        let cputype = ARCH_PREFERENCE
            .into_iter()
            .find(|arch| fat.archs.iter().any(|a| a.cputype() == *arch))
            .ok_or_else(|| AbiError::open("fat binary has no arm64 or x86_64 slice".to_string()))?;
        fat.slice(cputype)?
    } else if MachO::is_macho_magic(bytes) {
        bytes
    } else {
        return Err(AbiError::open("not a Mach-O image".to_string()));
    };

    let macho = MachO::parse(slice)?;
    let space = AddressSpace::from_segments(macho.segments.iter(), macho.image_base());
    let mut stream = ContentStream::from_bytes(slice.to_vec(), space);
    abi::build(&macho, &mut stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_macho_input() {
        let err = parse(b"not a mach-o file").unwrap_err();
        assert_eq!(err.kind, AbiErrorKind::Open);
    }

    #[test]
    fn parse_path_reads_a_thin_header_only_image() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("empty.bin");

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xfeedfacfu32.to_le_bytes()); // MH_MAGIC_64
        bytes.extend_from_slice(&(12u32 | 0x01000000).to_le_bytes()); // CPU_TYPE_ARM64
        bytes.extend_from_slice(&0u32.to_le_bytes()); // cpusubtype
        bytes.extend_from_slice(&0x6u32.to_le_bytes()); // MH_DYLIB
        bytes.extend_from_slice(&0u32.to_le_bytes()); // ncmds
        bytes.extend_from_slice(&0u32.to_le_bytes()); // sizeofcmds
        bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u32.to_le_bytes()); // reserved
        std::fs::write(&file_path, &bytes).unwrap();

        let abi = parse_path(&file_path).unwrap();
        assert!(abi.classes.is_empty());
        assert!(abi.categories.is_empty());
        assert!(abi.protocols.is_empty());
    }
}
